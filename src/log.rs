// Copyright (c) 2018 Nuclear Furnace
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.
use std::sync::Arc;

/// Structured logging facade the core depends on. Implementations may
/// attach channel names and contextual maps; the core never reads its own
/// log output, only writes to this narrow interface.
pub trait Log: Send + Sync {
    fn debug(&self, msg: &str, fields: &[(&str, &str)]);
    fn info(&self, msg: &str, fields: &[(&str, &str)]);
    fn error(&self, msg: &str, fields: &[(&str, &str)]);
}

/// Default implementation: routes every call through `tracing`'s macros.
pub struct TracingLog;

impl Log for TracingLog {
    fn debug(&self, msg: &str, fields: &[(&str, &str)]) {
        tracing::debug!(fields = ?fields, "{msg}");
    }

    fn info(&self, msg: &str, fields: &[(&str, &str)]) {
        tracing::info!(fields = ?fields, "{msg}");
    }

    fn error(&self, msg: &str, fields: &[(&str, &str)]) {
        tracing::error!(fields = ?fields, "{msg}");
    }
}

/// The facade implementation wired up by `main` by default.
pub fn default_logger() -> Arc<dyn Log> { Arc::new(TracingLog) }

/// Text or JSON formatting for the process's log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}', expected 'text' or 'json'")),
        }
    }
}

/// Installs a global `tracing` subscriber in the requested format.
///
/// This is the one piece of the logging story that isn't behind the `Log`
/// facade: it configures the sink `TracingLog` writes into, a `main`-time
/// concern the core itself never touches.
pub fn init(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match format {
        LogFormat::Text => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        },
        LogFormat::Json => {
            tracing_subscriber::fmt().json().with_env_filter(filter).init();
        },
    }
}
