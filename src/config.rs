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
use crate::consumer::QueueDescriptor;
use crate::processor::exec::ExecProcessor;
use crate::processor::fastcgi::{DialTarget, FastCgiProcessor};
use crate::processor::with_env::EnvMergingProcessor;
use crate::processor::Processor;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("consumer '{queue}' must specify exactly one of 'fastcgi' or 'exec', found {found}")]
    AmbiguousAdapter { queue: String, found: &'static str },

    #[error("consumer '{queue}' has parallelism 0; must be at least 1")]
    ZeroParallelism { queue: String },
}

#[derive(Debug, Deserialize)]
pub struct RawFastCgiConfig {
    pub net: String,
    pub addr: String,
    pub script_name: String,
}

#[derive(Debug, Deserialize)]
pub struct RawExecConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawConsumerConfig {
    pub queue: String,
    pub parallelism: u16,
    pub prefetch: Option<u16>,
    pub failure_timeout_ms: Option<u64>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    pub fastcgi: Option<RawFastCgiConfig>,
    pub exec: Option<RawExecConfig>,
}

#[derive(Debug, Deserialize)]
pub struct RawConfig {
    pub amqp_url: String,
    pub consumers: Vec<RawConsumerConfig>,
}

/// Loads and validates the configuration file at `path`, turning each
/// consumer entry into a ready-to-run `QueueDescriptor`.
pub fn load(path: &Path) -> Result<(String, Vec<QueueDescriptor>), ConfigError> {
    let raw: RawConfig = config::Config::builder()
        .add_source(config::File::from(path))
        .add_source(config::Environment::with_prefix("AMQP_FCGI_BRIDGE"))
        .build()?
        .try_deserialize()?;

    let mut descriptors = Vec::with_capacity(raw.consumers.len());
    for consumer in raw.consumers {
        descriptors.push(build_descriptor(consumer)?);
    }

    Ok((raw.amqp_url, descriptors))
}

fn build_descriptor(raw: RawConsumerConfig) -> Result<QueueDescriptor, ConfigError> {
    if raw.parallelism == 0 {
        return Err(ConfigError::ZeroParallelism { queue: raw.queue });
    }

    let processor: Arc<dyn Processor> = match (raw.fastcgi, raw.exec) {
        (Some(fcgi), None) => {
            let target = match fcgi.net.as_str() {
                "unix" => DialTarget::Unix(fcgi.addr),
                _ => DialTarget::Tcp(fcgi.addr),
            };
            Arc::new(FastCgiProcessor::new(target, fcgi.script_name))
        },
        (None, Some(exec)) => Arc::new(ExecProcessor::new(exec.command, exec.args)),
        (Some(_), Some(_)) => {
            return Err(ConfigError::AmbiguousAdapter {
                queue: raw.queue,
                found: "both",
            })
        },
        (None, None) => {
            return Err(ConfigError::AmbiguousAdapter {
                queue: raw.queue,
                found: "neither",
            })
        },
    };

    let processor: Arc<dyn Processor> = if raw.env.is_empty() {
        processor
    } else {
        Arc::new(EnvMergingProcessor::new(processor, raw.env))
    };

    Ok(QueueDescriptor {
        queue: raw.queue,
        parallelism: raw.parallelism,
        prefetch: raw.prefetch,
        failure_timeout_ms: raw.failure_timeout_ms.unwrap_or(1000),
        processor,
    })
}
