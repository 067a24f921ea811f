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
use amqp_fcgi_bridge::config;
use amqp_fcgi_bridge::consumer::QueueDescriptor;
use amqp_fcgi_bridge::log::{self, LogFormat};
use amqp_fcgi_bridge::supervisor::Supervisor;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "amqp-fcgi-bridge", version, disable_version_flag = true)]
struct Args {
    /// Path to the configuration file.
    #[arg(long = "config", default_value = "config.yml")]
    config: PathBuf,

    /// Log output format.
    #[arg(long = "log", value_parser = parse_log_format, default_value = "text")]
    log: LogFormat,

    /// Print the version and exit.
    #[arg(short = 'v', long = "version", action = clap::ArgAction::Version)]
    version: (),
}

fn parse_log_format(s: &str) -> Result<LogFormat, String> { s.parse() }

fn main() -> ExitCode {
    let args = Args::parse();
    log::init(args.log);
    let logger = log::default_logger();

    let (amqp_url, queues) = match config::load(&args.config) {
        Ok(loaded) => loaded,
        Err(e) => {
            let err = e.to_string();
            logger.error("failed to load configuration", &[("error", &err)]);
            return ExitCode::FAILURE;
        },
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            let err = e.to_string();
            logger.error("failed to start async runtime", &[("error", &err)]);
            return ExitCode::FAILURE;
        },
    };

    runtime.block_on(run(amqp_url, queues, logger));
    ExitCode::SUCCESS
}

async fn run(amqp_url: String, queues: Vec<QueueDescriptor>, logger: std::sync::Arc<dyn log::Log>) {
    let mut supervisor = Supervisor::start(amqp_url, queues, logger.clone());

    wait_for_shutdown_signal().await;

    logger.info("shutdown signal received, stopping gracefully", &[]);
    supervisor.stop().await;
}

async fn wait_for_shutdown_signal() {
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .expect("failed to install SIGTERM handler");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = sigterm.recv() => {},
    }
}
