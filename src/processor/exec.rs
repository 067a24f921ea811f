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
use super::Processor;
use crate::delivery::HeaderMap;
use crate::outcome::Outcome;
use async_trait::async_trait;
use std::io;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Alternate adapter: spawns a subprocess per invocation, feeding the body
/// on stdin and the projected headers as its environment.
pub struct ExecProcessor {
    command: String,
    args: Vec<String>,
}

impl ExecProcessor {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        ExecProcessor {
            command: command.into(),
            args,
        }
    }

    async fn run(&self, headers: HeaderMap, body: Vec<u8>) -> io::Result<std::process::ExitStatus> {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .envs(headers)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            // The context binds the child's lifetime to this call: if `process`'s
            // `select!` picks the cancellation branch, dropping this future must
            // kill the child rather than orphan it.
            .kill_on_drop(true);

        let mut child = cmd.spawn()?;
        let mut stdin = child.stdin.take().expect("piped stdin");
        stdin.write_all(&body).await?;
        drop(stdin);

        child.wait().await
    }
}

#[async_trait]
impl Processor for ExecProcessor {
    async fn process(&self, cancel: &CancellationToken, headers: HeaderMap, body: Vec<u8>) -> Outcome {
        tokio::select! {
            result = self.run(headers, body) => match result {
                Ok(status) if status.success() => Outcome::Ok,
                Ok(_) => Outcome::Other(Box::new(io::Error::other("command exited non-zero"))),
                Err(e) => Outcome::Other(Box::new(e)),
            },
            _ = cancel.cancelled() => Outcome::Other(Box::new(io::Error::other("cancelled"))),
        }
    }
}
