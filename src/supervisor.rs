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
use crate::backoff::Backoff;
use crate::connection::ConnectionSupervisor;
use crate::consumer::QueueDescriptor;
use crate::log::Log;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// The reconnect loop that survives everything except an explicit `stop()`.
pub struct Supervisor {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Supervisor {
    /// Spawns the top-level reconnect loop as a background task.
    pub fn start(url: String, queues: Vec<QueueDescriptor>, log: Arc<dyn Log>) -> Self {
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();

        let handle = tokio::spawn(async move {
            let connection_supervisor = ConnectionSupervisor::new(url, queues, log.clone());
            let mut backoff = Backoff::new();

            loop {
                if let Err(e) = connection_supervisor.run(&task_cancel).await {
                    let err = e.to_string();
                    log.error("an error occurred while serving the AMQP connection", &[("error", &err)]);
                }

                if task_cancel.is_cancelled() {
                    return;
                }

                let delay = backoff.timeout();
                let delay_ms = delay.as_millis().to_string();
                log.info("waiting before reconnecting", &[("delay_ms", &delay_ms)]);

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {},
                    _ = task_cancel.cancelled() => return,
                }
            }
        });

        Supervisor {
            cancel,
            handle: Some(handle),
        }
    }

    /// Cancels the loop and waits for it to finish: no new Processor
    /// invocations begin after this is called, and it returns only after
    /// every in-flight invocation has been Ack'd/Rejected or observed a
    /// channel-closed race.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}
