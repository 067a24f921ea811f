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
use crate::consumer::{QueueConsumer, QueueDescriptor};
use crate::log::Log;
use lapin::{Connection, ConnectionProperties};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// One reconnect attempt's worth of state: a broker connection, one
/// queue-consumer restart-loop task per configured queue, and the subtree
/// cancellation token that ties them all to this connection's lifetime.
pub struct ConnectionSupervisor {
    url: String,
    queues: Arc<Vec<Arc<QueueDescriptor>>>,
    log: Arc<dyn Log>,
}

impl ConnectionSupervisor {
    pub fn new(url: String, queues: Vec<QueueDescriptor>, log: Arc<dyn Log>) -> Self {
        ConnectionSupervisor {
            url,
            queues: Arc::new(queues.into_iter().map(Arc::new).collect()),
            log,
        }
    }

    /// Dials the broker, runs every configured queue consumer until either
    /// the connection closes or `parent` is cancelled, then closes the
    /// connection. Returns the close error, if any, so the caller can log it
    /// before backing off.
    pub async fn run(&self, parent: &CancellationToken) -> Result<(), lapin::Error> {
        self.log.info("connecting to AMQP server", &[]);

        let connection = Connection::connect(
            &self.url,
            ConnectionProperties::default()
                .with_executor(tokio_executor_trait::Tokio::current())
                .with_reactor(tokio_reactor_trait::Tokio),
        )
        .await?;

        let subtree = parent.child_token();

        let (close_tx, close_rx) = oneshot::channel();
        let close_tx = std::sync::Mutex::new(Some(close_tx));
        connection.on_error(move |err| {
            if let Some(tx) = close_tx.lock().unwrap().take() {
                let _ = tx.send(err);
            }
        });

        let mut restart_loops = JoinSet::new();
        for descriptor in self.queues.iter().cloned() {
            let connection = connection.clone();
            let subtree = subtree.clone();
            let log = self.log.clone();
            restart_loops.spawn(async move {
                consumer_restart_loop(connection, descriptor, subtree, log).await;
            });
        }

        let close_error = tokio::select! {
            result = close_rx => result.ok(),
            _ = parent.cancelled() => None,
        };

        subtree.cancel();

        while restart_loops.join_next().await.is_some() {}

        let _ = connection.close(0, "shutting down").await;
        self.log.info("AMQP connection was closed", &[]);

        match close_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Runs one queue's consumer repeatedly, backing off between restarts, until
/// the subtree is cancelled.
async fn consumer_restart_loop(
    connection: Connection,
    descriptor: Arc<QueueDescriptor>,
    subtree: CancellationToken,
    log: Arc<dyn Log>,
) {
    let consumer = QueueConsumer::new(descriptor.clone());
    let mut backoff = Backoff::new();

    loop {
        log.debug("starting consumer", &[("queue", &descriptor.queue)]);

        if let Err(e) = consumer.run(&connection, subtree.child_token()).await {
            let err = e.to_string();
            log.error("consumer exited with an error", &[("queue", &descriptor.queue), ("error", &err)]);
        }

        log.debug("consumer has stopped", &[("queue", &descriptor.queue)]);

        if subtree.is_cancelled() {
            return;
        }

        let delay = backoff.timeout();
        let delay_ms = delay.as_millis().to_string();
        log.info(
            "waiting before re-starting consumer",
            &[("queue", &descriptor.queue), ("delay_ms", &delay_ms)],
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {},
            _ = subtree.cancelled() => return,
        }
    }
}
