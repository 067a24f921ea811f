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
use crate::delivery::{project_headers, Delivery, DeliveryProperties};
use crate::outcome::{Outcome, Verb};
use crate::processor::Processor;
use lapin::options::{BasicAckOptions, BasicConsumeOptions, BasicQosOptions, BasicRejectOptions};
use lapin::types::{AMQPValue, FieldTable};
use lapin::Connection;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Immutable configuration for one queue consumer.
pub struct QueueDescriptor {
    pub queue: String,
    pub parallelism: u16,
    pub prefetch: Option<u16>,
    pub failure_timeout_ms: u64,
    pub processor: Arc<dyn Processor>,
}

impl QueueDescriptor {
    fn effective_prefetch(&self) -> u16 { self.prefetch.unwrap_or(self.parallelism) }
}

#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("failed to open channel: {0}")]
    Channel(#[source] lapin::Error),

    #[error("failed to set QoS: {0}")]
    Qos(#[source] lapin::Error),

    #[error("failed to start consuming: {0}")]
    Consume(#[source] lapin::Error),

    #[error("failed to acknowledge or reject delivery: {0}")]
    Verb(#[source] lapin::Error),

    #[error("delivery stream ended with an error: {0}")]
    Stream(#[source] lapin::Error),
}

/// Drives a single queue's lifecycle on one broker connection: open a
/// channel, set QoS, start consuming, and dispatch deliveries under a
/// bounded-concurrency token pool.
pub struct QueueConsumer {
    descriptor: Arc<QueueDescriptor>,
}

impl QueueConsumer {
    pub fn new(descriptor: Arc<QueueDescriptor>) -> Self { QueueConsumer { descriptor } }

    pub async fn run(&self, connection: &Connection, cancel: CancellationToken) -> Result<(), ConsumerError> {
        let channel = connection.create_channel().await.map_err(ConsumerError::Channel)?;

        channel
            .basic_qos(self.descriptor.effective_prefetch(), BasicQosOptions { global: false })
            .await
            .map_err(ConsumerError::Qos)?;

        let mut consumer = channel
            .basic_consume(
                &self.descriptor.queue,
                "",
                BasicConsumeOptions {
                    no_local: false,
                    no_ack: false,
                    exclusive: false,
                    nowait: false,
                },
                FieldTable::default(),
            )
            .await
            .map_err(ConsumerError::Consume)?;

        let consumer_tag = consumer.tag().to_string();
        let semaphore = Arc::new(Semaphore::new(self.descriptor.parallelism as usize));

        // Cancelling this token (on the first task failure) reaches every
        // in-flight task's `task_cancel`, since each is a child of it -- the
        // scoped, error-propagating group semantics spec.md §4.8 calls for.
        let group_cancel = cancel.child_token();
        let mut tasks: JoinSet<Result<(), ConsumerError>> = JoinSet::new();

        let mut result: Result<(), ConsumerError> = Ok(());

        'dispatch: loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break 'dispatch,

                finished = next_finished(&mut tasks) => {
                    if let Some(finished) = finished {
                        if let Err(e) = propagate(finished) {
                            // A task's Ack/Reject failed: fail-fast the
                            // consumer and cancel every sibling still running.
                            group_cancel.cancel();
                            result = Err(e);
                            break 'dispatch;
                        }
                    }
                },

                next = futures::StreamExt::next(&mut consumer) => {
                    let Some(next) = next else { break 'dispatch };
                    let delivery = match next {
                        Ok(delivery) => delivery,
                        Err(e) => {
                            result = Err(ConsumerError::Stream(e));
                            break 'dispatch;
                        },
                    };

                    let permit = semaphore.clone().acquire_owned().await.expect("semaphore never closed");
                    let descriptor = self.descriptor.clone();
                    let task_cancel = group_cancel.child_token();
                    let consumer_tag = consumer_tag.clone();

                    tasks.spawn(async move {
                        let _permit = permit;
                        handle_delivery(descriptor, delivery, consumer_tag, task_cancel).await
                    });
                },
            }
        }

        while let Some(finished) = tasks.join_next().await {
            if result.is_ok() {
                result = propagate(finished);
            }
        }

        let _ = channel.close(200, "consumer stopped").await;

        result
    }
}

/// Waits for the next finished task, never resolving while `tasks` is empty
/// -- `JoinSet::join_next` on an empty set returns `None` immediately, which
/// would otherwise spin the enclosing `select!` in a busy loop.
async fn next_finished(
    tasks: &mut JoinSet<Result<(), ConsumerError>>,
) -> Option<Result<Result<(), ConsumerError>, tokio::task::JoinError>> {
    if tasks.is_empty() {
        std::future::pending().await
    } else {
        tasks.join_next().await
    }
}

fn propagate(
    finished: Result<Result<(), ConsumerError>, tokio::task::JoinError>,
) -> Result<(), ConsumerError> {
    match finished {
        Ok(result) => result,
        Err(e) if e.is_cancelled() => Ok(()),
        Err(e) => std::panic::resume_unwind(e.into_panic()),
    }
}

async fn handle_delivery(
    descriptor: Arc<QueueDescriptor>,
    delivery: lapin::message::Delivery,
    consumer_tag: String,
    cancel: CancellationToken,
) -> Result<(), ConsumerError> {
    let model = to_model_delivery(&delivery, consumer_tag);
    let headers = project_headers(&model);

    let outcome = descriptor.processor.process(&cancel, headers, model.body).await;

    match outcome.verb() {
        Verb::Ack => {
            delivery
                .acker
                .ack(BasicAckOptions { multiple: false })
                .await
                .map_err(ConsumerError::Verb)?;
        },
        Verb::RejectNoRequeue => {
            delivery
                .acker
                .reject(BasicRejectOptions { requeue: false })
                .await
                .map_err(ConsumerError::Verb)?;
        },
        Verb::RejectWithDelayThenRequeue => {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(descriptor.failure_timeout_ms)) => {
                    delivery
                        .acker
                        .reject(BasicRejectOptions { requeue: true })
                        .await
                        .map_err(ConsumerError::Verb)?;
                },
                _ = cancel.cancelled() => {
                    // Shutdown raced the delay: skip the reject and let the
                    // broker's unacknowledged-message recovery take over.
                },
            }
        },
    }

    Ok(())
}

fn to_model_delivery(delivery: &lapin::message::Delivery, consumer_tag: String) -> Delivery {
    let props = delivery.properties.clone();

    Delivery {
        body: delivery.data.clone(),
        delivery_tag: delivery.delivery_tag,
        consumer_tag,
        exchange: delivery.exchange.to_string(),
        routing_key: delivery.routing_key.to_string(),
        redelivered: delivery.redelivered,
        properties: DeliveryProperties {
            content_type: props.content_type().as_ref().map(|v| v.to_string()),
            content_encoding: props.content_encoding().as_ref().map(|v| v.to_string()),
            delivery_mode: *props.delivery_mode(),
            priority: *props.priority(),
            correlation_id: props.correlation_id().as_ref().map(|v| v.to_string()),
            reply_to: props.reply_to().as_ref().map(|v| v.to_string()),
            expiration: props.expiration().as_ref().map(|v| v.to_string()),
            message_id: props.message_id().as_ref().map(|v| v.to_string()),
            timestamp: *props.timestamp(),
            kind: props.kind().as_ref().map(|v| v.to_string()),
            user_id: props.user_id().as_ref().map(|v| v.to_string()),
            app_id: props.app_id().as_ref().map(|v| v.to_string()),
        },
        headers: props
            .headers()
            .as_ref()
            .map(|table| {
                table
                    .inner()
                    .iter()
                    .map(|(k, v)| (k.to_string(), stringify_amqp_value(v)))
                    .collect()
            })
            .unwrap_or_default(),
    }
}

/// Stringifies a header value. `FieldTable` has no blanket `Display`; each
/// `AMQPValue` variant is matched individually, per the broker library's own
/// convention for reading headers back out.
fn stringify_amqp_value(value: &AMQPValue) -> String {
    match value {
        AMQPValue::ShortString(s) => s.to_string(),
        AMQPValue::LongString(s) => String::from_utf8_lossy(s.as_bytes()).into_owned(),
        _ => format!("{:?}", value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::HeaderMap;
    use async_trait::async_trait;

    struct StubProcessor;

    #[async_trait]
    impl Processor for StubProcessor {
        async fn process(&self, _cancel: &CancellationToken, _headers: HeaderMap, _body: Vec<u8>) -> Outcome {
            Outcome::Ok
        }
    }

    fn descriptor(prefetch: Option<u16>) -> QueueDescriptor {
        QueueDescriptor {
            queue: "q".to_string(),
            parallelism: 4,
            prefetch,
            failure_timeout_ms: 1000,
            processor: Arc::new(StubProcessor),
        }
    }

    #[test]
    fn effective_prefetch_defaults_to_parallelism() {
        assert_eq!(descriptor(None).effective_prefetch(), 4);
        assert_eq!(descriptor(Some(8)).effective_prefetch(), 8);
    }
}
