//! Consumer service
//!
//! Startup (provision topic, subscribe) runs under the retrier. Once
//! subscribed, two tasks run until shutdown:
//!
//! ```text
//! broker stream ──▶ receive task ──mpsc──▶ handler task ──▶ MessageBuffer
//! ```
//!
//! The handler task is the only writer of the buffer. A record the handler
//! cannot process is logged and skipped.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::provision::TopicProvisioner;
use crate::core::constants::DELIVERY_CHANNEL_CAPACITY;
use crate::data::MessageBuffer;
use crate::data::broker::{
    BrokerBackend, BrokerError, ConsumerOptions, Delivery, Subscription, TopicSpec,
};
use crate::utils::retry::{Retrier, RetryError, RetryPolicy};

/// A delivered record the handler could not turn into a message
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("record at partition {partition} offset {offset} has no payload")]
    MissingPayload { partition: i32, offset: i64 },
}

pub struct ConsumerService {
    broker: Arc<dyn BrokerBackend>,
    provisioner: TopicProvisioner,
    topic: TopicSpec,
    options: ConsumerOptions,
    retrier: Retrier,
    buffer: Arc<MessageBuffer>,
}

impl ConsumerService {
    pub fn new(
        broker: Arc<dyn BrokerBackend>,
        topic: TopicSpec,
        options: ConsumerOptions,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            provisioner: TopicProvisioner::new(Arc::clone(&broker)),
            broker,
            topic,
            options,
            retrier: Retrier::new(policy),
            buffer: Arc::new(MessageBuffer::new()),
        }
    }

    pub fn buffer(&self) -> Arc<MessageBuffer> {
        Arc::clone(&self.buffer)
    }

    /// Provision the topic and subscribe, retrying per policy
    pub async fn connect(&self) -> Result<Subscription, RetryError<BrokerError>> {
        let subscription = self
            .retrier
            .run("consumer", move || async move {
                self.provisioner.ensure_topic(&self.topic).await?;
                self.broker.subscribe(&self.topic.name, &self.options).await
            })
            .await?;

        tracing::info!(
            topic = %self.topic.name,
            group_id = %self.options.group_id,
            from_beginning = self.options.from_beginning,
            backend = self.broker.backend_name(),
            "Consumer subscribed"
        );
        Ok(subscription)
    }

    /// Start the delivery loop on `subscription`.
    ///
    /// The returned handle completes once shutdown is requested or the
    /// subscription ends, after every forwarded record has been handled.
    pub fn start(
        &self,
        subscription: Subscription,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let (tx, rx) = mpsc::channel::<Delivery>(DELIVERY_CHANNEL_CAPACITY);
        let handler = tokio::spawn(run_handler(rx, Arc::clone(&self.buffer)));
        let mut receiver = subscription.receiver;

        tokio::spawn(async move {
            tracing::debug!("Consumer loop started");

            loop {
                if *shutdown_rx.borrow() {
                    break;
                }

                tokio::select! {
                    biased;
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            tracing::debug!("Consumer loop received shutdown");
                            break;
                        }
                    }
                    next = receiver.next() => {
                        match next {
                            Some(Ok(delivery)) => {
                                if tx.send(delivery).await.is_err() {
                                    tracing::warn!("Message handler stopped, ending consumer loop");
                                    break;
                                }
                            }
                            Some(Err(e)) => {
                                tracing::warn!(error = %e, "Error receiving from broker");
                            }
                            None => {
                                tracing::info!("Subscription closed");
                                break;
                            }
                        }
                    }
                }
            }

            drop(tx);
            if let Err(e) = handler.await {
                tracing::error!(error = %e, "Message handler task failed");
            }
            tracing::debug!("Consumer loop shutdown complete");
        })
    }
}

async fn run_handler(mut rx: mpsc::Receiver<Delivery>, buffer: Arc<MessageBuffer>) {
    while let Some(delivery) = rx.recv().await {
        let (partition, offset) = (delivery.partition, delivery.offset);
        match decode(delivery) {
            Ok(message) => {
                tracing::info!(partition, offset, message = %message, "Received message");
                buffer.append(message);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Skipping record");
            }
        }
    }
}

fn decode(delivery: Delivery) -> Result<String, HandlerError> {
    match delivery.payload {
        Some(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        None => Err(HandlerError::MissingPayload {
            partition: delivery.partition,
            offset: delivery.offset,
        }),
    }
}
