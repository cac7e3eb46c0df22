//! Producer service
//!
//! Owns the startup sequence (provision topic, connect producer) and the
//! connected producer handle used by `POST /send`.

use std::sync::{Arc, OnceLock};

use super::provision::TopicProvisioner;
use crate::data::broker::{
    BrokerBackend, BrokerError, DeliveryReceipt, MessageProducer, ProducerOptions, TopicSpec,
};
use crate::utils::retry::{ConnectState, Retrier, RetryError, RetryPolicy};

#[derive(Debug, thiserror::Error)]
pub enum ProducerError {
    #[error("producer is not connected to the broker yet ({state})")]
    NotConnected { state: ConnectState },

    #[error(transparent)]
    Broker(#[from] BrokerError),
}

pub struct ProducerService {
    broker: Arc<dyn BrokerBackend>,
    provisioner: TopicProvisioner,
    topic: TopicSpec,
    options: ProducerOptions,
    retrier: Retrier,
    producer: OnceLock<Arc<dyn MessageProducer>>,
}

impl ProducerService {
    pub fn new(
        broker: Arc<dyn BrokerBackend>,
        topic: TopicSpec,
        options: ProducerOptions,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            provisioner: TopicProvisioner::new(Arc::clone(&broker)),
            broker,
            topic,
            options,
            retrier: Retrier::new(policy),
            producer: OnceLock::new(),
        }
    }

    /// Provision the topic and connect the producer, retrying per policy.
    ///
    /// A producer from a failed attempt is dropped, never kept.
    pub async fn connect(&self) -> Result<(), RetryError<BrokerError>> {
        let producer = self
            .retrier
            .run("producer", move || async move {
                self.provisioner.ensure_topic(&self.topic).await?;
                self.broker.connect_producer(&self.options).await
            })
            .await?;

        if self.producer.set(producer).is_err() {
            tracing::debug!("Producer already connected, keeping existing handle");
        }
        tracing::info!(
            topic = %self.topic.name,
            client_id = %self.options.client_id,
            acks = %self.options.acks,
            backend = self.broker.backend_name(),
            "Producer ready"
        );
        Ok(())
    }

    /// Publish one message and wait for the broker acknowledgment
    pub async fn publish(&self, message: &str) -> Result<DeliveryReceipt, ProducerError> {
        let producer = self
            .producer
            .get()
            .ok_or_else(|| ProducerError::NotConnected {
                state: self.retrier.state(),
            })?;
        let receipt = producer.send(&self.topic.name, message.as_bytes()).await?;
        tracing::info!(
            topic = %self.topic.name,
            partition = receipt.partition,
            offset = receipt.offset,
            "Message sent"
        );
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::data::broker::{Acks, MemoryBroker};

    fn service(broker: &MemoryBroker, max_attempts: u32) -> ProducerService {
        ProducerService::new(
            Arc::new(broker.clone()),
            TopicSpec {
                name: "test-topic".into(),
                partitions: 1,
                replication_factor: 1,
            },
            ProducerOptions {
                client_id: "producer-service".into(),
                acks: Acks::All,
                message_timeout_ms: 1000,
            },
            RetryPolicy {
                max_attempts,
                delay: Duration::from_millis(5000),
            },
        )
    }

    #[tokio::test]
    async fn test_publish_before_connect() {
        let broker = MemoryBroker::new();
        let producer = service(&broker, 10);

        let err = producer.publish("hello").await.unwrap_err();
        assert!(matches!(
            err,
            ProducerError::NotConnected {
                state: ConnectState::Idle
            }
        ));
    }

    #[tokio::test]
    async fn test_connect_provisions_and_publishes() {
        let broker = MemoryBroker::new();
        let producer = service(&broker, 10);

        producer.connect().await.unwrap();
        assert!(broker.topic_spec("test-topic").is_some());

        let receipt = producer.publish("hello").await.unwrap();
        assert_eq!(receipt.offset, 0);
        assert_eq!(broker.record_count("test-topic"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_survives_short_outage() {
        let broker = MemoryBroker::new();
        broker.fail_connections(3);
        let producer = service(&broker, 10);

        producer.connect().await.unwrap();
        assert_eq!(
            producer.retrier.state(),
            ConnectState::Connected { attempts: 4 }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_gives_up_after_max_attempts() {
        let broker = MemoryBroker::new();
        broker.fail_connections(u32::MAX);
        let producer = service(&broker, 10);

        let Err(RetryError::Exhausted { attempts, source }) = producer.connect().await else {
            panic!("expected exhaustion");
        };
        assert_eq!(attempts, 10);
        assert!(matches!(source, BrokerError::Connection(_)));
        assert_eq!(broker.connect_attempts(), 10);

        let err = producer.publish("hello").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "producer is not connected to the broker yet (failed after 10 attempts: \
             connection error: broker unavailable (simulated))"
        );
    }

    #[tokio::test]
    async fn test_publish_error_is_reported() {
        let broker = MemoryBroker::new();
        let producer = service(&broker, 1);
        producer.connect().await.unwrap();

        broker.fail_publishes(true);
        let err = producer.publish("hello").await.unwrap_err();
        assert!(matches!(err, ProducerError::Broker(BrokerError::Publish(_))));
    }
}
