//! Kafka broker backend (`rdkafka`)
//!
//! Client creation in librdkafka is lazy, so every connect operation probes
//! the cluster with a metadata request before reporting success. Metadata
//! calls are blocking and run on the blocking thread pool.

use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use async_trait::async_trait;
use rdkafka::Message;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::{Client, ClientContext, DefaultClientContext};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, DefaultConsumerContext, StreamConsumer};
use rdkafka::producer::future_producer::FutureProducerContext;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::util::Timeout;

use super::backend::{
    AdminSession, BrokerBackend, ConsumerOptions, Delivery, DeliveryReceipt, MessageProducer,
    ProducerOptions, Subscription, TopicSpec,
};
use super::error::BrokerError;

/// Client id used by the administrative connection
const ADMIN_CLIENT_ID: &str = "courier-admin";

/// Kafka broker backend
pub struct KafkaBroker {
    brokers: String,
    request_timeout: Duration,
}

impl KafkaBroker {
    /// Create a backend for a comma-separated bootstrap server list
    pub fn new(brokers: impl Into<String>, request_timeout: Duration) -> Result<Self, BrokerError> {
        let brokers = brokers.into();
        if brokers.trim().is_empty() {
            return Err(BrokerError::Config("broker list is empty".into()));
        }
        Ok(Self {
            brokers,
            request_timeout,
        })
    }

    fn client_config(&self, client_id: &str) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.brokers)
            .set("client.id", client_id);
        config
    }
}

/// One topic as reported by a metadata response
#[derive(Debug)]
struct TopicStatus {
    name: String,
    error: Option<String>,
}

/// Names of the topics the cluster reported without a per-topic error.
///
/// A metadata request for a named topic always returns an entry for it;
/// a missing topic carries an error code instead of being left out.
fn available_topics(statuses: Vec<TopicStatus>) -> Vec<String> {
    statuses
        .into_iter()
        .filter_map(|status| match status.error {
            None => Some(status.name),
            Some(error) => {
                tracing::debug!(topic = %status.name, %error, "Topic unavailable in metadata");
                None
            }
        })
        .collect()
}

/// Fetch cluster metadata on the blocking pool
async fn probe<T>(
    owner: Arc<T>,
    topic: Option<String>,
    timeout: Duration,
) -> Result<Vec<TopicStatus>, BrokerError>
where
    T: HasClient + Send + Sync + 'static,
{
    tokio::task::spawn_blocking(move || {
        owner
            .raw_client()
            .fetch_metadata(topic.as_deref(), timeout)
            .map(|metadata| {
                metadata
                    .topics()
                    .iter()
                    .map(|t| TopicStatus {
                        name: t.name().to_string(),
                        error: t.error().map(|e| RDKafkaErrorCode::from(e).to_string()),
                    })
                    .collect::<Vec<_>>()
            })
    })
    .await
    .map_err(|e| BrokerError::Connection(format!("metadata task failed: {}", e)))?
    .map_err(|e| BrokerError::Connection(e.to_string()))
}

/// Access to the librdkafka client behind admin, producer and consumer handles
trait HasClient {
    type Context: ClientContext;

    fn raw_client(&self) -> &Client<Self::Context>;
}

impl HasClient for AdminClient<DefaultClientContext> {
    type Context = DefaultClientContext;

    fn raw_client(&self) -> &Client<Self::Context> {
        self.inner()
    }
}

impl HasClient for FutureProducer {
    type Context = FutureProducerContext<DefaultClientContext>;

    fn raw_client(&self) -> &Client<Self::Context> {
        Producer::client(self)
    }
}

impl HasClient for StreamConsumer {
    type Context = DefaultConsumerContext;

    fn raw_client(&self) -> &Client<Self::Context> {
        Consumer::client(self)
    }
}

struct KafkaAdminSession {
    client: Arc<AdminClient<DefaultClientContext>>,
    timeout: Duration,
}

#[async_trait]
impl AdminSession for KafkaAdminSession {
    async fn list_topics(&self) -> Result<Vec<String>, BrokerError> {
        probe(Arc::clone(&self.client), None, self.timeout)
            .await
            .map(available_topics)
    }

    async fn create_topic(&self, spec: &TopicSpec) -> Result<(), BrokerError> {
        let topic = NewTopic::new(
            &spec.name,
            spec.partitions,
            TopicReplication::Fixed(spec.replication_factor),
        );
        let options = AdminOptions::new().operation_timeout(Some(self.timeout));

        let results = self
            .client
            .create_topics([&topic], &options)
            .await
            .map_err(|e| BrokerError::Admin(e.to_string()))?;

        for result in results {
            match result {
                Ok(_) => {}
                Err((name, RDKafkaErrorCode::TopicAlreadyExists)) => {
                    return Err(BrokerError::TopicAlreadyExists(name));
                }
                Err((name, code)) => {
                    return Err(BrokerError::Admin(format!(
                        "failed to create topic '{}': {}",
                        name, code
                    )));
                }
            }
        }
        Ok(())
    }
}

struct KafkaProducer {
    producer: FutureProducer,
    queue_timeout: Duration,
}

#[async_trait]
impl MessageProducer for KafkaProducer {
    async fn send(&self, topic: &str, payload: &[u8]) -> Result<DeliveryReceipt, BrokerError> {
        let record = FutureRecord::<(), [u8]>::to(topic).payload(payload);
        match self
            .producer
            .send(record, Timeout::After(self.queue_timeout))
            .await
        {
            Ok((partition, offset)) => Ok(DeliveryReceipt { partition, offset }),
            Err((e, _)) => Err(BrokerError::Publish(e.to_string())),
        }
    }
}

#[async_trait]
impl BrokerBackend for KafkaBroker {
    async fn admin(&self) -> Result<Box<dyn AdminSession>, BrokerError> {
        let client: AdminClient<DefaultClientContext> =
            self.client_config(ADMIN_CLIENT_ID).create()?;
        let client = Arc::new(client);

        // Admin clients connect lazily; fail the acquisition if the cluster is down
        probe(Arc::clone(&client), None, self.request_timeout).await?;

        Ok(Box::new(KafkaAdminSession {
            client,
            timeout: self.request_timeout,
        }))
    }

    async fn connect_producer(
        &self,
        options: &ProducerOptions,
    ) -> Result<Arc<dyn MessageProducer>, BrokerError> {
        let producer: FutureProducer = self
            .client_config(&options.client_id)
            .set("acks", options.acks.as_kafka_value())
            .set("enable.idempotence", "false")
            .set("message.timeout.ms", options.message_timeout_ms.to_string())
            .create()?;

        probe(Arc::new(producer.clone()), None, self.request_timeout).await?;

        tracing::debug!(
            client_id = %options.client_id,
            acks = %options.acks,
            "Kafka producer created"
        );

        Ok(Arc::new(KafkaProducer {
            producer,
            queue_timeout: Duration::from_millis(options.message_timeout_ms),
        }))
    }

    async fn subscribe(
        &self,
        topic: &str,
        options: &ConsumerOptions,
    ) -> Result<Subscription, BrokerError> {
        let offset_reset = if options.from_beginning {
            "earliest"
        } else {
            "latest"
        };
        let consumer: StreamConsumer = self
            .client_config(&options.client_id)
            .set("group.id", &options.group_id)
            .set("auto.offset.reset", offset_reset)
            .set("enable.auto.commit", options.auto_commit.to_string())
            .set("session.timeout.ms", options.session_timeout_ms.to_string())
            .create()?;
        let consumer = Arc::new(consumer);

        let statuses = probe(
            Arc::clone(&consumer),
            Some(topic.to_string()),
            self.request_timeout,
        )
        .await?;
        if !available_topics(statuses).iter().any(|t| t == topic) {
            return Err(BrokerError::UnknownTopic(topic.to_string()));
        }

        consumer
            .subscribe(&[topic])
            .map_err(|e| BrokerError::Subscribe(e.to_string()))?;

        tracing::debug!(
            topic,
            group_id = %options.group_id,
            auto_offset_reset = offset_reset,
            auto_commit = options.auto_commit,
            "Kafka consumer subscribed"
        );

        let receiver = stream! {
            loop {
                // Borrowed messages must not live across a yield point
                let delivery = match consumer.recv().await {
                    Ok(message) => Ok(Delivery {
                        topic: message.topic().to_string(),
                        partition: message.partition(),
                        offset: message.offset(),
                        payload: message.payload().map(<[u8]>::to_vec),
                    }),
                    Err(e) => Err(BrokerError::Receive(e.to_string())),
                };
                yield delivery;
            }
        };

        Ok(Subscription {
            receiver: Box::pin(receiver),
        })
    }

    fn backend_name(&self) -> &'static str {
        "kafka"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::broker::Acks;

    #[test]
    fn test_empty_broker_list_rejected() {
        let result = KafkaBroker::new("  ", Duration::from_secs(1));
        assert!(matches!(result, Err(BrokerError::Config(_))));
    }

    #[test]
    fn test_backend_name() {
        let broker = KafkaBroker::new("localhost:9092", Duration::from_secs(1)).unwrap();
        assert_eq!(broker.backend_name(), "kafka");
    }

    #[test]
    fn test_client_config_sets_bootstrap_servers() {
        let broker = KafkaBroker::new("kafka:9092", Duration::from_secs(1)).unwrap();
        let config = broker.client_config("producer-service");
        assert_eq!(config.get("bootstrap.servers"), Some("kafka:9092"));
        assert_eq!(config.get("client.id"), Some("producer-service"));
    }

    #[test]
    fn test_topics_with_metadata_errors_are_unavailable() {
        let statuses = vec![
            TopicStatus {
                name: "messages".into(),
                error: None,
            },
            TopicStatus {
                name: "missing".into(),
                error: Some(RDKafkaErrorCode::UnknownTopicOrPartition.to_string()),
            },
        ];
        assert_eq!(available_topics(statuses), vec!["messages".to_string()]);
    }

    #[test]
    fn test_requested_missing_topic_is_not_available() {
        let statuses = vec![TopicStatus {
            name: "messages".into(),
            error: Some(RDKafkaErrorCode::UnknownTopic.to_string()),
        }];
        assert!(available_topics(statuses).is_empty());
    }

    #[tokio::test]
    async fn test_producer_connect_fails_without_cluster() {
        let broker = KafkaBroker::new("127.0.0.1:1", Duration::from_millis(200)).unwrap();
        let options = ProducerOptions {
            client_id: "producer-service".into(),
            acks: Acks::All,
            message_timeout_ms: 1000,
        };
        let result = broker.connect_producer(&options).await;
        assert!(matches!(result, Err(BrokerError::Connection(_))));
    }
}
