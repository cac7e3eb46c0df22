//! Broker backend trait definition
//!
//! Defines the seam between the services and the message broker. Two
//! implementations exist:
//! - Kafka (`rdkafka`) - the production backend
//! - Memory - single-process broker for development and tests
//!
//! Delivery semantics are at-least-once: a subscription may redeliver records
//! after a reconnect, and a publish is acknowledged only once the broker has
//! accepted the record.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use super::error::BrokerError;

/// Topic definition used for provisioning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSpec {
    pub name: String,
    pub partitions: i32,
    pub replication_factor: i32,
}

/// Record received from a subscription
#[derive(Debug, Clone)]
pub struct Delivery {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    /// `None` for records without a value (tombstones)
    pub payload: Option<Vec<u8>>,
}

/// Broker acknowledgment of a published record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub partition: i32,
    pub offset: i64,
}

/// Producer acknowledgment level (`acks`)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Acks {
    /// Wait for all in-sync replicas
    #[default]
    All,
    /// Wait for the partition leader only
    Leader,
    /// Do not wait for the broker
    None,
}

impl Acks {
    pub fn as_kafka_value(&self) -> &'static str {
        match self {
            Acks::All => "all",
            Acks::Leader => "1",
            Acks::None => "0",
        }
    }
}

impl fmt::Display for Acks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Acks::All => write!(f, "all"),
            Acks::Leader => write!(f, "leader"),
            Acks::None => write!(f, "none"),
        }
    }
}

/// Producer client settings
#[derive(Debug, Clone)]
pub struct ProducerOptions {
    pub client_id: String,
    pub acks: Acks,
    pub message_timeout_ms: u64,
}

/// Consumer client settings
#[derive(Debug, Clone)]
pub struct ConsumerOptions {
    pub client_id: String,
    pub group_id: String,
    /// Start from the earliest retained offset when the group has no commit
    pub from_beginning: bool,
    pub auto_commit: bool,
    pub session_timeout_ms: u64,
}

/// Subscription to a topic
pub struct Subscription {
    /// Stream of delivered records, in broker delivery order
    pub receiver: Pin<Box<dyn Stream<Item = Result<Delivery, BrokerError>> + Send>>,
}

/// Administrative connection to the broker.
///
/// Acquired with [`BrokerBackend::admin`] and released when dropped.
#[async_trait]
pub trait AdminSession: Send + Sync {
    /// Names of all topics known to the broker
    async fn list_topics(&self) -> Result<Vec<String>, BrokerError>;

    /// Create a topic.
    ///
    /// Returns [`BrokerError::TopicAlreadyExists`] when the topic was created
    /// by someone else in the meantime.
    async fn create_topic(&self, spec: &TopicSpec) -> Result<(), BrokerError>;
}

/// Connected producer
#[async_trait]
pub trait MessageProducer: Send + Sync {
    /// Publish a single record and wait for the broker acknowledgment
    async fn send(&self, topic: &str, payload: &[u8]) -> Result<DeliveryReceipt, BrokerError>;
}

/// Broker backend trait
#[async_trait]
pub trait BrokerBackend: Send + Sync {
    /// Acquire an administrative connection
    async fn admin(&self) -> Result<Box<dyn AdminSession>, BrokerError>;

    /// Create a producer and verify the broker is reachable
    async fn connect_producer(
        &self,
        options: &ProducerOptions,
    ) -> Result<Arc<dyn MessageProducer>, BrokerError>;

    /// Create a consumer, verify the broker is reachable and subscribe to `topic`
    async fn subscribe(
        &self,
        topic: &str,
        options: &ConsumerOptions,
    ) -> Result<Subscription, BrokerError>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acks_serde() {
        let acks: Acks = serde_json::from_str(r#""leader""#).unwrap();
        assert_eq!(acks, Acks::Leader);
        assert_eq!(Acks::default(), Acks::All);
    }

    #[test]
    fn test_acks_kafka_value() {
        assert_eq!(Acks::All.as_kafka_value(), "all");
        assert_eq!(Acks::Leader.as_kafka_value(), "1");
        assert_eq!(Acks::None.as_kafka_value(), "0");
    }
}
