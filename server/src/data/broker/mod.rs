//! Message broker access
//!
//! Services talk to the broker only through [`BrokerBackend`]:
//! - Kafka (default) - `rdkafka` clients against a real cluster
//! - Memory - single-process broker for development and tests
//!
//! ## Configuration
//!
//! - `broker.backend = "kafka"` → [`KafkaBroker`] on `broker.brokers`
//! - `broker.backend = "memory"` → [`MemoryBroker`]

mod backend;
mod error;
mod kafka;
mod memory;

use std::sync::Arc;
use std::time::Duration;

pub use backend::{
    Acks, AdminSession, BrokerBackend, ConsumerOptions, Delivery, DeliveryReceipt,
    MessageProducer, ProducerOptions, Subscription, TopicSpec,
};
pub use error::BrokerError;
pub use kafka::KafkaBroker;
pub use memory::MemoryBroker;

use crate::core::config::{BrokerBackendType, BrokerConfig};

/// Build the configured broker backend
pub fn from_config(config: &BrokerConfig) -> Result<Arc<dyn BrokerBackend>, BrokerError> {
    let backend: Arc<dyn BrokerBackend> = match config.backend {
        BrokerBackendType::Kafka => Arc::new(KafkaBroker::new(
            config.brokers.clone(),
            Duration::from_millis(config.request_timeout_ms),
        )?),
        BrokerBackendType::Memory => Arc::new(MemoryBroker::new()),
    };
    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_selects_backend() {
        let mut config = BrokerConfig::default();
        assert_eq!(from_config(&config).unwrap().backend_name(), "kafka");

        config.backend = BrokerBackendType::Memory;
        assert_eq!(from_config(&config).unwrap().backend_name(), "memory");
    }

    #[test]
    fn test_from_config_rejects_empty_brokers() {
        let config = BrokerConfig {
            brokers: String::new(),
            ..Default::default()
        };
        assert!(from_config(&config).is_err());
    }
}
