//! Broker error types

use thiserror::Error;

/// Error type for broker operations
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Broker unreachable or client could not be created
    #[error("connection error: {0}")]
    Connection(String),

    /// Administrative request (list/create topics) failed
    #[error("admin error: {0}")]
    Admin(String),

    /// Create-topic request raced with another creator
    #[error("topic '{0}' already exists")]
    TopicAlreadyExists(String),

    /// Topic is not known to the broker
    #[error("unknown topic '{0}'")]
    UnknownTopic(String),

    /// Broker rejected or failed a send
    #[error("publish error: {0}")]
    Publish(String),

    /// Subscription could not be established
    #[error("subscribe error: {0}")]
    Subscribe(String),

    /// Transient error while receiving from a subscription
    #[error("receive error: {0}")]
    Receive(String),

    /// Invalid client configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<rdkafka::error::KafkaError> for BrokerError {
    fn from(err: rdkafka::error::KafkaError) -> Self {
        match err {
            rdkafka::error::KafkaError::ClientConfig(_, _, _, _)
            | rdkafka::error::KafkaError::ClientCreation(_) => BrokerError::Config(err.to_string()),
            _ => BrokerError::Connection(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            BrokerError::TopicAlreadyExists("test-topic".into()).to_string(),
            "topic 'test-topic' already exists"
        );
        assert_eq!(
            BrokerError::Connection("refused".into()).to_string(),
            "connection error: refused"
        );
    }

    #[test]
    fn test_from_kafka_error() {
        let err: BrokerError = rdkafka::error::KafkaError::ClientCreation("bad".into()).into();
        assert!(matches!(err, BrokerError::Config(_)));

        let err: BrokerError = rdkafka::error::KafkaError::Canceled.into();
        assert!(matches!(err, BrokerError::Connection(_)));
    }
}
