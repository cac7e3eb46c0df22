//! Topic provisioning

use std::sync::Arc;

use crate::data::broker::{BrokerBackend, BrokerError, TopicSpec};

/// What [`TopicProvisioner::ensure_topic`] found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    AlreadyExists,
    Created,
}

/// Makes sure the service topic exists before clients attach to it
#[derive(Clone)]
pub struct TopicProvisioner {
    broker: Arc<dyn BrokerBackend>,
}

impl TopicProvisioner {
    pub fn new(broker: Arc<dyn BrokerBackend>) -> Self {
        Self { broker }
    }

    /// Create `spec.name` if the broker does not know it yet.
    ///
    /// Safe to call repeatedly. An existing topic is never reconfigured. The
    /// admin session is dropped before returning on every path.
    pub async fn ensure_topic(&self, spec: &TopicSpec) -> Result<ProvisionOutcome, BrokerError> {
        let admin = self.broker.admin().await?;

        let topics = admin.list_topics().await?;
        if topics.iter().any(|t| t == &spec.name) {
            tracing::debug!(topic = %spec.name, "Topic already exists");
            return Ok(ProvisionOutcome::AlreadyExists);
        }

        match admin.create_topic(spec).await {
            Ok(()) => {
                tracing::info!(
                    topic = %spec.name,
                    partitions = spec.partitions,
                    replication_factor = spec.replication_factor,
                    "Topic created"
                );
                Ok(ProvisionOutcome::Created)
            }
            Err(BrokerError::TopicAlreadyExists(_)) => {
                tracing::debug!(topic = %spec.name, "Topic created concurrently");
                Ok(ProvisionOutcome::AlreadyExists)
            }
            Err(e) => Err(e),
        }
    }
}
