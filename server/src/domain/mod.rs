//! Service logic
//!
//! - `provision` - make sure the topic exists
//! - `producer` - connect and publish
//! - `consumer` - subscribe and buffer deliveries

pub mod consumer;
pub mod producer;
pub mod provision;

pub use consumer::{ConsumerService, HandlerError};
pub use producer::{ProducerError, ProducerService};
pub use provision::{ProvisionOutcome, TopicProvisioner};
