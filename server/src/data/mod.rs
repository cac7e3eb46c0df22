//! Data layer: broker access and in-process state

pub mod broker;
pub mod buffer;

pub use broker::{BrokerBackend, BrokerError};
pub use buffer::MessageBuffer;
