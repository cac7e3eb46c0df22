//! Courier: HTTP producer and consumer services for a Kafka topic

pub mod api;
mod app;
pub mod core;
pub mod data;
pub mod domain;
pub mod utils;
