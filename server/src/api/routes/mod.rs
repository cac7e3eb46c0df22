//! API route handlers

pub mod health;
pub mod messages;
pub mod send;
