//! OpenAPI documents, one per service

use axum::response::{IntoResponse, Json};
use utoipa::OpenApi;

use crate::api::routes::{health, messages, send};
use crate::api::types::ErrorResponse;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Courier Producer API",
        version = env!("CARGO_PKG_VERSION"),
        description = "Publishes messages to the configured topic"
    ),
    tags(
        (name = "health", description = "Health check endpoint"),
        (name = "messages", description = "Message publishing")
    ),
    paths(health::producer_health, send::send),
    components(schemas(
        ErrorResponse,
        health::ProducerHealthResponse,
        send::SendRequest,
        send::SendResponse,
    ))
)]
pub struct ProducerApiDoc;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Courier Consumer API",
        version = env!("CARGO_PKG_VERSION"),
        description = "Exposes messages received from the configured topic"
    ),
    tags(
        (name = "health", description = "Health check endpoint"),
        (name = "messages", description = "Received messages")
    ),
    paths(health::consumer_health, messages::list_messages),
    components(schemas(health::ConsumerHealthResponse, messages::MessagesResponse))
)]
pub struct ConsumerApiDoc;

/// Serve the producer OpenAPI JSON
pub async fn producer_openapi() -> impl IntoResponse {
    Json(ProducerApiDoc::openapi())
}

/// Serve the consumer OpenAPI JSON
pub async fn consumer_openapi() -> impl IntoResponse {
    Json(ConsumerApiDoc::openapi())
}
