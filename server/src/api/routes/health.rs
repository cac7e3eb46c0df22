//! Health check endpoints

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;
use utoipa::ToSchema;

use crate::data::MessageBuffer;

#[derive(Debug, Serialize, ToSchema)]
pub struct ProducerHealthResponse {
    pub status: &'static str,
    pub service: &'static str,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerHealthResponse {
    pub status: &'static str,
    pub messages_received: usize,
}

/// Producer liveness
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is healthy", body = ProducerHealthResponse)
    )
)]
pub async fn producer_health() -> Json<ProducerHealthResponse> {
    Json(ProducerHealthResponse {
        status: "healthy",
        service: "producer",
    })
}

/// Consumer liveness and number of buffered messages
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is healthy", body = ConsumerHealthResponse)
    )
)]
pub async fn consumer_health(
    State(buffer): State<Arc<MessageBuffer>>,
) -> Json<ConsumerHealthResponse> {
    Json(ConsumerHealthResponse {
        status: "healthy",
        messages_received: buffer.len(),
    })
}
