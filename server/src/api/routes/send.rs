//! Publish endpoint

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::api::extractors::ValidatedJson;
use crate::api::types::{ApiError, ErrorResponse};
use crate::domain::ProducerService;
use crate::utils::time::now_iso;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SendRequest {
    #[validate(length(min = 1, message = "message must not be empty"))]
    pub message: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SendResponse {
    pub status: &'static str,
    pub message: String,
    /// RFC 3339, UTC, millisecond precision
    pub timestamp: String,
}

/// Publish one message to the topic
#[utoipa::path(
    post,
    path = "/send",
    tag = "messages",
    request_body = SendRequest,
    responses(
        (status = 200, description = "Message acknowledged by the broker", body = SendResponse),
        (status = 400, description = "Missing or empty message", body = ErrorResponse),
        (status = 500, description = "Broker rejected the message", body = ErrorResponse),
        (status = 503, description = "Producer not connected yet", body = ErrorResponse)
    )
)]
pub async fn send(
    State(producer): State<Arc<ProducerService>>,
    ValidatedJson(req): ValidatedJson<SendRequest>,
) -> Result<Json<SendResponse>, ApiError> {
    producer.publish(&req.message).await?;

    Ok(Json(SendResponse {
        status: "sent",
        message: req.message,
        timestamp: now_iso(),
    }))
}
