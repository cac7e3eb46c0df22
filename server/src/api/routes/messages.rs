//! Buffered messages endpoint

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;
use utoipa::ToSchema;

use crate::data::MessageBuffer;

#[derive(Debug, Serialize, ToSchema)]
pub struct MessagesResponse {
    /// In the order they were delivered
    pub messages: Vec<String>,
}

/// Every message received since the consumer started
#[utoipa::path(
    get,
    path = "/messages",
    tag = "messages",
    responses(
        (status = 200, description = "Buffered messages", body = MessagesResponse)
    )
)]
pub async fn list_messages(State(buffer): State<Arc<MessageBuffer>>) -> Json<MessagesResponse> {
    Json(MessagesResponse {
        messages: buffer.snapshot(),
    })
}
