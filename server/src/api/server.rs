//! HTTP listeners for the producer and consumer services

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use super::middleware;
use super::openapi::{consumer_openapi, producer_openapi};
use super::routes::{health, messages, send};
use crate::core::ShutdownService;
use crate::core::config::{ServerConfig, ServiceRole};
use crate::core::constants::DEFAULT_BODY_LIMIT;
use crate::data::MessageBuffer;
use crate::domain::ProducerService;

/// Routes of the producer service
pub fn producer_router(producer: Arc<ProducerService>) -> Router {
    let router = Router::new()
        .route("/send", post(send::send))
        .route("/health", get(health::producer_health))
        .route("/openapi.json", get(producer_openapi))
        .with_state(producer);
    with_common_layers(router)
}

/// Routes of the consumer service
pub fn consumer_router(buffer: Arc<MessageBuffer>) -> Router {
    let router = Router::new()
        .route("/messages", get(messages::list_messages))
        .route("/health", get(health::consumer_health))
        .route("/openapi.json", get(consumer_openapi))
        .with_state(buffer);
    with_common_layers(router)
}

fn with_common_layers(router: Router) -> Router {
    router
        .fallback(middleware::handle_404)
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(DEFAULT_BODY_LIMIT))
}

/// One HTTP listener serving one service role
pub struct ApiServer {
    role: ServiceRole,
    host: String,
    port: u16,
    router: Router,
    shutdown: ShutdownService,
}

impl ApiServer {
    pub fn producer(
        config: &ServerConfig,
        producer: Arc<ProducerService>,
        shutdown: ShutdownService,
    ) -> Self {
        Self {
            role: ServiceRole::Producer,
            host: config.host.clone(),
            port: config.port(ServiceRole::Producer),
            router: producer_router(producer),
            shutdown,
        }
    }

    pub fn consumer(
        config: &ServerConfig,
        buffer: Arc<MessageBuffer>,
        shutdown: ShutdownService,
    ) -> Self {
        Self {
            role: ServiceRole::Consumer,
            host: config.host.clone(),
            port: config.port(ServiceRole::Consumer),
            router: consumer_router(buffer),
            shutdown,
        }
    }

    /// Serve until shutdown is triggered
    pub async fn start(self) -> Result<()> {
        let Self {
            role,
            host,
            port,
            router,
            shutdown,
        } = self;

        let listener = TcpListener::bind((host.as_str(), port))
            .await
            .with_context(|| format!("Failed to bind {} service to {}:{}", role, host, port))?;
        tracing::info!(service = %role, host = %host, port, "HTTP server listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown.wait())
            .await
            .with_context(|| format!("{} HTTP server failed", role))?;

        tracing::debug!(service = %role, "HTTP server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use crate::data::broker::{Acks, MemoryBroker, ProducerOptions, TopicSpec};
    use crate::utils::retry::RetryPolicy;

    fn producer_service(broker: &MemoryBroker) -> Arc<ProducerService> {
        Arc::new(ProducerService::new(
            Arc::new(broker.clone()),
            TopicSpec {
                name: "test-topic".into(),
                partitions: 1,
                replication_factor: 1,
            },
            ProducerOptions {
                client_id: "producer-service".into(),
                acks: Acks::All,
                message_timeout_ms: 1000,
            },
            RetryPolicy {
                max_attempts: 1,
                delay: Duration::from_millis(1),
            },
        ))
    }

    async fn connected_producer(broker: &MemoryBroker) -> Arc<ProducerService> {
        let producer = producer_service(broker);
        producer.connect().await.unwrap();
        producer
    }

    fn post_send(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/send")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_send_publishes_and_echoes() {
        let broker = MemoryBroker::new();
        let router = producer_router(connected_producer(&broker).await);

        let response = router
            .oneshot(post_send(r#"{"message":"hello"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["status"], "sent");
        assert_eq!(body["message"], "hello");
        let timestamp = body["timestamp"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
        assert_eq!(broker.record_count("test-topic"), 1);
    }

    #[tokio::test]
    async fn test_send_rejects_missing_or_empty_message() {
        let broker = MemoryBroker::new();
        let router = producer_router(connected_producer(&broker).await);

        for body in [
            "{}",
            r#"{"message":""}"#,
            r#"{"message":null}"#,
            r#"{"message":42}"#,
            "not json",
        ] {
            let response = router.clone().oneshot(post_send(body)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {body}");
            let body = json_body(response).await;
            assert_eq!(body["error"], "bad_request");
        }
        assert_eq!(broker.record_count("test-topic"), 0);
    }

    #[tokio::test]
    async fn test_send_before_connected_is_unavailable() {
        let broker = MemoryBroker::new();
        let router = producer_router(producer_service(&broker));

        let response = router
            .oneshot(post_send(r#"{"message":"hello"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json_body(response).await["code"], "SERVICE_UNAVAILABLE");
    }

    #[tokio::test]
    async fn test_send_publish_failure_is_server_error() {
        let broker = MemoryBroker::new();
        let router = producer_router(connected_producer(&broker).await);
        broker.fail_publishes(true);

        let response = router
            .oneshot(post_send(r#"{"message":"hello"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(response).await["error"], "internal_error");
    }

    #[tokio::test]
    async fn test_producer_health() {
        let broker = MemoryBroker::new();
        let router = producer_router(producer_service(&broker));

        let response = router.oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            json!({ "status": "healthy", "service": "producer" })
        );
    }

    #[tokio::test]
    async fn test_consumer_messages_and_health() {
        let buffer = Arc::new(MessageBuffer::new());
        let router = consumer_router(Arc::clone(&buffer));

        let response = router.clone().oneshot(get("/messages")).await.unwrap();
        assert_eq!(json_body(response).await, json!({ "messages": [] }));

        for m in ["a", "b", "c"] {
            buffer.append(m.to_string());
        }

        let response = router.clone().oneshot(get("/messages")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({ "messages": ["a", "b", "c"] }));

        let response = router.oneshot(get("/health")).await.unwrap();
        assert_eq!(
            json_body(response).await,
            json!({ "status": "healthy", "messagesReceived": 3 })
        );
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let router = consumer_router(Arc::new(MessageBuffer::new()));
        let response = router.oneshot(get("/nope")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["code"], "ROUTE_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_openapi_documents() {
        let broker = MemoryBroker::new();
        let response = producer_router(producer_service(&broker))
            .oneshot(get("/openapi.json"))
            .await
            .unwrap();
        let doc = json_body(response).await;
        assert!(doc["paths"]["/send"]["post"].is_object());

        let response = consumer_router(Arc::new(MessageBuffer::new()))
            .oneshot(get("/openapi.json"))
            .await
            .unwrap();
        let doc = json_body(response).await;
        assert!(doc["paths"]["/messages"]["get"].is_object());
    }
}
