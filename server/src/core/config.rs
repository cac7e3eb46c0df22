use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::data::broker::{Acks, ConsumerOptions, ProducerOptions, TopicSpec};
use crate::utils::file::expand_path;
use crate::utils::retry::RetryPolicy;

use super::cli::CliConfig;
use super::constants::{
    APP_DOT_FOLDER, CONFIG_FILE_NAME, DEFAULT_BROKERS, DEFAULT_CONSUMER_CLIENT_ID,
    DEFAULT_CONSUMER_GROUP_ID, DEFAULT_CONSUMER_PORT, DEFAULT_HOST, DEFAULT_MESSAGE_TIMEOUT_MS,
    DEFAULT_PRODUCER_CLIENT_ID, DEFAULT_PRODUCER_PORT, DEFAULT_REQUEST_TIMEOUT_MS,
    DEFAULT_RETRY_DELAY_MS, DEFAULT_RETRY_MAX_ATTEMPTS, DEFAULT_SESSION_TIMEOUT_MS,
    DEFAULT_TOPIC, DEFAULT_TOPIC_PARTITIONS, DEFAULT_TOPIC_REPLICATION_FACTOR,
};

// =============================================================================
// Broker Backend Enum
// =============================================================================

/// Broker backend type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerBackendType {
    #[default]
    Kafka,
    Memory,
}

impl fmt::Display for BrokerBackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrokerBackendType::Kafka => write!(f, "kafka"),
            BrokerBackendType::Memory => write!(f, "memory"),
        }
    }
}

// =============================================================================
// Service Role Enum
// =============================================================================

/// Which HTTP service a listener serves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceRole {
    Producer,
    Consumer,
}

impl fmt::Display for ServiceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceRole::Producer => write!(f, "producer"),
            ServiceRole::Consumer => write!(f, "consumer"),
        }
    }
}

// =============================================================================
// File Config Structs (JSON deserialization)
// =============================================================================

/// Server configuration section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ServerFileConfig {
    pub host: Option<String>,
    pub producer_port: Option<u16>,
    pub consumer_port: Option<u16>,
}

/// Broker configuration section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct BrokerFileConfig {
    pub backend: Option<BrokerBackendType>,
    /// Comma-separated bootstrap servers
    pub brokers: Option<String>,
    pub topic: Option<String>,
    pub partitions: Option<i32>,
    pub replication_factor: Option<i32>,
    pub request_timeout_ms: Option<u64>,
}

/// Producer client configuration section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ProducerFileConfig {
    pub client_id: Option<String>,
    pub acks: Option<Acks>,
    pub message_timeout_ms: Option<u64>,
}

/// Consumer client configuration section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ConsumerFileConfig {
    pub client_id: Option<String>,
    pub group_id: Option<String>,
    pub from_beginning: Option<bool>,
    pub auto_commit: Option<bool>,
    pub session_timeout_ms: Option<u64>,
}

/// Startup retry configuration section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct RetryFileConfig {
    pub max_attempts: Option<u32>,
    pub delay_ms: Option<u64>,
}

/// File-based configuration (JSON)
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub server: Option<ServerFileConfig>,
    pub broker: Option<BrokerFileConfig>,
    pub producer: Option<ProducerFileConfig>,
    pub consumer: Option<ConsumerFileConfig>,
    pub retry: Option<RetryFileConfig>,
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

fn merge_field<T: fmt::Debug>(current: &mut Option<T>, other: Option<T>, name: &str) {
    if other.is_some() {
        tracing::trace!(value = ?other, "Merging {}", name);
        *current = other;
    }
}

impl FileConfig {
    /// Load configuration from a JSON file
    fn load_from_file(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading config file");
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        tracing::trace!(config = ?config, "Parsed config file");
        Ok(config)
    }

    /// Warn about unknown fields in the config
    fn warn_unknown_fields(&self) {
        if let serde_json::Value::Object(map) = &self.extra
            && !map.is_empty()
        {
            let keys_str: String = map
                .keys()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            tracing::warn!(
                fields = %keys_str,
                "Unknown fields in config file (possible typos)"
            );
        }
    }

    /// Merge another FileConfig into this one (other takes precedence)
    fn merge(&mut self, other: FileConfig) {
        if let Some(server) = other.server {
            let current = self.server.get_or_insert_with(ServerFileConfig::default);
            merge_field(&mut current.host, server.host, "server.host");
            merge_field(
                &mut current.producer_port,
                server.producer_port,
                "server.producer_port",
            );
            merge_field(
                &mut current.consumer_port,
                server.consumer_port,
                "server.consumer_port",
            );
        }

        if let Some(broker) = other.broker {
            let current = self.broker.get_or_insert_with(BrokerFileConfig::default);
            merge_field(&mut current.backend, broker.backend, "broker.backend");
            merge_field(&mut current.brokers, broker.brokers, "broker.brokers");
            merge_field(&mut current.topic, broker.topic, "broker.topic");
            merge_field(&mut current.partitions, broker.partitions, "broker.partitions");
            merge_field(
                &mut current.replication_factor,
                broker.replication_factor,
                "broker.replication_factor",
            );
            merge_field(
                &mut current.request_timeout_ms,
                broker.request_timeout_ms,
                "broker.request_timeout_ms",
            );
        }

        if let Some(producer) = other.producer {
            let current = self.producer.get_or_insert_with(ProducerFileConfig::default);
            merge_field(&mut current.client_id, producer.client_id, "producer.client_id");
            merge_field(&mut current.acks, producer.acks, "producer.acks");
            merge_field(
                &mut current.message_timeout_ms,
                producer.message_timeout_ms,
                "producer.message_timeout_ms",
            );
        }

        if let Some(consumer) = other.consumer {
            let current = self.consumer.get_or_insert_with(ConsumerFileConfig::default);
            merge_field(&mut current.client_id, consumer.client_id, "consumer.client_id");
            merge_field(&mut current.group_id, consumer.group_id, "consumer.group_id");
            merge_field(
                &mut current.from_beginning,
                consumer.from_beginning,
                "consumer.from_beginning",
            );
            merge_field(
                &mut current.auto_commit,
                consumer.auto_commit,
                "consumer.auto_commit",
            );
            merge_field(
                &mut current.session_timeout_ms,
                consumer.session_timeout_ms,
                "consumer.session_timeout_ms",
            );
        }

        if let Some(retry) = other.retry {
            let current = self.retry.get_or_insert_with(RetryFileConfig::default);
            merge_field(&mut current.max_attempts, retry.max_attempts, "retry.max_attempts");
            merge_field(&mut current.delay_ms, retry.delay_ms, "retry.delay_ms");
        }
    }
}

// =============================================================================
// Resolved Config Structs
// =============================================================================

/// HTTP listener configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub producer_port: u16,
    pub consumer_port: u16,
}

impl ServerConfig {
    pub fn port(&self, role: ServiceRole) -> u16 {
        match role {
            ServiceRole::Producer => self.producer_port,
            ServiceRole::Consumer => self.consumer_port,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            producer_port: DEFAULT_PRODUCER_PORT,
            consumer_port: DEFAULT_CONSUMER_PORT,
        }
    }
}

/// Broker connection and topic configuration
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub backend: BrokerBackendType,
    pub brokers: String,
    pub topic: String,
    pub partitions: i32,
    pub replication_factor: i32,
    pub request_timeout_ms: u64,
}

impl BrokerConfig {
    pub fn topic_spec(&self) -> TopicSpec {
        TopicSpec {
            name: self.topic.clone(),
            partitions: self.partitions,
            replication_factor: self.replication_factor,
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            backend: BrokerBackendType::default(),
            brokers: DEFAULT_BROKERS.to_string(),
            topic: DEFAULT_TOPIC.to_string(),
            partitions: DEFAULT_TOPIC_PARTITIONS,
            replication_factor: DEFAULT_TOPIC_REPLICATION_FACTOR,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

/// Producer client configuration
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    pub client_id: String,
    pub acks: Acks,
    pub message_timeout_ms: u64,
}

impl ProducerConfig {
    pub fn options(&self) -> ProducerOptions {
        ProducerOptions {
            client_id: self.client_id.clone(),
            acks: self.acks,
            message_timeout_ms: self.message_timeout_ms,
        }
    }
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            client_id: DEFAULT_PRODUCER_CLIENT_ID.to_string(),
            acks: Acks::default(),
            message_timeout_ms: DEFAULT_MESSAGE_TIMEOUT_MS,
        }
    }
}

/// Consumer client configuration
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub client_id: String,
    pub group_id: String,
    pub from_beginning: bool,
    pub auto_commit: bool,
    pub session_timeout_ms: u64,
}

impl ConsumerConfig {
    pub fn options(&self) -> ConsumerOptions {
        ConsumerOptions {
            client_id: self.client_id.clone(),
            group_id: self.group_id.clone(),
            from_beginning: self.from_beginning,
            auto_commit: self.auto_commit,
            session_timeout_ms: self.session_timeout_ms,
        }
    }
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            client_id: DEFAULT_CONSUMER_CLIENT_ID.to_string(),
            group_id: DEFAULT_CONSUMER_GROUP_ID.to_string(),
            from_beginning: true,
            auto_commit: true,
            session_timeout_ms: DEFAULT_SESSION_TIMEOUT_MS,
        }
    }
}

/// Startup retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub delay_ms: u64,
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            delay: Duration::from_millis(self.delay_ms),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
            delay_ms: DEFAULT_RETRY_DELAY_MS,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub broker: BrokerConfig,
    pub producer: ProducerConfig,
    pub consumer: ConsumerConfig,
    pub retry: RetryConfig,
}

impl AppConfig {
    /// Load configuration from all sources
    ///
    /// Priority (lowest to highest):
    /// 1. Defaults
    /// 2. Profile directory config (~/.courier/courier.json)
    /// 3. Local directory config OR CLI-specified config path
    /// 4. CLI arguments (which include env var fallbacks via clap)
    pub fn load(cli: &CliConfig) -> Result<Self> {
        tracing::debug!("Loading application configuration");
        tracing::trace!(cli = ?cli, "CLI config");

        let mut file_config = FileConfig::default();
        let mut found_configs: Vec<String> = Vec::new();

        if let Some(profile_path) = get_profile_config_path()
            && profile_path.exists()
        {
            let profile_config = FileConfig::load_from_file(&profile_path)?;
            profile_config.warn_unknown_fields();
            file_config.merge(profile_config);
            found_configs.push(profile_path.display().to_string());
        }

        let overlay_path = if let Some(ref path) = cli.config {
            let expanded = expand_path(&path.to_string_lossy());
            if !expanded.exists() {
                anyhow::bail!("Config file not found: {}", expanded.display());
            }
            Some(expanded)
        } else {
            let local = PathBuf::from(CONFIG_FILE_NAME);
            if local.exists() { Some(local) } else { None }
        };

        if let Some(path) = overlay_path {
            let overlay_config = FileConfig::load_from_file(&path)?;
            overlay_config.warn_unknown_fields();
            file_config.merge(overlay_config);
            found_configs.push(path.display().to_string());
        }

        tracing::debug!(configs = ?found_configs, "Config files loaded");

        Self::resolve(file_config, cli)
    }

    /// Layer defaults, file config and CLI/env overrides
    pub fn resolve(file_config: FileConfig, cli: &CliConfig) -> Result<Self> {
        let file_server = file_config.server.unwrap_or_default();
        let file_broker = file_config.broker.unwrap_or_default();
        let file_producer = file_config.producer.unwrap_or_default();
        let file_consumer = file_config.consumer.unwrap_or_default();
        let file_retry = file_config.retry.unwrap_or_default();

        let server = ServerConfig {
            host: cli
                .host
                .clone()
                .or(file_server.host)
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            producer_port: cli
                .producer_port
                .or(file_server.producer_port)
                .unwrap_or(DEFAULT_PRODUCER_PORT),
            consumer_port: cli
                .consumer_port
                .or(file_server.consumer_port)
                .unwrap_or(DEFAULT_CONSUMER_PORT),
        };

        let broker = BrokerConfig {
            backend: cli
                .broker_backend
                .or(file_broker.backend)
                .unwrap_or_default(),
            brokers: cli
                .brokers
                .clone()
                .or(file_broker.brokers)
                .unwrap_or_else(|| DEFAULT_BROKERS.to_string()),
            topic: cli
                .topic
                .clone()
                .or(file_broker.topic)
                .unwrap_or_else(|| DEFAULT_TOPIC.to_string()),
            partitions: file_broker.partitions.unwrap_or(DEFAULT_TOPIC_PARTITIONS),
            replication_factor: file_broker
                .replication_factor
                .unwrap_or(DEFAULT_TOPIC_REPLICATION_FACTOR),
            request_timeout_ms: file_broker
                .request_timeout_ms
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS),
        };

        if broker.topic.trim().is_empty() {
            anyhow::bail!("broker.topic must not be empty");
        }
        if broker.partitions < 1 || broker.replication_factor < 1 {
            anyhow::bail!(
                "broker.partitions and broker.replication_factor must be at least 1 (got {} and {})",
                broker.partitions,
                broker.replication_factor
            );
        }

        let producer = ProducerConfig {
            client_id: file_producer
                .client_id
                .unwrap_or_else(|| DEFAULT_PRODUCER_CLIENT_ID.to_string()),
            acks: cli.acks.or(file_producer.acks).unwrap_or_default(),
            message_timeout_ms: file_producer
                .message_timeout_ms
                .unwrap_or(DEFAULT_MESSAGE_TIMEOUT_MS),
        };

        let consumer = ConsumerConfig {
            client_id: file_consumer
                .client_id
                .unwrap_or_else(|| DEFAULT_CONSUMER_CLIENT_ID.to_string()),
            group_id: cli
                .group_id
                .clone()
                .or(file_consumer.group_id)
                .unwrap_or_else(|| DEFAULT_CONSUMER_GROUP_ID.to_string()),
            from_beginning: cli
                .from_beginning
                .or(file_consumer.from_beginning)
                .unwrap_or(true),
            auto_commit: file_consumer.auto_commit.unwrap_or(true),
            session_timeout_ms: file_consumer
                .session_timeout_ms
                .unwrap_or(DEFAULT_SESSION_TIMEOUT_MS),
        };

        let max_attempts = cli
            .retry_max_attempts
            .or(file_retry.max_attempts)
            .unwrap_or(DEFAULT_RETRY_MAX_ATTEMPTS);
        if max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be at least 1");
        }
        let retry = RetryConfig {
            max_attempts,
            delay_ms: cli
                .retry_delay_ms
                .or(file_retry.delay_ms)
                .unwrap_or(DEFAULT_RETRY_DELAY_MS),
        };

        let config = Self {
            server,
            broker,
            producer,
            consumer,
            retry,
        };
        tracing::debug!(config = ?config, "Configuration resolved");
        Ok(config)
    }
}

/// Get the profile config path (~/.courier/courier.json)
fn get_profile_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(APP_DOT_FOLDER).join(CONFIG_FILE_NAME))
}

/// Check if host binds to all network interfaces
pub fn is_all_interfaces(host: &str) -> bool {
    matches!(host, "0.0.0.0" | "::" | "[::]")
}
