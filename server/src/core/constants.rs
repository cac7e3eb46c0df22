// =============================================================================
// Application Identity
// =============================================================================

/// Application name in title case (for display)
pub const APP_NAME: &str = "Courier";

/// Application name in lowercase (for paths and identifiers)
pub const APP_NAME_LOWER: &str = "courier";

/// Unix-style dotfile folder name
pub const APP_DOT_FOLDER: &str = ".courier";

// =============================================================================
// Configuration Files
// =============================================================================

/// Config file name
pub const CONFIG_FILE_NAME: &str = "courier.json";

/// Environment variable for config file path
pub const ENV_CONFIG: &str = "COURIER_CONFIG";

/// Environment variable for log level/filter
pub const ENV_LOG: &str = "COURIER_LOG";

// =============================================================================
// Environment Variables - Server
// =============================================================================

pub const ENV_HOST: &str = "COURIER_HOST";
pub const ENV_PRODUCER_PORT: &str = "COURIER_PRODUCER_PORT";
pub const ENV_CONSUMER_PORT: &str = "COURIER_CONSUMER_PORT";

// =============================================================================
// Environment Variables - Broker
// =============================================================================

pub const ENV_BROKER_BACKEND: &str = "COURIER_BROKER_BACKEND";
pub const ENV_BROKERS: &str = "COURIER_BROKERS";
pub const ENV_TOPIC: &str = "COURIER_TOPIC";
pub const ENV_GROUP_ID: &str = "COURIER_GROUP_ID";
pub const ENV_FROM_BEGINNING: &str = "COURIER_FROM_BEGINNING";
pub const ENV_ACKS: &str = "COURIER_ACKS";
pub const ENV_RETRY_MAX_ATTEMPTS: &str = "COURIER_RETRY_MAX_ATTEMPTS";
pub const ENV_RETRY_DELAY_MS: &str = "COURIER_RETRY_DELAY_MS";

// =============================================================================
// Server Defaults
// =============================================================================

/// Default bind address for both services
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default producer API port
pub const DEFAULT_PRODUCER_PORT: u16 = 3001;

/// Default consumer API port
pub const DEFAULT_CONSUMER_PORT: u16 = 3002;

/// Maximum request body size (64KB)
pub const DEFAULT_BODY_LIMIT: usize = 64 * 1024;

// =============================================================================
// Broker Defaults
// =============================================================================

/// Default bootstrap server list
pub const DEFAULT_BROKERS: &str = "kafka:9092";

/// Default topic name
pub const DEFAULT_TOPIC: &str = "test-topic";

/// Partition count used when creating the topic
pub const DEFAULT_TOPIC_PARTITIONS: i32 = 1;

/// Replication factor used when creating the topic
pub const DEFAULT_TOPIC_REPLICATION_FACTOR: i32 = 1;

/// Timeout for metadata and admin requests
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5_000;

pub const DEFAULT_PRODUCER_CLIENT_ID: &str = "producer-service";
pub const DEFAULT_CONSUMER_CLIENT_ID: &str = "consumer-service";
pub const DEFAULT_CONSUMER_GROUP_ID: &str = "test-group";

/// Delivery timeout for a single publish
pub const DEFAULT_MESSAGE_TIMEOUT_MS: u64 = 30_000;

pub const DEFAULT_SESSION_TIMEOUT_MS: u64 = 30_000;

/// Capacity of the channel between the broker adapter and the delivery handler
pub const DELIVERY_CHANNEL_CAPACITY: usize = 1_024;

// =============================================================================
// Startup Retry
// =============================================================================

/// Connect attempts before startup fails
pub const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 10;

/// Fixed delay between connect attempts
pub const DEFAULT_RETRY_DELAY_MS: u64 = 5_000;

// =============================================================================
// Shutdown
// =============================================================================

/// Maximum time to wait for background tasks on shutdown
pub const SHUTDOWN_TIMEOUT_SECS: u64 = 10;
