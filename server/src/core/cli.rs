use clap::{Parser, Subcommand};

use std::path::PathBuf;

use super::config::BrokerBackendType;
use super::constants::{
    ENV_ACKS, ENV_BROKER_BACKEND, ENV_BROKERS, ENV_CONFIG, ENV_CONSUMER_PORT, ENV_FROM_BEGINNING,
    ENV_GROUP_ID, ENV_HOST, ENV_PRODUCER_PORT, ENV_RETRY_DELAY_MS, ENV_RETRY_MAX_ATTEMPTS,
    ENV_TOPIC,
};
use crate::data::broker::Acks;

#[derive(Parser)]
#[command(name = "courier")]
#[command(version, about = "HTTP producer and consumer services for a Kafka topic", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Server host address
    #[arg(long, short = 'H', global = true, env = ENV_HOST)]
    pub host: Option<String>,

    /// Producer API port
    #[arg(long, global = true, env = ENV_PRODUCER_PORT)]
    pub producer_port: Option<u16>,

    /// Consumer API port
    #[arg(long, global = true, env = ENV_CONSUMER_PORT)]
    pub consumer_port: Option<u16>,

    /// Path to config file
    #[arg(long, short = 'c', global = true, env = ENV_CONFIG)]
    pub config: Option<PathBuf>,

    /// Broker backend (kafka or memory)
    #[arg(long, global = true, env = ENV_BROKER_BACKEND, value_parser = parse_broker_backend)]
    pub broker_backend: Option<BrokerBackendType>,

    /// Comma-separated bootstrap servers
    #[arg(long, short = 'b', global = true, env = ENV_BROKERS)]
    pub brokers: Option<String>,

    /// Topic to publish to and consume from
    #[arg(long, short = 't', global = true, env = ENV_TOPIC)]
    pub topic: Option<String>,

    /// Consumer group id
    #[arg(long, global = true, env = ENV_GROUP_ID)]
    pub group_id: Option<String>,

    /// Start from the earliest offset when the group has no committed offset
    #[arg(long, global = true, env = ENV_FROM_BEGINNING)]
    pub from_beginning: Option<bool>,

    /// Producer acknowledgment level (all, leader or none)
    #[arg(long, global = true, env = ENV_ACKS, value_parser = parse_acks)]
    pub acks: Option<Acks>,

    /// Connect attempts before startup fails
    #[arg(long, global = true, env = ENV_RETRY_MAX_ATTEMPTS)]
    pub retry_max_attempts: Option<u32>,

    /// Delay between connect attempts in milliseconds
    #[arg(long, global = true, env = ENV_RETRY_DELAY_MS)]
    pub retry_delay_ms: Option<u64>,
}

/// Parse broker backend from CLI/env string
fn parse_broker_backend(s: &str) -> Result<BrokerBackendType, String> {
    match s.to_lowercase().as_str() {
        "kafka" => Ok(BrokerBackendType::Kafka),
        "memory" => Ok(BrokerBackendType::Memory),
        _ => Err(format!(
            "Invalid broker backend '{}'. Valid options: kafka, memory",
            s
        )),
    }
}

/// Parse producer acks from CLI/env string
fn parse_acks(s: &str) -> Result<Acks, String> {
    match s.to_lowercase().as_str() {
        "all" | "-1" => Ok(Acks::All),
        "leader" | "1" => Ok(Acks::Leader),
        "none" | "0" => Ok(Acks::None),
        _ => Err(format!(
            "Invalid acks '{}'. Valid options: all, leader, none",
            s
        )),
    }
}

#[derive(Subcommand, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Run the producer service (POST /send)
    Producer,
    /// Run the consumer service (GET /messages)
    Consumer,
    /// Run both services in one process, sharing one broker backend
    Standalone,
}

/// Configuration derived from CLI arguments
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub host: Option<String>,
    pub producer_port: Option<u16>,
    pub consumer_port: Option<u16>,
    pub config: Option<PathBuf>,
    pub broker_backend: Option<BrokerBackendType>,
    pub brokers: Option<String>,
    pub topic: Option<String>,
    pub group_id: Option<String>,
    pub from_beginning: Option<bool>,
    pub acks: Option<Acks>,
    pub retry_max_attempts: Option<u32>,
    pub retry_delay_ms: Option<u64>,
}

impl From<Cli> for CliConfig {
    fn from(cli: Cli) -> Self {
        Self {
            host: cli.host,
            producer_port: cli.producer_port,
            consumer_port: cli.consumer_port,
            config: cli.config,
            broker_backend: cli.broker_backend,
            brokers: cli.brokers,
            topic: cli.topic,
            group_id: cli.group_id,
            from_beginning: cli.from_beginning,
            acks: cli.acks,
            retry_max_attempts: cli.retry_max_attempts,
            retry_delay_ms: cli.retry_delay_ms,
        }
    }
}

/// Parse CLI arguments and return config with command
pub fn parse() -> (CliConfig, Commands) {
    let cli = Cli::parse();
    let command = cli.command;
    (cli.into(), command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_subcommand_and_flags() {
        let cli = Cli::try_parse_from([
            "courier",
            "consumer",
            "--brokers",
            "localhost:9092",
            "--group-id",
            "g1",
            "--retry-max-attempts",
            "3",
        ])
        .unwrap();
        assert_eq!(cli.command, Commands::Consumer);

        let config = CliConfig::from(cli);
        assert_eq!(config.brokers.as_deref(), Some("localhost:9092"));
        assert_eq!(config.group_id.as_deref(), Some("g1"));
        assert_eq!(config.retry_max_attempts, Some(3));
    }

    #[test]
    fn test_parse_broker_backend() {
        assert_eq!(parse_broker_backend("Memory"), Ok(BrokerBackendType::Memory));
        assert_eq!(parse_broker_backend("kafka"), Ok(BrokerBackendType::Kafka));
        assert!(parse_broker_backend("redis").is_err());
    }

    #[test]
    fn test_parse_acks() {
        assert_eq!(parse_acks("all"), Ok(Acks::All));
        assert_eq!(parse_acks("1"), Ok(Acks::Leader));
        assert_eq!(parse_acks("none"), Ok(Acks::None));
        assert!(parse_acks("some").is_err());
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["courier"]).is_err());
    }
}
