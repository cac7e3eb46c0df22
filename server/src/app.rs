//! Core application

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;

use crate::api::ApiServer;
use crate::core::banner;
use crate::core::cli::{self, CliConfig, Commands};
use crate::core::config::{AppConfig, BrokerBackendType, ServiceRole};
use crate::core::constants::{APP_NAME_LOWER, ENV_LOG};
use crate::core::shutdown::ShutdownService;
use crate::data::broker::{self, BrokerBackend};
use crate::domain::{ConsumerService, ProducerService};
use crate::utils::retry::RetryError;

pub struct CoreApp {
    pub shutdown: ShutdownService,
    pub config: AppConfig,
    pub broker: Arc<dyn BrokerBackend>,
}

impl CoreApp {
    /// Run the application with CLI argument parsing
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();
        Self::init_logging();

        tracing::debug!("Application starting");

        let (cli_config, command) = cli::parse();
        tracing::trace!(command = ?command, "Parsed command");

        let app = Self::init(&cli_config, command)?;
        app.start(command).await
    }

    fn init(cli: &CliConfig, command: Commands) -> Result<Self> {
        let config = AppConfig::load(cli)?;
        let broker =
            broker::from_config(&config.broker).context("Failed to initialize broker backend")?;
        tracing::debug!(backend = broker.backend_name(), "Broker backend initialized");

        if config.broker.backend == BrokerBackendType::Memory && command != Commands::Standalone {
            tracing::warn!(
                "The memory broker lives inside this process; use `standalone` to run producer and consumer against it"
            );
        }

        Ok(Self {
            shutdown: ShutdownService::new(),
            config,
            broker,
        })
    }

    fn init_logging() {
        let default_filter = format!("info,{}=info", APP_NAME_LOWER);

        let filter = std::env::var(ENV_LOG)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or(default_filter);

        tracing_subscriber::fmt()
            .with_target(false)
            .with_thread_ids(false)
            .with_level(true)
            .with_ansi(true)
            .compact()
            .with_env_filter(filter)
            .init();
    }

    fn roles(command: Commands) -> Vec<ServiceRole> {
        match command {
            Commands::Producer => vec![ServiceRole::Producer],
            Commands::Consumer => vec![ServiceRole::Consumer],
            Commands::Standalone => vec![ServiceRole::Producer, ServiceRole::Consumer],
        }
    }

    /// Start listeners and startup tasks, then block until shutdown.
    ///
    /// Listeners come up immediately; broker startup runs alongside them.
    /// An exhausted retry budget shuts everything down and is returned as
    /// the error.
    async fn start(self, command: Commands) -> Result<()> {
        // Install signal handlers FIRST (before any blocking calls)
        self.shutdown.install_signal_handlers();

        let roles = Self::roles(command);
        banner::print_banner(&self.config, &roles);

        let mut servers = Vec::new();
        let mut startups = Vec::new();

        for role in roles {
            match role {
                ServiceRole::Producer => {
                    let producer = Arc::new(ProducerService::new(
                        Arc::clone(&self.broker),
                        self.config.broker.topic_spec(),
                        self.config.producer.options(),
                        self.config.retry.policy(),
                    ));
                    startups.push(self.spawn_producer_startup(Arc::clone(&producer)));
                    servers.push(ApiServer::producer(
                        &self.config.server,
                        producer,
                        self.shutdown.clone(),
                    ));
                }
                ServiceRole::Consumer => {
                    let consumer = Arc::new(ConsumerService::new(
                        Arc::clone(&self.broker),
                        self.config.broker.topic_spec(),
                        self.config.consumer.options(),
                        self.config.retry.policy(),
                    ));
                    servers.push(ApiServer::consumer(
                        &self.config.server,
                        consumer.buffer(),
                        self.shutdown.clone(),
                    ));
                    startups.push(self.spawn_consumer_startup(consumer));
                }
            }
        }

        let served = futures::future::try_join_all(servers.into_iter().map(ApiServer::start)).await;
        self.shutdown.trigger();

        let mut startup_error = None;
        for handle in startups {
            if !handle.is_finished() {
                handle.abort();
            }
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    startup_error.get_or_insert(e);
                }
                Err(e) if e.is_cancelled() => {}
                Err(e) => {
                    startup_error.get_or_insert(anyhow::Error::new(e).context("Startup task panicked"));
                }
            }
        }

        self.shutdown.shutdown().await;

        served?;
        match startup_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn spawn_producer_startup(&self, producer: Arc<ProducerService>) -> JoinHandle<Result<()>> {
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = producer.connect().await {
                let RetryError::Exhausted { attempts, source } = &e;
                tracing::error!(attempts, error = %source, "Producer startup failed");
                shutdown.trigger();
                return Err(anyhow::Error::new(e).context("Producer could not connect to the broker"));
            }
            Ok(())
        })
    }

    fn spawn_consumer_startup(&self, consumer: Arc<ConsumerService>) -> JoinHandle<Result<()>> {
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            match consumer.connect().await {
                Ok(subscription) => {
                    let handle = consumer.start(subscription, shutdown.subscribe());
                    shutdown.register(handle).await;
                    Ok(())
                }
                Err(e) => {
                    let RetryError::Exhausted { attempts, source } = &e;
                    tracing::error!(attempts, error = %source, "Consumer startup failed");
                    shutdown.trigger();
                    Err(anyhow::Error::new(e).context("Consumer could not connect to the broker"))
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::core::config::{RetryConfig, ServerConfig};
    use crate::data::broker::MemoryBroker;

    fn unreachable_broker_app(broker: &MemoryBroker) -> CoreApp {
        broker.fail_connections(u32::MAX);
        CoreApp {
            shutdown: ShutdownService::new(),
            config: AppConfig {
                server: ServerConfig {
                    host: "127.0.0.1".into(),
                    producer_port: 0,
                    consumer_port: 0,
                },
                retry: RetryConfig {
                    max_attempts: 2,
                    delay_ms: 1,
                },
                ..Default::default()
            },
            broker: Arc::new(broker.clone()),
        }
    }

    async fn start_with_timeout(app: CoreApp, command: Commands) -> Result<()> {
        tokio::time::timeout(Duration::from_secs(10), app.start(command))
            .await
            .expect("start did not return after startup failed")
    }

    #[test]
    fn test_roles_per_command() {
        assert_eq!(CoreApp::roles(Commands::Producer), vec![ServiceRole::Producer]);
        assert_eq!(CoreApp::roles(Commands::Consumer), vec![ServiceRole::Consumer]);
        assert_eq!(
            CoreApp::roles(Commands::Standalone),
            vec![ServiceRole::Producer, ServiceRole::Consumer]
        );
    }

    #[tokio::test]
    async fn test_standalone_exits_with_error_when_retries_exhausted() {
        let broker = MemoryBroker::new();
        let app = unreachable_broker_app(&broker);

        let err = start_with_timeout(app, Commands::Standalone).await.unwrap_err();
        // Whichever startup exhausts first stops the other
        let message = format!("{:#}", err);
        assert!(
            message.ends_with(
                "could not connect to the broker: gave up after 2 attempts: \
                 connection error: broker unavailable (simulated)"
            ),
            "unexpected error: {}",
            message
        );
        assert!(broker.connect_attempts() >= 2);
    }

    #[tokio::test]
    async fn test_consumer_exits_with_error_when_retries_exhausted() {
        let broker = MemoryBroker::new();
        let app = unreachable_broker_app(&broker);

        let err = start_with_timeout(app, Commands::Consumer).await.unwrap_err();
        assert_eq!(err.to_string(), "Consumer could not connect to the broker");
        assert_eq!(broker.connect_attempts(), 2);
    }
}
