//! In-memory broker backend
//!
//! Single-process stand-in for Kafka:
//! - One append-only log per topic (a single partition, offsets start at 0)
//! - Committed offsets per (group, topic), updated on delivery when
//!   auto-commit is enabled
//! - Subscribers are woken through a per-topic `Notify`
//!
//! ## Limitations
//!
//! Nothing is shared across processes and nothing survives a restart. Use
//! `courier standalone` to run both services against one instance.
//!
//! The backend can simulate an unavailable broker (`fail_connections`,
//! `fail_admin_requests`, `fail_publishes`), which drives the retry paths
//! without a real cluster.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use async_stream::stream;
use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::Notify;

use super::backend::{
    AdminSession, BrokerBackend, ConsumerOptions, Delivery, DeliveryReceipt, MessageProducer,
    ProducerOptions, Subscription, TopicSpec,
};
use super::error::BrokerError;

/// Partition used for every memory topic
const PARTITION: i32 = 0;

struct TopicLog {
    spec: TopicSpec,
    /// `None` is a record without a value (tombstone)
    records: Vec<Option<Vec<u8>>>,
}

/// Shared state for memory backend
#[derive(Default)]
struct SharedState {
    topics: RwLock<HashMap<String, TopicLog>>,
    /// Next offset to deliver, by (group, topic)
    committed: RwLock<HashMap<(String, String), usize>>,
    notifiers: RwLock<HashMap<String, Arc<Notify>>>,
    /// Remaining connect operations that fail
    failing_connections: AtomicU32,
    failing_admin_requests: AtomicBool,
    failing_publishes: AtomicBool,
    open_admin_sessions: AtomicUsize,
    connect_attempts: AtomicU32,
}

impl SharedState {
    fn notifier(&self, topic: &str) -> Arc<Notify> {
        {
            let notifiers = self.notifiers.read();
            if let Some(n) = notifiers.get(topic) {
                return Arc::clone(n);
            }
        }
        let mut notifiers = self.notifiers.write();
        Arc::clone(
            notifiers
                .entry(topic.to_string())
                .or_insert_with(|| Arc::new(Notify::new())),
        )
    }

    /// Consume one simulated outage slot, if any are left
    fn check_connection(&self) -> Result<(), BrokerError> {
        self.connect_attempts.fetch_add(1, Ordering::SeqCst);
        let outage = self
            .failing_connections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match outage {
            Ok(_) => Err(BrokerError::Connection(
                "broker unavailable (simulated)".into(),
            )),
            Err(_) => Ok(()),
        }
    }

    fn append(
        &self,
        topic: &str,
        payload: Option<Vec<u8>>,
    ) -> Result<DeliveryReceipt, BrokerError> {
        if self.failing_publishes.load(Ordering::SeqCst) {
            return Err(BrokerError::Publish("broker rejected record (simulated)".into()));
        }
        let offset = {
            let mut topics = self.topics.write();
            let log = topics
                .get_mut(topic)
                .ok_or_else(|| BrokerError::UnknownTopic(topic.to_string()))?;
            log.records.push(payload);
            log.records.len() - 1
        };
        self.notifier(topic).notify_waiters();
        Ok(DeliveryReceipt {
            partition: PARTITION,
            offset: offset as i64,
        })
    }

    fn read_from(&self, topic: &str, start: usize) -> Vec<(usize, Option<Vec<u8>>)> {
        let topics = self.topics.read();
        topics
            .get(topic)
            .map(|log| {
                log.records
                    .iter()
                    .enumerate()
                    .skip(start)
                    .map(|(offset, payload)| (offset, payload.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// In-memory broker backend
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<SharedState>,
}

impl MemoryBroker {
    /// Create an empty broker
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` connect operations (admin, producer, subscribe) fail
    pub fn fail_connections(&self, count: u32) {
        self.state.failing_connections.store(count, Ordering::SeqCst);
    }

    /// Make list/create topic requests fail while set
    pub fn fail_admin_requests(&self, failing: bool) {
        self.state
            .failing_admin_requests
            .store(failing, Ordering::SeqCst);
    }

    /// Make publishes fail while set
    pub fn fail_publishes(&self, failing: bool) {
        self.state.failing_publishes.store(failing, Ordering::SeqCst);
    }

    /// Number of admin sessions currently held
    pub fn open_admin_sessions(&self) -> usize {
        self.state.open_admin_sessions.load(Ordering::SeqCst)
    }

    /// Number of connect operations attempted so far, failed ones included
    pub fn connect_attempts(&self) -> u32 {
        self.state.connect_attempts.load(Ordering::SeqCst)
    }

    /// Definition of a topic, if it exists
    pub fn topic_spec(&self, name: &str) -> Option<TopicSpec> {
        self.state.topics.read().get(name).map(|log| log.spec.clone())
    }

    /// Append a record that has no value, as a compacting producer would
    pub fn append_tombstone(&self, topic: &str) -> Result<DeliveryReceipt, BrokerError> {
        self.state.append(topic, None)
    }

    /// Number of records in a topic
    pub fn record_count(&self, name: &str) -> usize {
        self.state
            .topics
            .read()
            .get(name)
            .map(|log| log.records.len())
            .unwrap_or(0)
    }
}

struct MemoryAdminSession {
    state: Arc<SharedState>,
}

impl MemoryAdminSession {
    fn check_request(&self) -> Result<(), BrokerError> {
        if self.state.failing_admin_requests.load(Ordering::SeqCst) {
            return Err(BrokerError::Admin("admin request failed (simulated)".into()));
        }
        Ok(())
    }
}

impl Drop for MemoryAdminSession {
    fn drop(&mut self) {
        self.state.open_admin_sessions.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl AdminSession for MemoryAdminSession {
    async fn list_topics(&self) -> Result<Vec<String>, BrokerError> {
        self.check_request()?;
        Ok(self.state.topics.read().keys().cloned().collect())
    }

    async fn create_topic(&self, spec: &TopicSpec) -> Result<(), BrokerError> {
        self.check_request()?;
        if spec.partitions < 1 || spec.replication_factor < 1 {
            return Err(BrokerError::Admin(format!(
                "invalid topic definition for '{}': partitions={}, replication_factor={}",
                spec.name, spec.partitions, spec.replication_factor
            )));
        }
        let mut topics = self.state.topics.write();
        if topics.contains_key(&spec.name) {
            return Err(BrokerError::TopicAlreadyExists(spec.name.clone()));
        }
        topics.insert(
            spec.name.clone(),
            TopicLog {
                spec: spec.clone(),
                records: Vec::new(),
            },
        );
        Ok(())
    }
}

struct MemoryProducer {
    state: Arc<SharedState>,
}

#[async_trait]
impl MessageProducer for MemoryProducer {
    async fn send(&self, topic: &str, payload: &[u8]) -> Result<DeliveryReceipt, BrokerError> {
        self.state.append(topic, Some(payload.to_vec()))
    }
}

#[async_trait]
impl BrokerBackend for MemoryBroker {
    async fn admin(&self) -> Result<Box<dyn AdminSession>, BrokerError> {
        self.state.check_connection()?;
        self.state.open_admin_sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryAdminSession {
            state: Arc::clone(&self.state),
        }))
    }

    async fn connect_producer(
        &self,
        options: &ProducerOptions,
    ) -> Result<Arc<dyn MessageProducer>, BrokerError> {
        self.state.check_connection()?;
        tracing::debug!(client_id = %options.client_id, "Memory producer connected");
        Ok(Arc::new(MemoryProducer {
            state: Arc::clone(&self.state),
        }))
    }

    async fn subscribe(
        &self,
        topic: &str,
        options: &ConsumerOptions,
    ) -> Result<Subscription, BrokerError> {
        self.state.check_connection()?;

        let end = {
            let topics = self.state.topics.read();
            topics
                .get(topic)
                .map(|log| log.records.len())
                .ok_or_else(|| BrokerError::UnknownTopic(topic.to_string()))?
        };

        let key = (options.group_id.clone(), topic.to_string());
        let start = match self.state.committed.read().get(&key) {
            Some(&offset) => offset,
            None if options.from_beginning => 0,
            None => end,
        };

        tracing::debug!(
            topic,
            group_id = %options.group_id,
            start_offset = start,
            "Memory consumer subscribed"
        );

        let state = Arc::clone(&self.state);
        let notify = self.state.notifier(topic);
        let auto_commit = options.auto_commit;
        let topic = topic.to_string();

        let receiver = stream! {
            let mut next = start;
            loop {
                // Register for wakeup before reading so a concurrent append is not missed
                let notified = notify.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                let batch = state.read_from(&topic, next);
                if batch.is_empty() {
                    notified.await;
                    continue;
                }

                for (offset, payload) in batch {
                    next = offset + 1;
                    if auto_commit {
                        state.committed.write().insert(key.clone(), next);
                    }
                    yield Ok(Delivery {
                        topic: topic.clone(),
                        partition: PARTITION,
                        offset: offset as i64,
                        payload,
                    });
                }
            }
        };

        Ok(Subscription {
            receiver: Box::pin(receiver),
        })
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
