//! Transactional outbox and the relay that drains it onto the event bus.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::events::{DomainEvent, EventCodecError};
use super::repository::RepositoryError;
use crate::config::OutboxConfig;

/// Event waiting to be published, committed alongside the change it describes.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxEntry {
    pub id: Uuid,
    pub event: DomainEvent,
    pub created_at: DateTime<Utc>,
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl OutboxEntry {
    pub fn new(event: impl Into<DomainEvent>) -> Self {
        Self {
            id: Uuid::new_v4(),
            event: event.into(),
            created_at: Utc::now(),
            attempts: 0,
            last_error: None,
        }
    }
}

/// Read side of the outbox used by the relay.
pub trait OutboxStore: Send + Sync {
    /// Unpublished entries in commit order.
    fn unpublished(&self, limit: usize) -> Result<Vec<OutboxEntry>, RepositoryError>;
    fn mark_published(&self, id: Uuid) -> Result<(), RepositoryError>;
    fn record_failure(&self, id: Uuid, error: &str) -> Result<(), RepositoryError>;
    /// Takes an entry that can never be published out of the pending set,
    /// keeping it with its error for inspection.
    fn dead_letter(&self, id: Uuid, error: &str) -> Result<(), RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("event bus unavailable: {0}")]
    Transport(String),
    #[error("event bus closed")]
    Closed,
    #[error(transparent)]
    Codec(#[from] EventCodecError),
}

impl PublishError {
    /// Failures that no later attempt can fix.
    pub fn is_permanent(&self) -> bool {
        matches!(self, PublishError::Codec(_))
    }
}

/// Event bus producer. Returns once the bus has acknowledged the event.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, key: &str, event: &DomainEvent)
        -> Result<(), PublishError>;
}

/// Outcome of one relay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayReport {
    pub published: usize,
    pub failed: usize,
    /// Entries held back because an earlier entry for the same key failed.
    pub deferred: usize,
    pub dead_lettered: usize,
}

impl RelayReport {
    pub fn is_idle(&self) -> bool {
        self.published == 0 && self.failed == 0 && self.deferred == 0 && self.dead_lettered == 0
    }
}

pub struct OutboxRelay<S, P> {
    store: Arc<S>,
    publisher: Arc<P>,
    batch_size: usize,
    poll_interval: Duration,
    signal: Arc<Notify>,
}

impl<S, P> OutboxRelay<S, P>
where
    S: OutboxStore + 'static,
    P: EventPublisher + 'static,
{
    pub fn new(store: Arc<S>, publisher: Arc<P>, config: &OutboxConfig) -> Self {
        Self {
            store,
            publisher,
            batch_size: config.batch_size.max(1),
            poll_interval: config.poll_interval.max(Duration::from_millis(1)),
            signal: Arc::new(Notify::new()),
        }
    }

    /// Handle the service uses to wake the relay right after a commit.
    pub fn signal(&self) -> Arc<Notify> {
        self.signal.clone()
    }

    /// Publishes every pending entry once, in commit order.
    ///
    /// A failed entry stays pending with its attempt count bumped, and all
    /// later entries sharing its key are skipped until the next pass so a
    /// consumer never sees a user's events out of order. An entry that cannot
    /// be encoded is dead-lettered instead and does not hold its key back.
    pub async fn relay_pending(&self) -> Result<RelayReport, RepositoryError> {
        let entries = self.store.unpublished(self.batch_size)?;
        let mut report = RelayReport::default();
        let mut blocked: HashSet<String> = HashSet::new();

        for entry in entries {
            let key = entry.event.key();
            if blocked.contains(&key) {
                report.deferred += 1;
                continue;
            }

            let topic = entry.event.topic();
            match self.publisher.publish(topic, &key, &entry.event).await {
                Ok(()) => {
                    self.store.mark_published(entry.id)?;
                    debug!(topic, key = %key, entry_id = %entry.id, "event published");
                    report.published += 1;
                }
                Err(err) if err.is_permanent() => {
                    error!(
                        topic,
                        key = %key,
                        entry_id = %entry.id,
                        error = %err,
                        "event can never be published; dead-lettered"
                    );
                    self.store.dead_letter(entry.id, &err.to_string())?;
                    report.dead_lettered += 1;
                }
                Err(err) => {
                    warn!(
                        topic,
                        key = %key,
                        entry_id = %entry.id,
                        attempts = entry.attempts + 1,
                        error = %err,
                        "event publish failed; will retry"
                    );
                    self.store.record_failure(entry.id, &err.to_string())?;
                    blocked.insert(key);
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Drains the outbox on every poll tick or commit signal. Never returns;
    /// callers abort the task on shutdown.
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.signal.notified() => {}
            }

            match self.relay_pending().await {
                Ok(report) if report.is_idle() => {}
                Ok(report) => info!(
                    published = report.published,
                    failed = report.failed,
                    deferred = report.deferred,
                    dead_lettered = report.dead_lettered,
                    "outbox relay pass complete"
                ),
                Err(err) => error!(error = %err, "outbox relay could not read the store"),
            }
        }
    }
}
