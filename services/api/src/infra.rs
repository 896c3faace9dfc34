use async_trait::async_trait;
use metrics_exporter_prometheus::PrometheusHandle;
use onboarding::workflows::notifications::{EmailMessage, MailError, MailSender};
use onboarding::workflows::residency::{
    DomainEvent, EventMessage, EventPublisher, OutboxEntry, OutboxStore, PasswordHash,
    PublishError, RepositoryError, StatusChange, User, UserId, UserRepository, UserStatus,
};
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default)]
struct StoreState {
    users: HashMap<UserId, User>,
    registration_order: Vec<UserId>,
    outbox: Vec<OutboxEntry>,
    dead_letters: Vec<OutboxEntry>,
}

/// Process-local user store. Rows and outbox entries share one lock, which
/// is what makes each write atomic.
#[derive(Default, Clone)]
pub(crate) struct InMemoryUserStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryUserStore {
    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("user store lock poisoned".to_string()))
    }

    fn email_taken(state: &StoreState, email: &str) -> bool {
        state
            .users
            .values()
            .any(|user| user.email.eq_ignore_ascii_case(email))
    }
}

impl UserRepository for InMemoryUserStore {
    fn email_exists(&self, email: &str) -> Result<bool, RepositoryError> {
        let state = self.lock()?;
        Ok(Self::email_taken(&state, email))
    }

    fn insert(&self, user: User, outbox: OutboxEntry) -> Result<User, RepositoryError> {
        let mut state = self.lock()?;
        if Self::email_taken(&state, &user.email) {
            return Err(RepositoryError::Conflict);
        }
        state.registration_order.push(user.id);
        state.users.insert(user.id, user.clone());
        state.outbox.push(outbox);
        Ok(user)
    }

    fn update_status(
        &self,
        id: &UserId,
        change: &StatusChange,
        outbox: OutboxEntry,
    ) -> Result<User, RepositoryError> {
        let mut state = self.lock()?;
        let user = state.users.get_mut(id).ok_or(RepositoryError::NotFound)?;
        if !change.applies_to(user) {
            return Err(RepositoryError::Conflict);
        }
        user.status = change.to_status;
        user.role = change.to_role.clone();
        let updated = user.clone();
        state.outbox.push(outbox);
        Ok(updated)
    }

    fn update_password(&self, id: &UserId, password: PasswordHash) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        let user = state.users.get_mut(id).ok_or(RepositoryError::NotFound)?;
        user.password = password;
        Ok(())
    }

    fn fetch(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let state = self.lock()?;
        Ok(state.users.get(id).cloned())
    }

    fn pending(&self, limit: usize) -> Result<Vec<User>, RepositoryError> {
        let state = self.lock()?;
        Ok(state
            .registration_order
            .iter()
            .filter_map(|id| state.users.get(id))
            .filter(|user| user.status == UserStatus::PendingApproval)
            .take(limit)
            .cloned()
            .collect())
    }
}

impl OutboxStore for InMemoryUserStore {
    fn unpublished(&self, limit: usize) -> Result<Vec<OutboxEntry>, RepositoryError> {
        let state = self.lock()?;
        Ok(state
            .outbox
            .iter()
            .take(limit)
            .cloned()
            .collect())
    }

    fn mark_published(&self, id: Uuid) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        state.outbox.retain(|entry| entry.id != id);
        Ok(())
    }

    fn record_failure(&self, id: Uuid, error: &str) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        let entry = state
            .outbox
            .iter_mut()
            .find(|entry| entry.id == id)
            .ok_or(RepositoryError::NotFound)?;
        entry.attempts += 1;
        entry.last_error = Some(error.to_string());
        Ok(())
    }

    fn dead_letter(&self, id: Uuid, error: &str) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        let position = state
            .outbox
            .iter()
            .position(|entry| entry.id == id)
            .ok_or(RepositoryError::NotFound)?;
        let mut entry = state.outbox.remove(position);
        entry.attempts += 1;
        entry.last_error = Some(error.to_string());
        state.dead_letters.push(entry);
        warn!(
            entry_id = %id,
            dead_letters = state.dead_letters.len(),
            "outbox entry dead-lettered"
        );
        Ok(())
    }
}

/// Single FIFO channel standing in for the message broker.
#[derive(Clone)]
pub(crate) struct InProcessEventBus {
    sender: mpsc::Sender<EventMessage>,
}

impl InProcessEventBus {
    pub(crate) fn channel(capacity: usize) -> (Self, mpsc::Receiver<EventMessage>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl EventPublisher for InProcessEventBus {
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        event: &DomainEvent,
    ) -> Result<(), PublishError> {
        let message = EventMessage {
            topic: topic.to_string(),
            key: key.to_string(),
            payload: EventMessage::encode(event)?.payload,
        };
        self.sender
            .send(message)
            .await
            .map_err(|_| PublishError::Closed)
    }
}

/// Mail transport that writes each message to the log.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct LogMailer;

#[async_trait]
impl MailSender for LogMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        info!(
            to = %message.to,
            subject = %message.subject,
            body = %message.body,
            "email dispatched"
        );
        Ok(())
    }
}
