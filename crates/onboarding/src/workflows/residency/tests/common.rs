use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request};
use axum::response::Response;
use serde_json::Value;
use uuid::Uuid;

use crate::workflows::residency::credentials::{CredentialError, CredentialHasher, PasswordHash};
use crate::workflows::residency::directory::{ApartmentDirectory, BlockSet, DirectoryError};
use crate::workflows::residency::domain::{ApartmentId, RegistrationRequest, User, UserId, UserStatus};
use crate::workflows::residency::events::{DomainEvent, EventCodecError};
use crate::workflows::residency::outbox::{EventPublisher, OutboxEntry, OutboxStore, PublishError};
use crate::workflows::residency::repository::{RepositoryError, StatusChange, UserRepository};
use crate::workflows::residency::roles::RoleRegistry;
use crate::workflows::residency::service::ResidentOnboardingService;
use crate::workflows::residency::validation::RegistrationPolicy;

pub(super) type TestService = ResidentOnboardingService<MemoryStore, StaticDirectory, PlainHasher>;

pub(super) fn registration_request() -> RegistrationRequest {
    RegistrationRequest {
        first_name: "John".to_string(),
        last_name: "Doe".to_string(),
        email: "john.doe@example.com".to_string(),
        password: "password123".to_string(),
        apartment_id: ApartmentId(1),
        block_name: "Block A".to_string(),
        apartment_number: "101".to_string(),
    }
}

pub(super) fn second_registration() -> RegistrationRequest {
    RegistrationRequest {
        first_name: "Jane".to_string(),
        last_name: "Roe".to_string(),
        email: "jane.roe@example.com".to_string(),
        password: "s3cure-enough".to_string(),
        apartment_id: ApartmentId(1),
        block_name: "Block B".to_string(),
        apartment_number: "204".to_string(),
    }
}

pub(super) fn build_service() -> (TestService, Arc<MemoryStore>, Arc<StaticDirectory>) {
    let store = Arc::new(MemoryStore::default());
    let directory = Arc::new(StaticDirectory::standard());
    let service = service_with(store.clone(), directory.clone());
    (service, store, directory)
}

pub(super) fn service_with<D>(
    store: Arc<MemoryStore>,
    directory: Arc<D>,
) -> ResidentOnboardingService<MemoryStore, D, PlainHasher>
where
    D: ApartmentDirectory + 'static,
{
    ResidentOnboardingService::new(
        store,
        directory,
        Arc::new(PlainHasher),
        Arc::new(RoleRegistry::standard()),
        RegistrationPolicy::default(),
    )
}

pub(super) async fn registered_user(service: &TestService) -> User {
    service
        .register(registration_request())
        .await
        .expect("registration succeeds")
}

#[derive(Default)]
struct StoreState {
    users: HashMap<UserId, User>,
    registration_order: Vec<UserId>,
    outbox: Vec<OutboxEntry>,
    published: HashSet<Uuid>,
    dead_lettered: HashSet<Uuid>,
}

/// In-memory user store that keeps rows and outbox entries under one lock.
#[derive(Default, Clone)]
pub(super) struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    pub(super) fn user_count(&self) -> usize {
        self.state.lock().expect("store mutex poisoned").users.len()
    }

    pub(super) fn stored(&self, id: &UserId) -> Option<User> {
        self.state
            .lock()
            .expect("store mutex poisoned")
            .users
            .get(id)
            .cloned()
    }

    pub(super) fn outbox(&self) -> Vec<OutboxEntry> {
        self.state.lock().expect("store mutex poisoned").outbox.clone()
    }

    pub(super) fn events(&self) -> Vec<DomainEvent> {
        self.outbox().into_iter().map(|entry| entry.event).collect()
    }

    pub(super) fn unpublished_count(&self) -> usize {
        let state = self.state.lock().expect("store mutex poisoned");
        state
            .outbox
            .iter()
            .filter(|entry| {
                !state.published.contains(&entry.id) && !state.dead_lettered.contains(&entry.id)
            })
            .count()
    }

    pub(super) fn dead_letters(&self) -> Vec<OutboxEntry> {
        let state = self.state.lock().expect("store mutex poisoned");
        state
            .outbox
            .iter()
            .filter(|entry| state.dead_lettered.contains(&entry.id))
            .cloned()
            .collect()
    }
}

impl UserRepository for MemoryStore {
    fn email_exists(&self, email: &str) -> Result<bool, RepositoryError> {
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state
            .users
            .values()
            .any(|user| user.email.eq_ignore_ascii_case(email)))
    }

    fn insert(&self, user: User, outbox: OutboxEntry) -> Result<User, RepositoryError> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        if state
            .users
            .values()
            .any(|existing| existing.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(RepositoryError::Conflict);
        }
        state.users.insert(user.id, user.clone());
        state.registration_order.push(user.id);
        state.outbox.push(outbox);
        Ok(user)
    }

    fn update_status(
        &self,
        id: &UserId,
        change: &StatusChange,
        outbox: OutboxEntry,
    ) -> Result<User, RepositoryError> {
        let mut state = self.state.lock().expect("store mutex poisoned");
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
        let mut state = self.state.lock().expect("store mutex poisoned");
        let user = state.users.get_mut(id).ok_or(RepositoryError::NotFound)?;
        user.password = password;
        Ok(())
    }

    fn fetch(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.stored(id))
    }

    fn pending(&self, limit: usize) -> Result<Vec<User>, RepositoryError> {
        let state = self.state.lock().expect("store mutex poisoned");
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

impl OutboxStore for MemoryStore {
    fn unpublished(&self, limit: usize) -> Result<Vec<OutboxEntry>, RepositoryError> {
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state
            .outbox
            .iter()
            .filter(|entry| {
                !state.published.contains(&entry.id) && !state.dead_lettered.contains(&entry.id)
            })
            .take(limit)
            .cloned()
            .collect())
    }

    fn mark_published(&self, id: Uuid) -> Result<(), RepositoryError> {
        self.state
            .lock()
            .expect("store mutex poisoned")
            .published
            .insert(id);
        Ok(())
    }

    fn record_failure(&self, id: Uuid, error: &str) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().expect("store mutex poisoned");
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
        self.record_failure(id, error)?;
        self.state
            .lock()
            .expect("store mutex poisoned")
            .dead_lettered
            .insert(id);
        Ok(())
    }
}

/// Directory answering from a fixed table.
pub(super) struct StaticDirectory {
    apartments: BTreeMap<ApartmentId, BlockSet>,
    calls: AtomicUsize,
}

impl StaticDirectory {
    pub(super) fn standard() -> Self {
        let mut apartments = BTreeMap::new();
        apartments.insert(
            ApartmentId(1),
            ["Block A", "Block B"].into_iter().map(String::from).collect(),
        );
        apartments.insert(
            ApartmentId(2),
            ["North Tower"].into_iter().map(String::from).collect(),
        );
        Self {
            apartments,
            calls: AtomicUsize::new(0),
        }
    }

    pub(super) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ApartmentDirectory for StaticDirectory {
    async fn lookup(&self, apartment_id: ApartmentId) -> Result<BlockSet, DirectoryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.apartments
            .get(&apartment_id)
            .cloned()
            .ok_or(DirectoryError::NotFound(apartment_id))
    }
}

/// Directory that always fails with the configured error.
pub(super) struct FailingDirectory(pub(super) DirectoryError);

#[async_trait]
impl ApartmentDirectory for FailingDirectory {
    async fn lookup(&self, _apartment_id: ApartmentId) -> Result<BlockSet, DirectoryError> {
        Err(self.0.clone())
    }
}

/// Reversible stand-in for bcrypt so tests stay fast.
pub(super) struct PlainHasher;

impl CredentialHasher for PlainHasher {
    fn hash(&self, plaintext: &str) -> Result<PasswordHash, CredentialError> {
        Ok(PasswordHash::new(format!("plain:{plaintext}")))
    }

    fn verify(&self, plaintext: &str, hash: &PasswordHash) -> Result<bool, CredentialError> {
        Ok(hash.as_str() == format!("plain:{plaintext}"))
    }
}

/// Bus double that records acknowledged events and can refuse chosen keys.
#[derive(Default)]
pub(super) struct RecordingPublisher {
    published: Mutex<Vec<(String, String, DomainEvent)>>,
    failing_keys: Mutex<HashSet<String>>,
    garbled_topics: Mutex<HashSet<String>>,
}

impl RecordingPublisher {
    pub(super) fn published(&self) -> Vec<(String, String, DomainEvent)> {
        self.published.lock().expect("publisher mutex poisoned").clone()
    }

    pub(super) fn fail_key(&self, key: &str) {
        self.failing_keys
            .lock()
            .expect("publisher mutex poisoned")
            .insert(key.to_string());
    }

    /// Events on `topic` fail to encode from now on.
    pub(super) fn garble_topic(&self, topic: &str) {
        self.garbled_topics
            .lock()
            .expect("publisher mutex poisoned")
            .insert(topic.to_string());
    }

    pub(super) fn recover(&self) {
        self.failing_keys
            .lock()
            .expect("publisher mutex poisoned")
            .clear();
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        event: &DomainEvent,
    ) -> Result<(), PublishError> {
        if self
            .failing_keys
            .lock()
            .expect("publisher mutex poisoned")
            .contains(key)
        {
            return Err(PublishError::Transport("broker unreachable".to_string()));
        }
        if self
            .garbled_topics
            .lock()
            .expect("publisher mutex poisoned")
            .contains(topic)
        {
            return Err(EventCodecError::UnknownTopic(topic.to_string()).into());
        }
        self.published
            .lock()
            .expect("publisher mutex poisoned")
            .push((topic.to_string(), key.to_string(), event.clone()));
        Ok(())
    }
}

pub(super) fn json_request(method: Method, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(body).expect("serialize body")))
        .expect("request builds")
}

pub(super) fn empty_request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("request builds")
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
