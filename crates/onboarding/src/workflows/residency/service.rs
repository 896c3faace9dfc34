use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Notify;
use tracing::{info, warn};

use super::credentials::{CredentialError, CredentialHasher, PasswordHash};
use super::directory::{ApartmentDirectory, DirectoryError};
use super::domain::{
    ApartmentId, PasswordChangeRequest, RegistrationRequest, StatusUpdateRequest, User, UserId,
    UserStatus,
};
use super::events::{RegistrationEvent, StatusChangedEvent};
use super::outbox::OutboxEntry;
use super::repository::{RepositoryError, StatusChange, UserRepository};
use super::roles::{RoleError, RoleRegistry};
use super::transition::{self, TransitionError};
use super::validation::{RegistrationPolicy, ValidationError};

/// Compare-and-set rounds a status decision gets before giving up.
pub const TRANSITION_ATTEMPTS: u32 = 3;

/// Service composing the apartment directory, credential hasher, role
/// registry, and user store into the registration and approval workflow.
pub struct ResidentOnboardingService<R, D, H> {
    repository: Arc<R>,
    directory: Arc<D>,
    hasher: Arc<H>,
    roles: Arc<RoleRegistry>,
    policy: RegistrationPolicy,
    outbox_signal: Option<Arc<Notify>>,
}

impl<R, D, H> ResidentOnboardingService<R, D, H>
where
    R: UserRepository + 'static,
    D: ApartmentDirectory + 'static,
    H: CredentialHasher + 'static,
{
    pub fn new(
        repository: Arc<R>,
        directory: Arc<D>,
        hasher: Arc<H>,
        roles: Arc<RoleRegistry>,
        policy: RegistrationPolicy,
    ) -> Self {
        Self {
            repository,
            directory,
            hasher,
            roles,
            policy,
            outbox_signal: None,
        }
    }

    /// Wakes the outbox relay after every committed change instead of waiting
    /// for its next poll.
    pub fn with_outbox_signal(mut self, signal: Arc<Notify>) -> Self {
        self.outbox_signal = Some(signal);
        self
    }

    /// Register a resident against an apartment block.
    ///
    /// The user is stored as `PENDING_APPROVAL` with the pending role, and the
    /// registration event is committed to the outbox in the same write.
    pub async fn register(&self, mut request: RegistrationRequest) -> Result<User, OnboardingError> {
        request.email = request.email.trim().to_string();
        self.policy.validate(&request)?;
        let email = request.email.clone();

        if self.repository.email_exists(&email)? {
            return Err(OnboardingError::DuplicateEmail { email });
        }

        let blocks = self
            .directory
            .lookup(request.apartment_id)
            .await
            .map_err(|err| match err {
                DirectoryError::NotFound(apartment_id) => {
                    OnboardingError::ApartmentNotFound { apartment_id }
                }
                other => {
                    warn!(
                        apartment_id = %request.apartment_id,
                        error = %other,
                        "apartment lookup failed"
                    );
                    OnboardingError::UpstreamUnavailable(other)
                }
            })?;

        if !blocks.contains(&request.block_name) {
            return Err(OnboardingError::BlockNotFound {
                apartment_id: request.apartment_id,
                block_name: request.block_name,
            });
        }

        let password = self.hash_password(request.password).await?;
        let role = self.roles.pending()?;

        let user = User {
            id: UserId::generate(),
            first_name: request.first_name.trim().to_string(),
            last_name: request.last_name.trim().to_string(),
            email,
            password,
            apartment_id: request.apartment_id,
            block_name: request.block_name,
            apartment_number: request.apartment_number.trim().to_string(),
            status: UserStatus::PendingApproval,
            role,
            created_at: Utc::now(),
        };
        let entry = OutboxEntry::new(RegistrationEvent::from_user(&user));

        let stored = self
            .repository
            .insert(user, entry)
            .map_err(|err| match err {
                RepositoryError::Conflict => OnboardingError::DuplicateEmail {
                    email: request.email,
                },
                other => other.into(),
            })?;
        self.notify_relay();

        info!(
            user_id = %stored.id,
            apartment_id = %stored.apartment_id,
            block_name = %stored.block_name,
            "registration recorded; awaiting approval"
        );
        Ok(stored)
    }

    /// Apply an administrative status decision.
    ///
    /// A role name is only honoured when approving; rejecting or returning a
    /// user to review keeps the current role. The decision is committed with a
    /// compare-and-set against the state it was checked on. When another
    /// writer got there first the decision is re-evaluated against the fresh
    /// row, up to [`TRANSITION_ATTEMPTS`] times.
    pub fn transition(
        &self,
        user_id: &UserId,
        request: StatusUpdateRequest,
    ) -> Result<User, OnboardingError> {
        for attempt in 1..=TRANSITION_ATTEMPTS {
            let current = self.fetch(user_id)?;
            let change = self.decide(&current, &request)?;
            let entry = OutboxEntry::new(StatusChangedEvent::from_transition(
                &User {
                    status: change.to_status,
                    role: change.to_role.clone(),
                    ..current
                },
                change.from_status,
                change.from_role.name(),
            ));

            match self.repository.update_status(user_id, &change, entry) {
                Ok(stored) => {
                    self.notify_relay();
                    info!(
                        user_id = %stored.id,
                        from = %change.from_status,
                        to = %stored.status,
                        role = %stored.role,
                        "registration status changed"
                    );
                    return Ok(stored);
                }
                Err(RepositoryError::Conflict) => {
                    warn!(user_id = %user_id, attempt, "user changed concurrently; re-evaluating");
                }
                Err(RepositoryError::NotFound) => {
                    return Err(OnboardingError::UserNotFound { user_id: *user_id })
                }
                Err(other) => return Err(other.into()),
            }
        }

        Err(OnboardingError::ConcurrentUpdate { user_id: *user_id })
    }

    fn decide(
        &self,
        current: &User,
        request: &StatusUpdateRequest,
    ) -> Result<StatusChange, OnboardingError> {
        transition::check(current.status, request.status)?;

        let mut to_role = current.role.clone();
        if request.status == UserStatus::Approved {
            if let Some(name) = request.requested_role() {
                to_role = self
                    .roles
                    .resolve(name)
                    .ok_or_else(|| OnboardingError::RoleNotFound {
                        role: name.to_string(),
                    })?;
            }
        }

        Ok(StatusChange {
            from_status: current.status,
            from_role: current.role.clone(),
            to_status: request.status,
            to_role,
        })
    }

    pub fn get(&self, user_id: &UserId) -> Result<User, OnboardingError> {
        self.fetch(user_id)
    }

    /// Registrations awaiting a decision, oldest first.
    pub fn pending(&self, limit: usize) -> Result<Vec<User>, OnboardingError> {
        Ok(self.repository.pending(limit)?)
    }

    /// Replace a user's password after verifying the current one. Emits no
    /// event.
    pub async fn change_password(
        &self,
        user_id: &UserId,
        request: PasswordChangeRequest,
    ) -> Result<(), OnboardingError> {
        self.policy.validate_password(&request.new_password)?;
        let user = self.fetch(user_id)?;

        let hasher = Arc::clone(&self.hasher);
        let current = user.password.clone();
        let old_password = request.old_password;
        let matches = tokio::task::spawn_blocking(move || hasher.verify(&old_password, &current))
            .await
            .map_err(|err| CredentialError::Hash(err.to_string()))??;
        if !matches {
            return Err(OnboardingError::CredentialMismatch);
        }

        let password = self.hash_password(request.new_password).await?;
        self.repository
            .update_password(user_id, password)
            .map_err(|err| match err {
                RepositoryError::NotFound => OnboardingError::UserNotFound { user_id: *user_id },
                other => other.into(),
            })?;

        info!(user_id = %user_id, "password changed");
        Ok(())
    }

    fn fetch(&self, user_id: &UserId) -> Result<User, OnboardingError> {
        self.repository
            .fetch(user_id)?
            .ok_or(OnboardingError::UserNotFound { user_id: *user_id })
    }

    // bcrypt is deliberately slow; keep it off the async workers.
    async fn hash_password(&self, plaintext: String) -> Result<PasswordHash, CredentialError> {
        let hasher = Arc::clone(&self.hasher);
        tokio::task::spawn_blocking(move || hasher.hash(&plaintext))
            .await
            .map_err(|err| CredentialError::Hash(err.to_string()))?
    }

    fn notify_relay(&self) {
        if let Some(signal) = &self.outbox_signal {
            signal.notify_one();
        }
    }
}

/// Error raised by the onboarding service.
#[derive(Debug, thiserror::Error)]
pub enum OnboardingError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("email {email} is already registered")]
    DuplicateEmail { email: String },
    #[error("apartment {apartment_id} not found")]
    ApartmentNotFound { apartment_id: ApartmentId },
    #[error("block '{block_name}' not found in apartment {apartment_id}")]
    BlockNotFound {
        apartment_id: ApartmentId,
        block_name: String,
    },
    #[error("user {user_id} not found")]
    UserNotFound { user_id: UserId },
    #[error("role '{role}' not found")]
    RoleNotFound { role: String },
    #[error("user {user_id} kept changing while the decision was applied; retry")]
    ConcurrentUpdate { user_id: UserId },
    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),
    #[error("apartment lookup failed: {0}")]
    UpstreamUnavailable(#[source] DirectoryError),
    #[error(transparent)]
    RoleNotConfigured(#[from] RoleError),
    #[error("current password does not match")]
    CredentialMismatch,
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
