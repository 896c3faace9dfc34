use super::credentials::PasswordHash;
use super::domain::{User, UserId, UserStatus};
use super::outbox::OutboxEntry;
use super::roles::Role;

/// Status decision guarded by the state it was computed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub from_status: UserStatus,
    pub from_role: Role,
    pub to_status: UserStatus,
    pub to_role: Role,
}

impl StatusChange {
    /// True when the stored row still carries the state this change was
    /// decided against.
    pub fn applies_to(&self, user: &User) -> bool {
        user.status == self.from_status && user.role == self.from_role
    }
}

/// Storage abstraction for users.
///
/// `insert` and `update_status` persist the user row and its outbox entry in
/// one atomic write: either both are visible afterwards or neither is. Email
/// uniqueness is enforced here, case-insensitively, so concurrent
/// registrations racing past the service pre-check still conflict.
///
/// `update_status` is a compare-and-set: it writes only status and role, and
/// returns [`RepositoryError::Conflict`] when the stored row no longer matches
/// [`StatusChange::applies_to`].
pub trait UserRepository: Send + Sync {
    fn email_exists(&self, email: &str) -> Result<bool, RepositoryError>;
    fn insert(&self, user: User, outbox: OutboxEntry) -> Result<User, RepositoryError>;
    fn update_status(
        &self,
        id: &UserId,
        change: &StatusChange,
        outbox: OutboxEntry,
    ) -> Result<User, RepositoryError>;
    fn update_password(&self, id: &UserId, password: PasswordHash) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &UserId) -> Result<Option<User>, RepositoryError>;
    /// Users still awaiting a decision, oldest registration first.
    fn pending(&self, limit: usize) -> Result<Vec<User>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
