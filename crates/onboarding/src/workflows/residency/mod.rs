//! Resident registration and approval.
//!
//! A registration is verified against the apartment directory, stored in the
//! `PENDING_APPROVAL` state with the `pending` role, and later moved through the
//! approval state machine by an administrator. Every committed change is
//! written together with an outbox entry; [`OutboxRelay`] publishes those
//! entries to the event bus so downstream consumers see each change at least
//! once, in per-user order.

pub mod credentials;
pub mod directory;
pub mod domain;
pub mod events;
pub mod outbox;
pub mod repository;
pub mod roles;
pub mod router;
pub mod service;
pub(crate) mod transition;
pub mod validation;

#[cfg(test)]
mod tests;

pub use credentials::{BcryptHasher, CredentialError, CredentialHasher, PasswordHash};
pub use directory::{
    ApartmentDirectory, BlockSet, CircuitBreaker, CircuitState, DirectoryError,
    HttpApartmentDirectory, ResilientDirectory, RetryPolicy,
};
pub use domain::{
    ApartmentId, PasswordChangeRequest, RegistrationRequest, StatusUpdateRequest, User, UserId,
    UserStatus, UserView,
};
pub use events::{
    DomainEvent, EventCodecError, EventMessage, RegistrationEvent, StatusChangedEvent,
    REGISTRATION_TOPIC, STATUS_CHANGED_TOPIC,
};
pub use outbox::{
    EventPublisher, OutboxEntry, OutboxRelay, OutboxStore, PublishError, RelayReport,
};
pub use repository::{RepositoryError, StatusChange, UserRepository};
pub use roles::{Role, RoleError, RoleRegistry, WellKnownRole};
pub use router::onboarding_router;
pub use service::{OnboardingError, ResidentOnboardingService};
pub use transition::TransitionError;
pub use validation::{RegistrationPolicy, ValidationError};
