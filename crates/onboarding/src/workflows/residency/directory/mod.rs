//! Apartment directory client.
//!
//! The apartment directory is owned by a separate service. Registration only
//! needs one question answered: which block names does an apartment have?

mod http;
mod resilience;

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;

use super::domain::ApartmentId;

pub use http::HttpApartmentDirectory;
pub use resilience::{CircuitBreaker, CircuitState, ResilientDirectory, RetryPolicy};

/// Block names registered for one apartment.
pub type BlockSet = BTreeSet<String>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectoryError {
    #[error("apartment {0} not found")]
    NotFound(ApartmentId),
    #[error("apartment directory unavailable: {0}")]
    Unavailable(String),
    #[error("apartment directory did not answer within {0:?}")]
    Timeout(Duration),
    #[error("apartment directory rejected the lookup with status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("apartment directory returned an unreadable response: {0}")]
    InvalidResponse(String),
    #[error("apartment directory circuit open; retry in {retry_after:?}")]
    CircuitOpen { retry_after: Duration },
    #[error("invalid apartment directory url: {0}")]
    InvalidUrl(String),
}

impl DirectoryError {
    /// Failures worth another attempt after a backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, DirectoryError::Unavailable(_) | DirectoryError::Timeout(_))
    }
}

/// Lookup contract consumed by the registration orchestrator.
#[async_trait]
pub trait ApartmentDirectory: Send + Sync {
    async fn lookup(&self, apartment_id: ApartmentId) -> Result<BlockSet, DirectoryError>;
}
