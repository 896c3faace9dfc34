//! Resident onboarding for apartment communities: registration against the
//! apartment directory, administrator approval, and the event pipeline that
//! notifies everyone involved.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
