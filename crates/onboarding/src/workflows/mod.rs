pub mod notifications;
pub mod residency;
