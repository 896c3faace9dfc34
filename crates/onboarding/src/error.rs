use crate::config::ConfigError;
use crate::telemetry::TelemetryError;
use crate::workflows::residency::directory::DirectoryError;
use crate::workflows::residency::roles::RoleError;
use crate::workflows::residency::service::OnboardingError;
use std::fmt;

/// Failures that stop the process before or while it serves traffic.
#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Roles(RoleError),
    Directory(DirectoryError),
    Onboarding(OnboardingError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Roles(err) => write!(f, "role registry error: {}", err),
            AppError::Directory(err) => write!(f, "apartment directory error: {}", err),
            AppError::Onboarding(err) => write!(f, "onboarding workflow error: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Roles(err) => Some(err),
            AppError::Directory(err) => Some(err),
            AppError::Onboarding(err) => Some(err),
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<RoleError> for AppError {
    fn from(value: RoleError) -> Self {
        Self::Roles(value)
    }
}

impl From<DirectoryError> for AppError {
    fn from(value: DirectoryError) -> Self {
        Self::Directory(value)
    }
}

impl From<OnboardingError> for AppError {
    fn from(value: OnboardingError) -> Self {
        Self::Onboarding(value)
    }
}
