use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use crate::workflows::notifications::DEFAULT_APARTMENT_CONTACT;

const DEFAULT_DIRECTORY_URL: &str = "http://localhost:8081";
const DEFAULT_ROLES: &str = "pending,resident,admin";

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub directory: DirectoryConfig,
    pub registration: RegistrationConfig,
    pub roles: RolesConfig,
    pub notifications: NotificationConfig,
    pub outbox: OutboxConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                ansi: environment == AppEnvironment::Development,
            },
            directory: DirectoryConfig::from_env(environment)?,
            registration: RegistrationConfig {
                min_password_length: parse_var("PASSWORD_MIN_LENGTH", 8)?,
                bcrypt_cost: parse_var("BCRYPT_COST", bcrypt::DEFAULT_COST)?,
            },
            roles: RolesConfig {
                names: split_list(
                    &env::var("APP_ROLES").unwrap_or_else(|_| DEFAULT_ROLES.to_string()),
                ),
            },
            notifications: NotificationConfig {
                apartment_contact: env::var("NOTIFY_APARTMENT_CONTACT")
                    .unwrap_or_else(|_| DEFAULT_APARTMENT_CONTACT.to_string()),
            },
            outbox: OutboxConfig {
                poll_interval: parse_positive_millis("OUTBOX_POLL_MS", 500)?,
                batch_size: parse_var("OUTBOX_BATCH_SIZE", 100)?,
            },
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls. Colour output is only enabled for local
/// development; deployed environments ship plain lines to the log collector.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub ansi: bool,
}

/// Location of the apartment directory plus the resilience dials wrapped
/// around every lookup.
#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    pub base_url: String,
    pub request_timeout: Duration,
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub reset_timeout: Duration,
}

impl DirectoryConfig {
    fn from_env(environment: AppEnvironment) -> Result<Self, ConfigError> {
        let base_url = match env::var("APARTMENT_SERVICE_URL") {
            Ok(url) => url,
            Err(_) if environment == AppEnvironment::Production => {
                return Err(ConfigError::MissingVar("APARTMENT_SERVICE_URL"))
            }
            Err(_) => DEFAULT_DIRECTORY_URL.to_string(),
        };
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::InvalidUrl { value: base_url });
        }

        Ok(Self {
            base_url,
            request_timeout: parse_positive_millis("DIRECTORY_TIMEOUT_MS", 2_000)?,
            max_attempts: parse_var::<u32>("DIRECTORY_MAX_ATTEMPTS", 3)?.max(1),
            initial_backoff: Duration::from_millis(parse_var("DIRECTORY_BACKOFF_MS", 100)?),
            max_backoff: Duration::from_millis(parse_var("DIRECTORY_MAX_BACKOFF_MS", 1_000)?),
            failure_threshold: parse_var::<u32>("DIRECTORY_BREAKER_THRESHOLD", 5)?.max(1),
            success_threshold: 1,
            reset_timeout: Duration::from_secs(parse_var("DIRECTORY_BREAKER_RESET_SECS", 30)?),
        })
    }
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_DIRECTORY_URL.to_string(),
            request_timeout: Duration::from_secs(2),
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(1),
            failure_threshold: 5,
            success_threshold: 1,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

/// Registration input policy and credential hashing cost.
#[derive(Debug, Clone)]
pub struct RegistrationConfig {
    pub min_password_length: usize,
    pub bcrypt_cost: u32,
}

/// Role names known to this deployment.
#[derive(Debug, Clone)]
pub struct RolesConfig {
    pub names: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct NotificationConfig {
    pub apartment_contact: String,
}

/// Outbox relay cadence.
#[derive(Debug, Clone)]
pub struct OutboxConfig {
    pub poll_interval: Duration,
    pub batch_size: usize,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            batch_size: 100,
        }
    }
}

fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { var: name, value: raw }),
        Err(_) => Ok(default),
    }
}

fn parse_positive_millis(name: &'static str, default: u64) -> Result<Duration, ConfigError> {
    match parse_var::<u64>(name, default)? {
        0 => Err(ConfigError::ZeroDuration(name)),
        millis => Ok(Duration::from_millis(millis)),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { var: &'static str, value: String },
    InvalidUrl { value: String },
    MissingVar(&'static str),
    ZeroDuration(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { var, value } => {
                write!(f, "{var} must be a non-negative integer (found '{value}')")
            }
            ConfigError::InvalidUrl { value } => {
                write!(f, "APARTMENT_SERVICE_URL must start with http:// or https:// (found '{value}')")
            }
            ConfigError::MissingVar(var) => write!(f, "{var} must be set in production"),
            ConfigError::ZeroDuration(var) => write!(f, "{var} must be greater than zero"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidNumber { .. }
            | ConfigError::InvalidUrl { .. }
            | ConfigError::MissingVar(_)
            | ConfigError::ZeroDuration(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for var in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "APARTMENT_SERVICE_URL",
            "DIRECTORY_TIMEOUT_MS",
            "DIRECTORY_MAX_ATTEMPTS",
            "PASSWORD_MIN_LENGTH",
            "APP_ROLES",
            "NOTIFY_APARTMENT_CONTACT",
            "OUTBOX_POLL_MS",
            "OUTBOX_BATCH_SIZE",
        ] {
            env::remove_var(var);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert!(config.telemetry.ansi);
        assert_eq!(config.directory.base_url, "http://localhost:8081");
        assert_eq!(config.directory.max_attempts, 3);
        assert_eq!(config.registration.min_password_length, 8);
        assert_eq!(config.roles.names, vec!["pending", "resident", "admin"]);
        assert_eq!(
            config.notifications.apartment_contact,
            "apartment.contact@example.com"
        );
        assert_eq!(config.outbox.batch_size, 100);
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
    }

    #[test]
    fn production_requires_directory_url() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_ENV", "production");
        match AppConfig::load() {
            Err(ConfigError::MissingVar("APARTMENT_SERVICE_URL")) => {}
            other => panic!("expected missing directory url, got {other:?}"),
        }

        env::set_var("APARTMENT_SERVICE_URL", "https://apartments.internal/");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.directory.base_url, "https://apartments.internal");
    }

    #[test]
    fn rejects_malformed_numbers_and_urls() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("DIRECTORY_TIMEOUT_MS", "soon");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::InvalidNumber {
                var: "DIRECTORY_TIMEOUT_MS",
                ..
            })
        ));

        reset_env();
        env::set_var("APARTMENT_SERVICE_URL", "apartments:8081");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn zero_intervals_are_rejected() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("OUTBOX_POLL_MS", "0");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::ZeroDuration("OUTBOX_POLL_MS"))
        ));

        reset_env();
        env::set_var("DIRECTORY_TIMEOUT_MS", "0");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::ZeroDuration("DIRECTORY_TIMEOUT_MS"))
        ));

        reset_env();
        env::set_var("OUTBOX_POLL_MS", "25");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.outbox.poll_interval, Duration::from_millis(25));
    }

    #[test]
    fn role_list_ignores_blank_entries() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_ROLES", " pending , resident,, board ");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.roles.names, vec!["pending", "resident", "board"]);
    }
}
