//! Policy snapshot definitions.
//!
//! This module defines the complete resolved policy for the application.
//! Every type is plain data: built once by the loader, shared read-only.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::config::loader::ConfigError;

/// Fixed application time zone.
pub const TIME_ZONE: &str = "UTC";

/// The single origin allowed outside development.
pub const PRODUCTION_ORIGIN: &str = "https://ruby-app.buildwithsushant.com";

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "_ruby_gitops_session";

/// Identifier of the external asynchronous job runner.
pub const JOB_QUEUE_BACKEND: &str = "sidekiq";

/// Identifier of the external image variant processor.
pub const VARIANT_PROCESSOR: &str = "mini_magick";

/// Path prefix exempt from the forced-SSL redirect.
pub const HEALTH_PATH_PREFIX: &str = "/health";

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Test,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Test => "test",
            Environment::Production => "production",
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    pub fn is_development(&self) -> bool {
        matches!(self, Environment::Development)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "test" => Ok(Environment::Test),
            "production" | "prod" => Ok(Environment::Production),
            _ => Err(ConfigError::UnknownEnvironment(s.to_string())),
        }
    }
}

/// Resolved application policy. Immutable after [`load`](crate::config::load).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicySnapshot {
    pub environment: Environment,
    pub time_zone: &'static str,
    /// Serves browser sessions in addition to API clients.
    pub api_only: bool,
    pub cors: CorsRule,
    pub session: SessionConfig,
    pub job_queue_backend: &'static str,
    pub variant_processor: &'static str,
    pub cache: CacheConfig,
    pub logging: LogPolicy,
    pub ssl: SslPolicy,
    pub health_check: HealthCheckConfig,
    pub errors: ErrorHandlingConfig,
    pub listener: ListenerConfig,
}

impl PolicySnapshot {
    /// The CORS origin as it appears in configuration: `*` or the single origin.
    pub fn cors_origin_display(&self) -> String {
        match &self.cors.origins {
            AllowedOrigins::Any => "*".to_string(),
            AllowedOrigins::List(origins) => origins.join(","),
        }
    }
}

/// Origins a browser may call from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AllowedOrigins {
    Any,
    List(Vec<String>),
}

/// A single CORS allow rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorsRule {
    pub origins: AllowedOrigins,
    /// Upper-case HTTP method names.
    pub methods: Vec<&'static str>,
    pub allow_any_header: bool,
    pub credentials: bool,
    /// Path pattern the rule applies to.
    pub resource: &'static str,
}

pub const CORS_METHODS: [&str; 7] = ["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS", "HEAD"];

/// Session store settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionConfig {
    pub store: &'static str,
    pub cookie_name: &'static str,
}

/// Cache backend kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheKind {
    /// Distributed key-value cache speaking the Redis protocol.
    RedisCache,
}

/// Cache backend descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheConfig {
    pub kind: CacheKind,
    pub url: String,
    /// Maximum pooled connections (>= 1).
    pub pool_size: usize,
    /// Seconds a caller waits for a free connection.
    pub pool_timeout_secs: u64,
}

impl CacheConfig {
    /// Connection URL with any password replaced, for logging.
    pub fn redacted_url(&self) -> String {
        match url::Url::parse(&self.url) {
            Ok(mut url) if url.password().is_some() => {
                let _ = url.set_password(Some("REDACTED"));
                url.to_string()
            }
            Ok(url) => url.to_string(),
            Err(_) => "<invalid>".to_string(),
        }
    }
}

pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379/1";
pub const DEFAULT_POOL_SIZE: usize = 5;
pub const POOL_TIMEOUT_SECS: u64 = 5;

/// Log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Logging output policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LogPolicy {
    pub level: LogLevel,
    /// Machine-parseable JSON lines with timestamp, host and request id.
    pub structured: bool,
}

/// Requests matching an exclusion are never redirected to HTTPS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SslExclusion {
    PathPrefix(&'static str),
}

impl SslExclusion {
    /// Evaluated per request against the request path.
    pub fn excludes(&self, path: &str) -> bool {
        match self {
            SslExclusion::PathPrefix(prefix) => path.starts_with(prefix),
        }
    }
}

/// Transport security policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SslPolicy {
    pub force_ssl: bool,
    pub redirect_exclusion: SslExclusion,
    pub hsts_max_age_secs: u64,
}

/// Two years, matching the usual forced-SSL default.
pub const HSTS_MAX_AGE_SECS: u64 = 63_072_000;

/// Health endpoint contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthCheckConfig {
    /// Route segment without the leading slash.
    pub uri: &'static str,
    pub success_status: u16,
    pub verbose: bool,
    pub include_error_in_response_body: bool,
}

impl HealthCheckConfig {
    pub fn route(&self) -> String {
        format!("/{}", self.uri)
    }
}

/// Names the single error renderer every unhandled failure is routed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorHandlingConfig {
    pub handler: &'static str,
}

pub const ERRORS_HANDLER: &str = "errors#show";

/// Listener configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    pub bind_address: String,

    /// Request timeout (total time for request/response) in seconds.
    pub request_timeout_secs: u64,
}

pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_parsing() {
        assert_eq!("production".parse::<Environment>().unwrap(), Environment::Production);
        assert_eq!("PROD".parse::<Environment>().unwrap(), Environment::Production);
        assert_eq!(" dev ".parse::<Environment>().unwrap(), Environment::Development);
        assert_eq!("test".parse::<Environment>().unwrap(), Environment::Test);
        assert!("staging".parse::<Environment>().is_err());
    }

    #[test]
    fn redacted_url_hides_password() {
        let config = CacheConfig {
            kind: CacheKind::RedisCache,
            url: "redis://:s3cret@cache:6379/1".to_string(),
            pool_size: 5,
            pool_timeout_secs: 5,
        };
        assert!(!config.redacted_url().contains("s3cret"));
        assert!(config.redacted_url().contains("cache:6379"));
    }

    #[test]
    fn health_exclusion_is_prefix_match() {
        let exclusion = SslExclusion::PathPrefix(HEALTH_PATH_PREFIX);
        assert!(exclusion.excludes("/health"));
        assert!(exclusion.excludes("/health/ready"));
        assert!(exclusion.excludes("/healthz"));
        assert!(!exclusion.excludes("/api/health"));
        assert!(!exclusion.excludes("/"));
    }
}
