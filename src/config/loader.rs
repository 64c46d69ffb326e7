//! Policy loading from the process environment.

use std::collections::HashMap;

use thiserror::Error;

use crate::config::schema::*;
use crate::config::validation;

/// Error type for policy loading. Always fatal at boot.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {name} ({value:?}): {reason}")]
    InvalidVariable {
        name: String,
        value: String,
        reason: String,
    },

    #[error("unknown environment: {0:?}")]
    UnknownEnvironment(String),
}

impl ConfigError {
    pub(crate) fn invalid(name: &str, value: &str, reason: &str) -> Self {
        ConfigError::InvalidVariable {
            name: name.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub const REDIS_URL: &str = "REDIS_URL";
pub const RAILS_MAX_THREADS: &str = "RAILS_MAX_THREADS";
pub const RAILS_ENV: &str = "RAILS_ENV";
pub const APP_ENV: &str = "APP_ENV";
pub const PORT: &str = "PORT";
pub const BIND_HOST: &str = "BIND_HOST";
pub const REQUEST_TIMEOUT_SECS: &str = "REQUEST_TIMEOUT_SECS";

/// Snapshot of environment variables.
///
/// Captured once so that [`load`] never reads ambient process state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvVars {
    vars: HashMap<String, String>,
}

impl EnvVars {
    /// Capture the current process environment.
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }
}

impl<K, V> FromIterator<(K, V)> for EnvVars
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl Environment {
    /// Resolve from `RAILS_ENV`, then `APP_ENV`, defaulting to development.
    pub fn from_env_vars(vars: &EnvVars) -> Result<Self, ConfigError> {
        match [RAILS_ENV, APP_ENV]
            .iter()
            .find_map(|name| vars.get(name).filter(|v| !v.trim().is_empty()))
        {
            Some(value) => value.parse(),
            None => Ok(Environment::default()),
        }
    }
}

/// Build the policy snapshot for `environment` from `vars`.
///
/// Deterministic: identical inputs produce identical snapshots.
pub fn load(environment: Environment, vars: &EnvVars) -> Result<PolicySnapshot, ConfigError> {
    let origins = match environment {
        Environment::Development => AllowedOrigins::Any,
        Environment::Test | Environment::Production => {
            AllowedOrigins::List(vec![PRODUCTION_ORIGIN.to_string()])
        }
    };

    let logging = match environment {
        Environment::Production => LogPolicy {
            level: LogLevel::Info,
            structured: true,
        },
        Environment::Development | Environment::Test => LogPolicy {
            level: LogLevel::Debug,
            structured: false,
        },
    };

    let cache = CacheConfig {
        kind: CacheKind::RedisCache,
        url: validation::redis_url(REDIS_URL, vars.get(REDIS_URL), DEFAULT_REDIS_URL)?,
        pool_size: validation::positive_integer(
            RAILS_MAX_THREADS,
            vars.get(RAILS_MAX_THREADS),
            DEFAULT_POOL_SIZE,
        )?,
        pool_timeout_secs: POOL_TIMEOUT_SECS,
    };

    let host = vars
        .get(BIND_HOST)
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .unwrap_or(DEFAULT_BIND_HOST);
    let port = validation::port(PORT, vars.get(PORT), DEFAULT_PORT)?;
    let request_timeout_secs = validation::positive_integer(
        REQUEST_TIMEOUT_SECS,
        vars.get(REQUEST_TIMEOUT_SECS),
        DEFAULT_REQUEST_TIMEOUT_SECS as usize,
    )? as u64;

    Ok(PolicySnapshot {
        environment,
        time_zone: TIME_ZONE,
        api_only: false,
        cors: CorsRule {
            origins,
            methods: CORS_METHODS.to_vec(),
            allow_any_header: true,
            credentials: true,
            resource: "*",
        },
        session: SessionConfig {
            store: "cookie_store",
            cookie_name: SESSION_COOKIE_NAME,
        },
        job_queue_backend: JOB_QUEUE_BACKEND,
        variant_processor: VARIANT_PROCESSOR,
        cache,
        logging,
        ssl: SslPolicy {
            force_ssl: environment.is_production(),
            redirect_exclusion: SslExclusion::PathPrefix(HEALTH_PATH_PREFIX),
            hsts_max_age_secs: HSTS_MAX_AGE_SECS,
        },
        health_check: HealthCheckConfig {
            uri: "health",
            success_status: 200,
            verbose: false,
            include_error_in_response_body: false,
        },
        errors: ErrorHandlingConfig {
            handler: ERRORS_HANDLER,
        },
        listener: ListenerConfig {
            bind_address: format_bind_address(host, port),
            request_timeout_secs,
        },
    })
}

fn format_bind_address(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Environment; 3] = [
        Environment::Development,
        Environment::Test,
        Environment::Production,
    ];

    #[test]
    fn production_defaults() {
        let policy = load(Environment::Production, &EnvVars::default()).unwrap();
        assert_eq!(policy.cache.url, "redis://localhost:6379/1");
        assert_eq!(policy.cache.pool_size, 5);
        assert_eq!(policy.cache.pool_timeout_secs, 5);
        assert_eq!(policy.logging.level, LogLevel::Info);
        assert!(policy.logging.structured);
        assert!(policy.ssl.force_ssl);
        assert_eq!(policy.cors_origin_display(), PRODUCTION_ORIGIN);
    }

    #[test]
    fn development_is_permissive() {
        let policy = load(Environment::Development, &EnvVars::default()).unwrap();
        assert_eq!(policy.cors.origins, AllowedOrigins::Any);
        assert_eq!(policy.cors_origin_display(), "*");
        assert!(!policy.ssl.force_ssl);
        assert_eq!(policy.logging.level, LogLevel::Debug);
        assert!(!policy.logging.structured);
    }

    #[test]
    fn cors_and_ssl_follow_environment() {
        for env in ALL {
            let policy = load(env, &EnvVars::default()).unwrap();
            assert_eq!(policy.cors.origins == AllowedOrigins::Any, env.is_development());
            assert_eq!(policy.ssl.force_ssl, env.is_production());
            assert!(policy.cors.credentials);
            assert_eq!(policy.cors.methods, CORS_METHODS.to_vec());
            assert_eq!(policy.time_zone, "UTC");
        }
    }

    #[test]
    fn load_is_deterministic() {
        let vars: EnvVars = [(REDIS_URL, "redis://cache:6379/2"), (RAILS_MAX_THREADS, "8")]
            .into_iter()
            .collect();
        for env in ALL {
            assert_eq!(load(env, &vars).unwrap(), load(env, &vars).unwrap());
        }
    }

    #[test]
    fn cache_variables_are_read() {
        let vars: EnvVars = [(REDIS_URL, "redis://cache:6379/2"), (RAILS_MAX_THREADS, "8")]
            .into_iter()
            .collect();
        let policy = load(Environment::Test, &vars).unwrap();
        assert_eq!(policy.cache.url, "redis://cache:6379/2");
        assert_eq!(policy.cache.pool_size, 8);
    }

    #[test]
    fn empty_pool_size_uses_default() {
        let vars: EnvVars = [(RAILS_MAX_THREADS, "")].into_iter().collect();
        let policy = load(Environment::Production, &vars).unwrap();
        assert_eq!(policy.cache.pool_size, 5);
    }

    #[test]
    fn malformed_pool_size_is_fatal() {
        for bad in ["abc", "0", "-1"] {
            let vars: EnvVars = [(RAILS_MAX_THREADS, bad)].into_iter().collect();
            match load(Environment::Production, &vars) {
                Err(ConfigError::InvalidVariable { name, .. }) => {
                    assert_eq!(name, RAILS_MAX_THREADS)
                }
                other => panic!("expected InvalidVariable for {bad:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn environment_resolution_order() {
        assert_eq!(
            Environment::from_env_vars(&EnvVars::default()).unwrap(),
            Environment::Development
        );

        let vars: EnvVars = [(APP_ENV, "test")].into_iter().collect();
        assert_eq!(Environment::from_env_vars(&vars).unwrap(), Environment::Test);

        let vars: EnvVars = [(RAILS_ENV, "production"), (APP_ENV, "test")].into_iter().collect();
        assert_eq!(Environment::from_env_vars(&vars).unwrap(), Environment::Production);

        let vars: EnvVars = [(RAILS_ENV, "staging")].into_iter().collect();
        assert!(Environment::from_env_vars(&vars).is_err());
    }

    #[test]
    fn listener_settings() {
        let policy = load(Environment::Development, &EnvVars::default()).unwrap();
        assert_eq!(policy.listener.bind_address, "0.0.0.0:3000");
        assert_eq!(policy.listener.request_timeout_secs, 30);

        let vars: EnvVars = [(BIND_HOST, "::1"), (PORT, "8080")].into_iter().collect();
        let policy = load(Environment::Development, &vars).unwrap();
        assert_eq!(policy.listener.bind_address, "[::1]:8080");
    }

    #[test]
    fn health_contract() {
        let policy = load(Environment::Production, &EnvVars::default()).unwrap();
        assert_eq!(policy.health_check.route(), "/health");
        assert_eq!(policy.health_check.success_status, 200);
        assert!(!policy.health_check.verbose);
        assert!(!policy.health_check.include_error_in_response_body);
    }
}
