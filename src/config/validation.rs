//! Environment variable validation.
//!
//! # Responsibilities
//! - Apply documented defaults for unset or empty variables
//! - Reject present-but-malformed values with the variable name attached
//!
//! # Design Decisions
//! - Empty string is treated the same as unset
//! - Validation is pure: (name, raw value) → Result<T, ConfigError>

use url::Url;

use crate::config::loader::ConfigError;

/// Parse a positive integer, falling back to `default` when the value is unset or empty.
pub fn positive_integer(
    name: &str,
    raw: Option<&str>,
    default: usize,
) -> Result<usize, ConfigError> {
    let Some(value) = non_empty(raw) else {
        return Ok(default);
    };

    let parsed: i64 = value
        .parse()
        .map_err(|_| ConfigError::invalid(name, value, "expected an integer"))?;

    if parsed < 1 {
        return Err(ConfigError::invalid(name, value, "must be at least 1"));
    }

    usize::try_from(parsed).map_err(|_| ConfigError::invalid(name, value, "out of range"))
}

/// Parse a TCP port, falling back to `default` when unset or empty.
pub fn port(name: &str, raw: Option<&str>, default: u16) -> Result<u16, ConfigError> {
    match non_empty(raw) {
        None => Ok(default),
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::invalid(name, value, "expected a port number")),
    }
}

/// Validate a cache connection string. Only `redis` and `rediss` schemes are accepted.
pub fn redis_url(name: &str, raw: Option<&str>, default: &str) -> Result<String, ConfigError> {
    let Some(value) = non_empty(raw) else {
        return Ok(default.to_string());
    };

    let url = Url::parse(value).map_err(|e| ConfigError::invalid(name, value, &e.to_string()))?;
    match url.scheme() {
        "redis" | "rediss" => {}
        other => {
            return Err(ConfigError::invalid(
                name,
                value,
                &format!("unsupported scheme '{other}'"),
            ))
        }
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(ConfigError::invalid(name, value, "missing host"));
    }

    Ok(value.to_string())
}

fn non_empty(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_integer_defaults() {
        assert_eq!(positive_integer("N", None, 5).unwrap(), 5);
        assert_eq!(positive_integer("N", Some(""), 5).unwrap(), 5);
        assert_eq!(positive_integer("N", Some("  "), 5).unwrap(), 5);
        assert_eq!(positive_integer("N", Some("12"), 5).unwrap(), 12);
    }

    #[test]
    fn positive_integer_rejects_bad_values() {
        for bad in ["0", "-3", "five", "2.5", "1e3"] {
            let err = positive_integer("N", Some(bad), 5).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidVariable { .. }), "{bad}");
        }
    }

    #[test]
    fn redis_url_checks_scheme() {
        assert_eq!(
            redis_url("R", None, "redis://localhost:6379/1").unwrap(),
            "redis://localhost:6379/1"
        );
        assert!(redis_url("R", Some("rediss://cache.internal:6380/0"), "x").is_ok());
        assert!(redis_url("R", Some("http://cache:6379"), "x").is_err());
        assert!(redis_url("R", Some("not a url"), "x").is_err());
    }

    #[test]
    fn port_parsing() {
        assert_eq!(port("P", None, 3000).unwrap(), 3000);
        assert_eq!(port("P", Some("8080"), 3000).unwrap(), 8080);
        assert!(port("P", Some("70000"), 3000).is_err());
    }
}
