//! Application policy subsystem.
//!
//! # Data Flow
//! ```text
//! process environment
//!     → EnvVars (captured once at boot)
//!     → Environment::from_env_vars (development | test | production)
//!     → loader.rs (defaults, environment-gated values)
//!     → validation.rs (per-variable checks)
//!     → PolicySnapshot (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Snapshot is immutable once loaded; there is no reload path
//! - `load` is a pure function of its two arguments
//! - Environment-dependent values are decided by exhaustive matches in one place

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load, ConfigError, EnvVars};
pub use schema::{
    AllowedOrigins, CacheConfig, CorsRule, Environment, HealthCheckConfig, ListenerConfig,
    LogLevel, LogPolicy, PolicySnapshot, SslExclusion, SslPolicy,
};
