//! Health endpoint subsystem.
//!
//! # Data Flow
//! ```text
//! Load balancer / orchestrator probe (plain HTTP allowed)
//!     → GET /health
//!     → endpoint.rs runs every registered HealthCheck in order
//!     → 200 "success" | 500 "health_check failed"
//!     → failure detail logged, never returned (unless configured)
//! ```
//!
//! # Design Decisions
//! - Checks are trait objects registered at boot; the set is fixed afterwards
//! - Probes bypass the SSL redirect via the `/health` exclusion
//! - Response bodies stay minimal; no stack traces ever

pub mod endpoint;

use std::future::Future;
use std::pin::Pin;

pub use endpoint::{router, HealthRegistry};

/// A dependency probed by the health endpoint.
pub trait HealthCheck: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Err` carries detail for the logs.
    fn check(&self) -> Pin<Box<dyn Future<Output = Result<(), String>> + Send + '_>>;
}
