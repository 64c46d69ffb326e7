//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!
//! Per request:
//!     RequestIdLayer assigns X-Request-Id
//!     → RequestSpan opens a span with method, path, request_id, host
//!     → RequestCompleted records status and latency
//!
//! Consumers:
//!     → Log aggregation (stdout, JSON lines in production)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID flows through all log lines of a request
//! - Failure detail is logged here, never sent to clients

pub mod logging;

pub use logging::{init_logging, request_trace_layer};
