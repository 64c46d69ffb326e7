//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Resolve environment → Load policy (fatal on error) → Init logging
//!     → Build cache pool → Assemble middleware chain → Bind listener
//!
//! Shutdown (signals.rs):
//!     SIGTERM/SIGINT → Stop accepting → Drain in-flight requests → Exit
//! ```
//!
//! # Design Decisions
//! - Ordered startup: policy first, listener last (traffic only when ready)
//! - Fail fast: any startup error is fatal

pub mod signals;

pub use signals::shutdown_signal;
