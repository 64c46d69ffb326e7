//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → cors (preflight answered here, before anything can redirect)
//!     → request.rs (assign / propagate X-Request-Id)
//!     → request logging span
//!     → middleware/ssl.rs (redirect plain HTTP, except /health)
//!     → response.rs (exception boundary, panics caught)
//!     → request timeout
//!     → health endpoint | application routes | not-found fallback
//! ```

pub mod chain;
pub mod middleware;
pub mod request;
pub mod response;
pub mod server;

pub use chain::{MiddlewareChain, MiddlewareStage};
pub use request::{RequestId, RequestIdExt, RequestIdLayer, X_REQUEST_ID};
pub use response::{AppError, ErrorKind, ErrorRenderer, ErrorRoutes, FailureContext};
pub use server::HttpServer;
