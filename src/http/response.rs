//! Exception routing at the request boundary.
//!
//! # Responsibilities
//! - Give handlers one error type (`AppError`) that never leaks detail
//! - Route every unhandled failure (handler errors, unknown paths, panics)
//!   to the registered error renderer
//! - Log the failure detail internally with the request id
//!
//! # Design Decisions
//! - Handlers mark failures with an `UnhandledError` response extension;
//!   the boundary middleware renders them, so handlers stay renderer-agnostic
//! - Renderers are resolved through an explicit table keyed by `ErrorKind`
//! - Pool exhaustion fails only the current request (503)
//! - Request timeouts surface as `AppError::Timeout`, rendered like any other failure

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    BoxError, Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::cache::CacheError;
use crate::config::schema::ErrorHandlingConfig;
use crate::http::request::RequestId;

/// Failure categories with a fixed status each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    BadRequest,
    PoolExhausted,
    Timeout,
    Internal,
}

impl ErrorKind {
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
            ErrorKind::PoolExhausted => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Timeout => StatusCode::REQUEST_TIMEOUT,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error type returned by request handlers.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("no route matches {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("request did not complete within the configured timeout")]
    Timeout,

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::BadRequest(_) => ErrorKind::BadRequest,
            AppError::Cache(CacheError::PoolExhausted { .. }) => ErrorKind::PoolExhausted,
            AppError::Timeout => ErrorKind::Timeout,
            AppError::Cache(_) | AppError::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// Marker the boundary looks for. Carries detail for logs only.
#[derive(Debug, Clone)]
pub struct UnhandledError {
    pub kind: ErrorKind,
    pub detail: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let mut response = kind.status().into_response();
        response.extensions_mut().insert(UnhandledError {
            kind,
            detail: self.to_string(),
        });
        response
    }
}

/// What a renderer is told about a failure. Contains no internal detail.
#[derive(Debug, Clone)]
pub struct FailureContext {
    pub kind: ErrorKind,
    pub status: StatusCode,
    pub method: Method,
    pub path: String,
    pub request_id: Option<String>,
}

/// Produces the client-facing response for a failure.
pub trait ErrorRenderer: Send + Sync {
    fn render(&self, failure: &FailureContext) -> Response;
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    status: u16,
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_id: Option<&'a str>,
}

/// Default renderer: a small JSON document with status, reason and request id.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonErrorRenderer;

impl ErrorRenderer for JsonErrorRenderer {
    fn render(&self, failure: &FailureContext) -> Response {
        let body = ErrorBody {
            status: failure.status.as_u16(),
            error: failure.status.canonical_reason().unwrap_or("Error"),
            request_id: failure.request_id.as_deref(),
        };
        (failure.status, Json(body)).into_response()
    }
}

/// Renderer registration table.
pub struct ErrorRoutes {
    handler: &'static str,
    default: Arc<dyn ErrorRenderer>,
    by_kind: HashMap<ErrorKind, Arc<dyn ErrorRenderer>>,
}

impl ErrorRoutes {
    /// Route every kind to `renderer`, registered under `handler`.
    pub fn new(handler: &'static str, renderer: Arc<dyn ErrorRenderer>) -> Self {
        Self {
            handler,
            default: renderer,
            by_kind: HashMap::new(),
        }
    }

    pub fn from_policy(config: &ErrorHandlingConfig) -> Self {
        Self::new(config.handler, Arc::new(JsonErrorRenderer))
    }

    /// Override the renderer for one kind.
    pub fn route(mut self, kind: ErrorKind, renderer: Arc<dyn ErrorRenderer>) -> Self {
        self.by_kind.insert(kind, renderer);
        self
    }

    pub fn handler(&self) -> &'static str {
        self.handler
    }

    pub fn resolve(&self, kind: ErrorKind) -> &Arc<dyn ErrorRenderer> {
        self.by_kind.get(&kind).unwrap_or(&self.default)
    }

    pub fn render(&self, failure: &FailureContext) -> Response {
        self.resolve(failure.kind).render(failure)
    }
}

/// Request facts captured before the inner service consumes the request.
#[derive(Debug, Clone)]
pub(crate) struct RequestMeta {
    method: Method,
    path: String,
    request_id: Option<String>,
}

impl RequestMeta {
    pub(crate) fn capture(req: &Request) -> Self {
        Self {
            method: req.method().clone(),
            path: req.uri().path().to_string(),
            request_id: req
                .extensions()
                .get::<RequestId>()
                .map(|id| id.as_str().to_string()),
        }
    }
}

/// Re-render `response` through `routes` if it carries an [`UnhandledError`].
pub(crate) fn finish(routes: &ErrorRoutes, meta: RequestMeta, response: Response) -> Response {
    let Some(failure) = response.extensions().get::<UnhandledError>().cloned() else {
        return response;
    };

    let context = FailureContext {
        kind: failure.kind,
        status: response.status(),
        method: meta.method,
        path: meta.path,
        request_id: meta.request_id,
    };

    let request_id = context.request_id.as_deref().unwrap_or("-");
    if context.status.is_server_error() || context.kind == ErrorKind::Timeout {
        tracing::error!(
            request_id = %request_id,
            kind = ?context.kind,
            status = context.status.as_u16(),
            path = %context.path,
            handler = routes.handler(),
            error = %failure.detail,
            "Unhandled request error"
        );
    } else {
        tracing::info!(
            request_id = %request_id,
            kind = ?context.kind,
            status = context.status.as_u16(),
            path = %context.path,
            error = %failure.detail,
            "Request failed"
        );
    }

    routes.render(&context)
}

/// Boundary middleware: re-renders marked failures through [`ErrorRoutes`].
pub async fn render_exceptions(
    State(routes): State<Arc<ErrorRoutes>>,
    req: Request,
    next: Next,
) -> Response {
    let meta = RequestMeta::capture(&req);
    let response = next.run(req).await;
    finish(&routes, meta, response)
}

/// `HandleErrorLayer` hook for the timeout stage.
pub async fn timeout_error(err: BoxError) -> AppError {
    if err.is::<tower::timeout::error::Elapsed>() {
        AppError::Timeout
    } else {
        AppError::Internal(err.to_string())
    }
}

/// Router fallback for unknown paths.
pub async fn not_found(req: Request) -> AppError {
    AppError::NotFound(req.uri().path().to_string())
}

/// `CatchPanicLayer` hook: turns a panic into a marked 500.
pub fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response<Body> {
    let message = payload
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| payload.downcast_ref::<&str>().map(|s| s.to_string()))
        .unwrap_or_else(|| "unknown panic".to_string());
    AppError::Internal(format!("handler panicked: {message}")).into_response()
}
