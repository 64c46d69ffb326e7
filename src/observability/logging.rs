//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber from the log policy
//! - Emit one span per request carrying method, path, request id and host
//! - Record status and latency when the response is produced
//!
//! # Design Decisions
//! - JSON lines in production, human-readable format elsewhere
//! - `RUST_LOG` overrides the policy level when set
//! - Timestamps are RFC 3339 (the formatter default)

use std::sync::Arc;
use std::time::Duration;

use axum::http::{Request, Response};
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::trace::{DefaultOnRequest, MakeSpan, OnResponse, TraceLayer};
use tracing::{Span, Subscriber};
use tracing_subscriber::fmt::{
    self,
    format::{Format, Json, JsonFields},
    MakeWriter,
};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogLevel, LogPolicy};
use crate::http::request::RequestId;

/// Default filter directives for `level`.
pub fn default_directives(level: LogLevel) -> String {
    let level = level.as_str();
    format!("warn,gitops_app={level},tower_http={level}")
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(policy: &LogPolicy) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(policy.level)));

    let json = policy.structured.then(|| json_layer(std::io::stdout));
    let text = (!policy.structured).then(fmt::layer);

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(text)
        .try_init()
}

/// One JSON object per line: timestamp, level, event fields, and the
/// enclosing request span.
pub fn json_layer<S, W>(writer: W) -> fmt::Layer<S, JsonFields, Format<Json>, W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + 'static,
{
    fmt::layer()
        .json()
        .flatten_event(true)
        .with_current_span(true)
        .with_span_list(false)
        .with_writer(writer)
}

/// Machine host name for log records.
pub fn host_name() -> String {
    sysinfo::System::host_name().unwrap_or_else(|| "unknown".to_string())
}

/// Span factory for inbound requests.
#[derive(Debug, Clone)]
pub struct RequestSpan {
    host: Arc<str>,
}

impl RequestSpan {
    pub fn new(host: impl Into<Arc<str>>) -> Self {
        Self { host: host.into() }
    }
}

impl<B> MakeSpan<B> for RequestSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        let request_id = request
            .extensions()
            .get::<RequestId>()
            .map(|id| id.as_str().to_string())
            .or_else(|| RequestId::from_headers(request.headers()).map(|id| id.to_string()))
            .unwrap_or_default();

        tracing::info_span!(
            "request",
            method = %request.method(),
            path = %request.uri().path(),
            request_id = %request_id,
            host = %self.host,
            status = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
        )
    }
}

/// Emits the per-request summary line.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestCompleted;

impl<B> OnResponse<B> for RequestCompleted {
    fn on_response(self, response: &Response<B>, latency: Duration, span: &Span) {
        let status = response.status().as_u16();
        let latency_ms = latency.as_millis() as u64;
        span.record("status", status);
        span.record("latency_ms", latency_ms);
        tracing::info!(parent: span, status, latency_ms, "Request completed");
    }
}

pub type RequestTraceLayer = TraceLayer<
    SharedClassifier<ServerErrorsAsFailures>,
    RequestSpan,
    DefaultOnRequest,
    RequestCompleted,
>;

/// Request logging stage.
pub fn request_trace_layer(host: impl Into<Arc<str>>) -> RequestTraceLayer {
    TraceLayer::new_for_http()
        .make_span_with(RequestSpan::new(host))
        .on_response(RequestCompleted)
}
