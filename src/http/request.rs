//! Request-id tagging.
//!
//! # Responsibilities
//! - Propagate an inbound `X-Request-Id` unchanged (raw header bytes)
//! - Generate a UUID v4 when the header is absent or unusable
//! - Expose the id to handlers (extension + extractor) and echo it on the response
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing (second stage, after CORS)
//! - The request header is rewritten so later stages read one source of truth

use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::extract::FromRequestParts;
use axum::http::{request::Parts, HeaderMap, HeaderName, HeaderValue, Request, Response};
use tower::{Layer, Service};
use uuid::Uuid;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Correlation id for one request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(String);

impl RequestId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Read the inbound header; `None` when absent or blank.
    ///
    /// Non-ASCII bytes are kept on the wire; this textual form replaces them
    /// with U+FFFD for logging.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        inbound(headers).map(Self::from_header_value)
    }

    fn from_header_value(value: &HeaderValue) -> Self {
        Self(String::from_utf8_lossy(value.as_bytes()).into_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<S: Send + Sync> FromRequestParts<S> for RequestId {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<RequestId>()
            .cloned()
            .or_else(|| RequestId::from_headers(&parts.headers))
            .unwrap_or_else(RequestId::generate))
    }
}

/// The inbound header value, if present and not blank.
fn inbound(headers: &HeaderMap) -> Option<&HeaderValue> {
    headers
        .get(&X_REQUEST_ID)
        .filter(|v| !v.as_bytes().iter().all(u8::is_ascii_whitespace))
}

/// Access the request id attached by [`RequestIdLayer`].
pub trait RequestIdExt {
    fn request_id(&self) -> Option<&RequestId>;
}

impl<B> RequestIdExt for Request<B> {
    fn request_id(&self) -> Option<&RequestId> {
        self.extensions().get::<RequestId>()
    }
}

/// Layer that assigns or propagates `X-Request-Id`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestIdLayer;

impl<S> Layer<S> for RequestIdLayer {
    type Service = RequestIdService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestIdService { inner }
    }
}

#[derive(Debug, Clone)]
pub struct RequestIdService<S> {
    inner: S,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for RequestIdService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        let (id, header) = match inbound(req.headers()) {
            Some(value) => (RequestId::from_header_value(value), Some(value.clone())),
            None => {
                let id = RequestId::generate();
                let header = HeaderValue::from_str(id.as_str()).ok();
                (id, header)
            }
        };

        if let Some(value) = &header {
            req.headers_mut().insert(X_REQUEST_ID, value.clone());
        }
        req.extensions_mut().insert(id);

        let future = self.inner.call(req);
        Box::pin(async move {
            let mut response = future.await?;
            if let Some(value) = header {
                response.headers_mut().insert(X_REQUEST_ID, value);
            }
            Ok(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, routing::get, Router};
    use tower::ServiceExt;

    async fn echo(id: RequestId) -> String {
        id.to_string()
    }

    fn app() -> Router {
        Router::new().route("/", get(echo)).layer(RequestIdLayer)
    }

    async fn send(req: Request<Body>) -> (String, String) {
        let response = app().oneshot(req).await.unwrap();
        let header = response.headers()[X_REQUEST_ID].to_str().unwrap().to_string();
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        (header, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn propagates_inbound_id() {
        let req = Request::get("/").header("X-Request-Id", "abc123").body(Body::empty()).unwrap();
        let (header, seen) = send(req).await;
        assert_eq!(seen, "abc123");
        assert_eq!(header, "abc123");
    }

    #[tokio::test]
    async fn generates_unique_ids() {
        let (h1, seen1) = send(Request::get("/").body(Body::empty()).unwrap()).await;
        let (_, seen2) = send(Request::get("/").body(Body::empty()).unwrap()).await;
        assert!(!seen1.is_empty());
        assert_eq!(h1, seen1);
        assert_ne!(seen1, seen2);
        assert!(Uuid::parse_str(&seen1).is_ok());
    }

    #[tokio::test]
    async fn empty_header_is_replaced() {
        let req = Request::get("/").header("X-Request-Id", "").body(Body::empty()).unwrap();
        let (_, seen) = send(req).await;
        assert!(Uuid::parse_str(&seen).is_ok());
    }

    #[tokio::test]
    async fn opaque_bytes_are_propagated_unchanged() {
        let raw = HeaderValue::from_bytes(b"trace-\xe9\xff-7").unwrap();
        let req = Request::get("/")
            .header(X_REQUEST_ID, raw.clone())
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(req).await.unwrap();

        assert_eq!(response.headers()[X_REQUEST_ID].as_bytes(), raw.as_bytes());
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert!(String::from_utf8(body.to_vec()).unwrap().starts_with("trace-"));
    }

    #[test]
    fn extension_accessor() {
        let mut req = Request::new(());
        assert!(req.request_id().is_none());
        req.extensions_mut().insert(RequestId("r-1".into()));
        assert_eq!(req.request_id().map(RequestId::as_str), Some("r-1"));
    }
}
