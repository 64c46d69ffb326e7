//! Forced-SSL enforcement.
//!
//! # Responsibilities
//! - Redirect plain-HTTP requests to HTTPS when `force_ssl` is set
//! - Skip requests matched by the redirect exclusion (health probes)
//! - Add `Strict-Transport-Security` to responses served over HTTPS
//!
//! # Design Decisions
//! - TLS terminates upstream; `X-Forwarded-Proto` marks secure requests
//! - The exclusion is evaluated per request, never cached
//! - GET/HEAD redirect with 301, other methods with 307 to keep the body
//! - This stage sits outside the exception boundary, so its own failures
//!   are rendered through the shared `ErrorRoutes` directly

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::config::SslPolicy;
use crate::http::response::{finish, AppError, ErrorRoutes, RequestMeta};

pub const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

/// Middleware state: the policy plus the renderer table for rejected requests.
#[derive(Clone)]
pub struct SslState {
    policy: Arc<SslPolicy>,
    errors: Arc<ErrorRoutes>,
}

impl SslState {
    pub fn new(policy: SslPolicy, errors: Arc<ErrorRoutes>) -> Self {
        Self {
            policy: Arc::new(policy),
            errors,
        }
    }
}

pub async fn ssl_redirect(State(state): State<SslState>, req: Request, next: Next) -> Response {
    let policy = &state.policy;
    if !policy.force_ssl {
        return next.run(req).await;
    }

    let secure = is_secure(&req);
    if !secure && !policy.redirect_exclusion.excludes(req.uri().path()) {
        return match redirect_to_https(&req) {
            Ok(response) => response,
            Err(err) => finish(&state.errors, RequestMeta::capture(&req), err.into_response()),
        };
    }

    let mut response = next.run(req).await;
    if secure {
        if let Ok(value) = HeaderValue::from_str(&hsts_value(policy.hsts_max_age_secs)) {
            response
                .headers_mut()
                .entry(header::STRICT_TRANSPORT_SECURITY)
                .or_insert(value);
        }
    }
    response
}

/// True when the request arrived over TLS (directly or via a terminating proxy).
pub fn is_secure<B>(req: &axum::http::Request<B>) -> bool {
    if req.uri().scheme_str() == Some("https") {
        return true;
    }
    req.headers()
        .get(&X_FORWARDED_PROTO)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .is_some_and(|proto| proto.trim().eq_ignore_ascii_case("https"))
}

pub fn hsts_value(max_age_secs: u64) -> String {
    format!("max-age={max_age_secs}; includeSubDomains")
}

fn redirect_to_https(req: &Request) -> Result<Response, AppError> {
    let Some(host) = request_host(req) else {
        return Err(AppError::BadRequest(
            "plain HTTP request without a host cannot be redirected".to_string(),
        ));
    };

    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let location = format!("https://{host}{path_and_query}");

    let status = if req.method() == Method::GET || req.method() == Method::HEAD {
        StatusCode::MOVED_PERMANENTLY
    } else {
        StatusCode::TEMPORARY_REDIRECT
    };

    let value = HeaderValue::from_str(&location)
        .map_err(|_| AppError::BadRequest(format!("unusable redirect target {location:?}")))?;

    tracing::debug!(location = %location, "Redirecting to HTTPS");
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    response.headers_mut().insert(header::LOCATION, value);
    Ok(response)
}

/// Host without port, from the `Host` header or the absolute URI.
fn request_host(req: &Request) -> Option<String> {
    let raw = req
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| req.uri().authority().map(|a| a.as_str()))?;

    let host = if raw.starts_with('[') {
        // [v6]:port
        raw.split_inclusive(']').next().unwrap_or(raw)
    } else {
        raw.split(':').next().unwrap_or(raw)
    };

    (!host.is_empty()).then(|| host.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{middleware::from_fn_with_state, routing::get, Router};
    use tower::ServiceExt;

    use crate::config::schema::{ErrorHandlingConfig, HSTS_MAX_AGE_SECS};
    use crate::config::SslExclusion;

    fn app(force_ssl: bool) -> Router {
        let policy = SslPolicy {
            force_ssl,
            redirect_exclusion: SslExclusion::PathPrefix("/health"),
            hsts_max_age_secs: HSTS_MAX_AGE_SECS,
        };
        let errors = Arc::new(ErrorRoutes::from_policy(&ErrorHandlingConfig {
            handler: "errors#show",
        }));
        Router::new()
            .route("/health", get(|| async { "success" }))
            .route("/items", get(|| async { "items" }).post(|| async { "created" }))
            .layer(from_fn_with_state(SslState::new(policy, errors), ssl_redirect))
    }

    fn plain(method: Method, uri: &str) -> axum::http::Request<Body> {
        axum::http::Request::builder()
            .method(method)
            .uri(uri)
            .header(header::HOST, "app.example:8080")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn plain_http_is_redirected() {
        let response = app(true).oneshot(plain(Method::GET, "/items?page=2")).await.unwrap();
        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(response.headers()[header::LOCATION], "https://app.example/items?page=2");
    }

    #[tokio::test]
    async fn non_idempotent_methods_keep_method() {
        let response = app(true).oneshot(plain(Method::POST, "/items")).await.unwrap();
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    }

    #[tokio::test]
    async fn health_probes_are_never_redirected() {
        for force in [true, false] {
            let response = app(force).oneshot(plain(Method::GET, "/health")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert!(response.headers().get(header::STRICT_TRANSPORT_SECURITY).is_none());
        }
    }

    #[tokio::test]
    async fn forwarded_https_passes_with_hsts() {
        let mut req = plain(Method::GET, "/items");
        req.headers_mut().insert(X_FORWARDED_PROTO, HeaderValue::from_static("https"));
        let response = app(true).oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::STRICT_TRANSPORT_SECURITY],
            "max-age=63072000; includeSubDomains"
        );
    }

    #[tokio::test]
    async fn missing_host_is_rendered_as_bad_request() {
        let req = axum::http::Request::get("/items").body(Body::empty()).unwrap();
        let response = app(true).oneshot(req).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.headers().get(header::LOCATION).is_none());
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], 400);
        assert_eq!(json["error"], "Bad Request");
    }

    #[tokio::test]
    async fn disabled_policy_passes_through() {
        let response = app(false).oneshot(plain(Method::GET, "/items")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn host_parsing() {
        let req = plain(Method::GET, "/");
        assert_eq!(request_host(&req).as_deref(), Some("app.example"));

        let v6 = axum::http::Request::builder()
            .uri("/")
            .header(header::HOST, "[::1]:3000")
            .body(Body::empty())
            .unwrap();
        assert_eq!(request_host(&v6).as_deref(), Some("[::1]"));
    }
}
