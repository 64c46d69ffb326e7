//! CORS policy for browser clients.
//!
//! Policy:
//! - Development: any origin, credentials allowed.
//! - Elsewhere: the configured allow-list only, credentials allowed.
//!
//! Browsers reject `Access-Control-Allow-Origin: *` together with credentials,
//! so "any origin" mirrors the request `Origin` back, and "any header" mirrors
//! the requested headers.

use std::time::Duration;

use axum::http::{HeaderValue, Method};
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};

use crate::config::{AllowedOrigins, CorsRule};
use crate::http::request::X_REQUEST_ID;

/// Preflight cache lifetime.
pub const MAX_AGE: Duration = Duration::from_secs(7200);

/// Build the CORS layer for `rule`.
pub fn layer(rule: &CorsRule) -> CorsLayer {
    let origin = match &rule.origins {
        AllowedOrigins::Any => AllowOrigin::mirror_request(),
        AllowedOrigins::List(origins) => AllowOrigin::list(
            origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok()),
        ),
    };

    let methods: Vec<Method> = rule
        .methods
        .iter()
        .filter_map(|m| Method::from_bytes(m.as_bytes()).ok())
        .collect();

    let mut cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(methods)
        .allow_credentials(rule.credentials)
        .expose_headers([X_REQUEST_ID])
        .max_age(MAX_AGE);

    if rule.allow_any_header {
        cors = cors.allow_headers(AllowHeaders::mirror_request());
    }

    cors
}
