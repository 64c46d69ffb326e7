//! Health endpoint handler.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::config::HealthCheckConfig;
use crate::health::HealthCheck;

pub const SUCCESS_BODY: &str = "success";
pub const FAILURE_BODY: &str = "health_check failed";

/// Registered checks plus the response contract.
pub struct HealthRegistry {
    config: HealthCheckConfig,
    checks: Vec<Arc<dyn HealthCheck>>,
}

impl HealthRegistry {
    pub fn new(config: HealthCheckConfig) -> Self {
        Self {
            config,
            checks: Vec::new(),
        }
    }

    pub fn register(mut self, check: Arc<dyn HealthCheck>) -> Self {
        self.checks.push(check);
        self
    }

    /// Run all checks, collecting every failure.
    pub async fn run(&self) -> Vec<CheckResult> {
        let mut results = Vec::with_capacity(self.checks.len());
        for check in &self.checks {
            let outcome = check.check().await;
            if let Err(detail) = &outcome {
                tracing::error!(check = check.name(), error = %detail, "Health check failed");
            }
            results.push(CheckResult {
                name: check.name(),
                healthy: outcome.is_ok(),
                error: outcome.err(),
            });
        }
        results
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub name: &'static str,
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize)]
struct VerboseReport {
    healthy: bool,
    checks: Vec<CheckResult>,
}

/// Router serving the configured health route.
pub fn router(registry: Arc<HealthRegistry>) -> Router {
    let route = registry.config.route();
    Router::new()
        .route(&route, get(health_check))
        .with_state(registry)
}

async fn health_check(State(registry): State<Arc<HealthRegistry>>) -> Response {
    let config = &registry.config;
    let mut results = registry.run().await;
    let healthy = results.iter().all(|r| r.healthy);

    let status = if healthy {
        StatusCode::from_u16(config.success_status).unwrap_or(StatusCode::OK)
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };

    if !config.include_error_in_response_body {
        for result in &mut results {
            result.error = None;
        }
    }

    if config.verbose {
        return (status, Json(VerboseReport { healthy, checks: results })).into_response();
    }

    if healthy {
        return (status, SUCCESS_BODY).into_response();
    }

    if config.include_error_in_response_body {
        let detail = results
            .iter()
            .filter_map(|r| r.error.as_deref().map(|e| format!("{}: {}", r.name, e)))
            .collect::<Vec<_>>()
            .join("; ");
        return (status, format!("{FAILURE_BODY}: {detail}")).into_response();
    }

    (status, FAILURE_BODY).into_response()
}
