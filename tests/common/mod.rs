//! Shared utilities for integration tests.

use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, routing::get, Router};

use gitops_app::cache::{CacheStore, MemoryConnector, Pool};
use gitops_app::config::{self, EnvVars, Environment, PolicySnapshot};
use gitops_app::health::HealthRegistry;
use gitops_app::http::AppError;
use gitops_app::HttpServer;

/// A server wired the way `main` wires it, but backed by the in-memory cache.
pub struct TestApp {
    pub policy: Arc<PolicySnapshot>,
    pub cache: CacheStore<MemoryConnector>,
    pub server: HttpServer,
}

pub fn build(environment: Environment, vars: &[(&str, &str)]) -> TestApp {
    let vars: EnvVars = vars.iter().copied().collect();
    let policy = Arc::new(config::load(environment, &vars).unwrap());

    // Short wait so exhaustion tests finish quickly.
    let pool = Pool::new(
        MemoryConnector::new(),
        policy.cache.pool_size,
        Duration::from_millis(100),
    );
    let cache = CacheStore::new(pool);
    let health = HealthRegistry::new(policy.health_check.clone()).register(Arc::new(cache.clone()));

    let server = HttpServer::new(policy.clone(), health).with_routes(app_routes(cache.clone()));

    TestApp {
        policy,
        cache,
        server,
    }
}

/// Minimal application routes exercising the cache and the error boundary.
pub fn app_routes(cache: CacheStore<MemoryConnector>) -> Router {
    Router::new()
        .route("/greeting", get(greeting))
        .route("/explode", get(explode))
        .route("/slow", get(slow))
        .with_state(cache)
}

async fn greeting(State(cache): State<CacheStore<MemoryConnector>>) -> Result<String, AppError> {
    let value = cache.get("greeting").await?;
    Ok(value.unwrap_or_else(|| "hello".to_string()))
}

async fn slow() -> &'static str {
    tokio::time::sleep(Duration::from_secs(3)).await;
    "finally"
}

async fn explode() -> &'static str {
    panic!("internal invariant violated in explode handler")
}
