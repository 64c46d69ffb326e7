//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router (health route, application routes, fallback)
//! - Wire up the middleware chain in its fixed order
//! - Bind server to listener
//! - Serve until the shutdown future resolves, then drain

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::{error_handling::HandleErrorLayer, middleware::from_fn_with_state, Router};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;

use crate::config::PolicySnapshot;
use crate::health::{self, HealthRegistry};
use crate::http::chain::{MiddlewareChain, MiddlewareStage};
use crate::http::middleware::{cors, ssl};
use crate::http::request::RequestIdLayer;
use crate::http::response::{
    not_found, panic_response, render_exceptions, timeout_error, ErrorRoutes,
};
use crate::observability::logging::{host_name, request_trace_layer};

/// HTTP server for the application.
pub struct HttpServer {
    policy: Arc<PolicySnapshot>,
    chain: MiddlewareChain,
    health: Arc<HealthRegistry>,
    routes: Router,
    errors: Arc<ErrorRoutes>,
    host: String,
}

impl HttpServer {
    /// Create a server for `policy`. The middleware chain is fixed here.
    pub fn new(policy: Arc<PolicySnapshot>, health: HealthRegistry) -> Self {
        let chain = MiddlewareChain::assemble(&policy);
        let errors = Arc::new(ErrorRoutes::from_policy(&policy.errors));

        tracing::debug!(stages = ?chain.stages(), "Middleware chain assembled");

        Self {
            policy,
            chain,
            health: Arc::new(health),
            routes: Router::new(),
            errors,
            host: host_name(),
        }
    }

    /// Mount application routes (served behind the full chain).
    pub fn with_routes(mut self, routes: Router) -> Self {
        self.routes = self.routes.merge(routes);
        self
    }

    /// Replace the error renderer table.
    pub fn with_error_routes(mut self, errors: ErrorRoutes) -> Self {
        self.errors = Arc::new(errors);
        self
    }

    pub fn chain(&self) -> &MiddlewareChain {
        &self.chain
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// `chain.stages()[0]` ends up outermost: layers are applied innermost first.
    pub fn router(&self) -> Router {
        let mut router = health::router(self.health.clone())
            .merge(self.routes.clone())
            .fallback(not_found);

        for stage in self.chain.stages().iter().rev() {
            router = match stage {
                MiddlewareStage::Timeout => router.layer(
                    ServiceBuilder::new()
                        .layer(HandleErrorLayer::new(timeout_error))
                        .timeout(Duration::from_secs(self.policy.listener.request_timeout_secs)),
                ),
                MiddlewareStage::ExceptionRouting => router
                    .layer(CatchPanicLayer::custom(panic_response))
                    .layer(from_fn_with_state(self.errors.clone(), render_exceptions)),
                MiddlewareStage::SslRedirect => router.layer(from_fn_with_state(
                    ssl::SslState::new(self.policy.ssl.clone(), self.errors.clone()),
                    ssl::ssl_redirect,
                )),
                MiddlewareStage::RequestLogging => {
                    router.layer(request_trace_layer(self.host.as_str()))
                }
                MiddlewareStage::RequestId => router.layer(RequestIdLayer),
                MiddlewareStage::Cors => router.layer(cors::layer(&self.policy.cors)),
            };
        }

        router
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            environment = %self.policy.environment,
            force_ssl = self.policy.ssl.force_ssl,
            "HTTP server starting"
        );

        let app = self.router();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
