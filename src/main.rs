//! gitops-app server.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────────┐
//!                     │                      gitops-app                       │
//!                     │                                                       │
//!   Client Request    │  ┌──────┐  ┌────────────┐  ┌─────────┐  ┌─────────┐   │
//!   ──────────────────┼─▶│ cors │─▶│ request-id │─▶│ logging │─▶│   ssl   │   │
//!                     │  └──────┘  └────────────┘  └─────────┘  └────┬────┘   │
//!                     │                                              ▼        │
//!                     │  ┌───────────────┐   ┌─────────┐   ┌──────────────┐   │
//!   Client Response   │  │ health / app  │◀──│ timeout │◀──│  exception   │   │
//!   ◀─────────────────┼──│    routes     │   └─────────┘   │   routing    │   │
//!                     │  └───────┬───────┘                 └──────────────┘   │
//!                     │          ▼                                            │
//!                     │  ┌───────────────┐                                    │
//!                     │  │  cache pool   │────────────────────────────────────┼──▶ Redis
//!                     │  └───────────────┘                                    │
//!                     │                                                       │
//!                     │  PolicySnapshot: loaded once, shared read-only        │
//!                     └──────────────────────────────────────────────────────┘
//! ```

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use gitops_app::cache::{CacheStore, Pool, RedisConnector};
use gitops_app::config::{self, EnvVars, Environment};
use gitops_app::health::HealthRegistry;
use gitops_app::lifecycle::shutdown_signal;
use gitops_app::observability::init_logging;
use gitops_app::HttpServer;

#[derive(Parser)]
#[command(name = "gitops-app")]
#[command(about = "Web application server with environment-driven policy", long_about = None)]
struct Cli {
    /// Deployment environment (development, test, production).
    /// Defaults to RAILS_ENV, then APP_ENV, then development.
    #[arg(short, long)]
    environment: Option<Environment>,

    /// Print the resolved policy as JSON and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // Logging may not be initialized yet (policy errors happen first).
            eprintln!("gitops-app: {e}");
            tracing::error!(error = %e, "Startup failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let vars = EnvVars::from_process();
    let environment = match cli.environment {
        Some(environment) => environment,
        None => Environment::from_env_vars(&vars)?,
    };

    let policy = Arc::new(config::load(environment, &vars)?);

    if cli.check {
        println!("{}", serde_json::to_string_pretty(&*policy)?);
        return Ok(());
    }

    init_logging(&policy.logging)?;

    tracing::info!("gitops-app v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        environment = %policy.environment,
        time_zone = policy.time_zone,
        cors_origin = %policy.cors_origin_display(),
        force_ssl = policy.ssl.force_ssl,
        cache_url = %policy.cache.redacted_url(),
        cache_pool_size = policy.cache.pool_size,
        job_queue = policy.job_queue_backend,
        session_cookie = policy.session.cookie_name,
        "Policy loaded"
    );

    let connector = RedisConnector::open(&policy.cache.url)?;
    let cache = CacheStore::new(Pool::from_config(connector, &policy.cache));
    let health = HealthRegistry::new(policy.health_check.clone()).register(Arc::new(cache));

    let listener = TcpListener::bind(&policy.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    HttpServer::new(policy, health)
        .run(listener, shutdown_signal())
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
