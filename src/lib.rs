//! Application shell: policy loading, request pipeline, cache pool.

pub mod cache;
pub mod config;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod observability;

pub use config::{load, ConfigError, EnvVars, Environment, PolicySnapshot};
pub use http::HttpServer;
