//! Distributed cache subsystem.
//!
//! # Data Flow
//! ```text
//! CacheStore::get/set/delete/ping
//!     → pool.rs (wait ≤ pool_timeout for a slot, reuse or open a connection)
//!     → redis_store.rs | memory.rs (one command on the borrowed connection)
//!     → guard drop returns the connection, releases the slot
//! ```
//!
//! # Design Decisions
//! - The pool is the only shared mutable state in the application
//! - One connection per operation; guards are never held across requests
//! - Exhaustion is a per-request failure, never a process failure

pub mod memory;
pub mod pool;
pub mod redis_store;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

pub use memory::MemoryConnector;
pub use pool::{Pool, PooledConnection};
pub use redis_store::RedisConnector;

use crate::health::HealthCheck;

/// Errors produced by the cache subsystem.
#[derive(Debug, Error)]
pub enum CacheError {
    /// No connection became free within the pool timeout.
    #[error("cache pool exhausted after waiting {timeout:?}")]
    PoolExhausted { timeout: Duration },

    /// Connecting to the backend failed or the connection dropped.
    #[error("cache connection error: {0}")]
    Connection(String),

    /// The backend rejected a command.
    #[error("cache backend error: {0}")]
    Backend(String),
}

/// Opens connections to a cache backend.
pub trait CacheConnector: Send + Sync + 'static {
    type Connection: CacheConnection;

    fn connect(&self) -> impl Future<Output = Result<Self::Connection, CacheError>> + Send;
}

/// A single connection to a cache backend.
pub trait CacheConnection: Send + 'static {
    fn get(&mut self, key: &str) -> impl Future<Output = Result<Option<String>, CacheError>> + Send;

    fn set(
        &mut self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> impl Future<Output = Result<(), CacheError>> + Send;

    /// Returns true if a value was removed.
    fn delete(&mut self, key: &str) -> impl Future<Output = Result<bool, CacheError>> + Send;

    fn ping(&mut self) -> impl Future<Output = Result<(), CacheError>> + Send;
}

/// Cache client. Each call borrows one pooled connection for its duration.
pub struct CacheStore<C: CacheConnector> {
    pool: Arc<Pool<C>>,
}

impl<C: CacheConnector> Clone for CacheStore<C> {
    fn clone(&self) -> Self {
        Self {
            pool: Arc::clone(&self.pool),
        }
    }
}

impl<C: CacheConnector> CacheStore<C> {
    pub fn new(pool: Arc<Pool<C>>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Arc<Pool<C>> {
        &self.pool
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.pool.acquire().await?;
        let result = conn.get(key).await;
        settle(&mut conn, result)
    }

    pub async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let mut conn = self.pool.acquire().await?;
        let result = conn.set(key, value, ttl).await;
        settle(&mut conn, result)
    }

    pub async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.pool.acquire().await?;
        let result = conn.delete(key).await;
        settle(&mut conn, result)
    }

    pub async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.pool.acquire().await?;
        let result = conn.ping().await;
        settle(&mut conn, result)
    }
}

/// Connection-level failures poison the connection; command errors do not.
fn settle<C: CacheConnector, T>(
    conn: &mut PooledConnection<C>,
    result: Result<T, CacheError>,
) -> Result<T, CacheError> {
    if let Err(CacheError::Connection(_)) = &result {
        conn.mark_broken();
    }
    result
}

impl<C: CacheConnector> HealthCheck for CacheStore<C> {
    fn name(&self) -> &'static str {
        "cache"
    }

    fn check(&self) -> Pin<Box<dyn Future<Output = Result<(), String>> + Send + '_>> {
        Box::pin(async move { self.ping().await.map_err(|e| e.to_string()) })
    }
}
