//! Bounded connection pool for the cache backend.
//!
//! # Responsibilities
//! - Cap concurrent connections at `pool_size`
//! - Reuse idle connections; open new ones lazily
//! - Bound the wait for a free slot by `pool_timeout`
//! - Return connections on every exit path via an RAII guard

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::cache::{CacheConnector, CacheError};
use crate::config::CacheConfig;

/// A fixed-size pool of cache connections.
///
/// Uses a semaphore to enforce the size limit. When every slot is checked out,
/// callers wait up to `timeout` before failing with [`CacheError::PoolExhausted`].
pub struct Pool<C: CacheConnector> {
    connector: C,
    idle: Mutex<Vec<C::Connection>>,
    slots: Arc<Semaphore>,
    size: usize,
    timeout: Duration,
}

impl<C: CacheConnector> Pool<C> {
    pub fn new(connector: C, size: usize, timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            connector,
            idle: Mutex::new(Vec::with_capacity(size)),
            slots: Arc::new(Semaphore::new(size)),
            size,
            timeout,
        })
    }

    pub fn from_config(connector: C, config: &CacheConfig) -> Arc<Self> {
        Self::new(
            connector,
            config.pool_size,
            Duration::from_secs(config.pool_timeout_secs),
        )
    }

    /// Borrow a connection for one operation.
    ///
    /// The returned guard must be held for the operation's lifetime; dropping it
    /// releases the slot.
    pub async fn acquire(self: &Arc<Self>) -> Result<PooledConnection<C>, CacheError> {
        let wait = self.slots.clone().acquire_owned();
        let permit = match tokio::time::timeout(self.timeout, wait).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(CacheError::Connection("pool closed".to_string())),
            Err(_) => {
                tracing::warn!(
                    pool_size = self.size,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Cache pool exhausted"
                );
                return Err(CacheError::PoolExhausted {
                    timeout: self.timeout,
                });
            }
        };

        let idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner).pop();
        let conn = match idle {
            Some(conn) => conn,
            None => {
                tracing::debug!(pool_size = self.size, "Opening cache connection");
                // Permit drops on error, freeing the slot.
                self.connector.connect().await?
            }
        };

        Ok(PooledConnection {
            conn: Some(conn),
            pool: Arc::clone(self),
            broken: false,
            _permit: permit,
        })
    }

    /// Slots not currently checked out.
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    /// Open connections waiting for reuse.
    pub fn idle_count(&self) -> usize {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    fn release(&self, conn: C::Connection) {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).push(conn);
    }
}

/// A checked-out connection.
///
/// On drop the connection goes back to the idle list (unless marked broken)
/// and then the slot is released.
pub struct PooledConnection<C: CacheConnector> {
    conn: Option<C::Connection>,
    pool: Arc<Pool<C>>,
    broken: bool,
    _permit: OwnedSemaphorePermit,
}

impl<C: CacheConnector> PooledConnection<C> {
    /// Discard this connection instead of returning it to the pool.
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }
}

impl<C: CacheConnector> Deref for PooledConnection<C> {
    type Target = C::Connection;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect("connection present until drop")
    }
}

impl<C: CacheConnector> DerefMut for PooledConnection<C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("connection present until drop")
    }
}

impl<C: CacheConnector> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if self.broken {
                tracing::debug!("Discarding broken cache connection");
            } else {
                self.pool.release(conn);
            }
        }
    }
}
