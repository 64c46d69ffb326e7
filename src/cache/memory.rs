//! In-process cache backend.
//!
//! Shares one map across all connections so it behaves like a single remote
//! server. Used for local runs without Redis and in tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::cache::{CacheConnection, CacheConnector, CacheError};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

#[derive(Debug, Default)]
struct Shared {
    entries: DashMap<String, Entry>,
    unavailable: AtomicBool,
    connections_opened: AtomicUsize,
}

/// Connector for the in-process backend.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    shared: Arc<Shared>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the backend going away (or coming back).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.shared.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of connections opened so far.
    pub fn connections_opened(&self) -> usize {
        self.shared.connections_opened.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.shared.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.entries.is_empty()
    }
}

impl CacheConnector for MemoryConnector {
    type Connection = MemoryConnection;

    async fn connect(&self) -> Result<MemoryConnection, CacheError> {
        ensure_available(&self.shared)?;
        self.shared.connections_opened.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryConnection {
            shared: Arc::clone(&self.shared),
        })
    }
}

/// A handle onto the shared in-process map.
#[derive(Debug)]
pub struct MemoryConnection {
    shared: Arc<Shared>,
}

impl CacheConnection for MemoryConnection {
    async fn get(&mut self, key: &str) -> Result<Option<String>, CacheError> {
        ensure_available(&self.shared)?;
        let now = Instant::now();
        let value = self
            .shared
            .entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone());
        if value.is_none() {
            self.shared.entries.remove_if(key, |_, entry| !entry.is_live(now));
        }
        Ok(value)
    }

    async fn set(
        &mut self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        ensure_available(&self.shared)?;
        self.shared.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn delete(&mut self, key: &str) -> Result<bool, CacheError> {
        ensure_available(&self.shared)?;
        let now = Instant::now();
        Ok(self
            .shared
            .entries
            .remove(key)
            .is_some_and(|(_, entry)| entry.is_live(now)))
    }

    async fn ping(&mut self) -> Result<(), CacheError> {
        ensure_available(&self.shared)
    }
}

fn ensure_available(shared: &Shared) -> Result<(), CacheError> {
    if shared.unavailable.load(Ordering::SeqCst) {
        Err(CacheError::Connection("memory backend unavailable".to_string()))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connections_share_entries() {
        let connector = MemoryConnector::new();
        let mut a = connector.connect().await.unwrap();
        let mut b = connector.connect().await.unwrap();

        a.set("greeting", "hello", None).await.unwrap();
        assert_eq!(b.get("greeting").await.unwrap().as_deref(), Some("hello"));
        assert_eq!(connector.connections_opened(), 2);
    }

    #[tokio::test]
    async fn expired_entries_are_invisible() {
        let connector = MemoryConnector::new();
        let mut conn = connector.connect().await.unwrap();

        conn.set("short", "lived", Some(Duration::from_millis(10))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(conn.get("short").await.unwrap(), None);
        assert!(connector.is_empty());
    }
}
