//! Redis cache backend.

use std::time::Duration;

use redis::aio::MultiplexedConnection;

use crate::cache::{CacheConnection, CacheConnector, CacheError};

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error()
            || err.is_connection_refusal()
            || err.is_connection_dropped()
            || err.is_timeout()
        {
            CacheError::Connection(err.to_string())
        } else {
            CacheError::Backend(err.to_string())
        }
    }
}

/// Opens connections to a Redis server.
#[derive(Debug, Clone)]
pub struct RedisConnector {
    client: redis::Client,
}

impl RedisConnector {
    /// Parse the connection URL. Does not contact the server.
    pub fn open(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url).map_err(|e| CacheError::Connection(e.to_string()))?;
        Ok(Self { client })
    }
}

impl CacheConnector for RedisConnector {
    type Connection = RedisConnection;

    async fn connect(&self) -> Result<RedisConnection, CacheError> {
        let conn = self.client.get_multiplexed_async_connection().await?;
        Ok(RedisConnection { conn })
    }
}

pub struct RedisConnection {
    conn: MultiplexedConnection,
}

impl CacheConnection for RedisConnection {
    async fn get(&mut self, key: &str) -> Result<Option<String>, CacheError> {
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut self.conn).await?;
        Ok(value)
    }

    async fn set(
        &mut self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            // PX keeps sub-second TTLs; Redis rejects 0.
            cmd.arg("PX").arg(ttl.as_millis().max(1) as u64);
        }
        let _: () = cmd.query_async(&mut self.conn).await?;
        Ok(())
    }

    async fn delete(&mut self, key: &str) -> Result<bool, CacheError> {
        let removed: i64 = redis::cmd("DEL").arg(key).query_async(&mut self.conn).await?;
        Ok(removed > 0)
    }

    async fn ping(&mut self) -> Result<(), CacheError> {
        let _: String = redis::cmd("PING").query_async(&mut self.conn).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_parses_url_without_connecting() {
        assert!(RedisConnector::open("redis://localhost:6379/1").is_ok());
        assert!(RedisConnector::open("not-a-url").is_err());
    }

    #[test]
    fn command_errors_are_not_connection_errors() {
        let err = redis::RedisError::from((redis::ErrorKind::TypeError, "wrong type"));
        assert!(matches!(CacheError::from(err), CacheError::Backend(_)));

        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(matches!(
            CacheError::from(redis::RedisError::from(io)),
            CacheError::Connection(_)
        ));
    }
}
