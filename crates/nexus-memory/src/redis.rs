use futures::future::BoxFuture;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use tracing::{debug, info};

use nexus_core::error::{NexusError, Result};
use nexus_core::traits::KvStore;

fn storage_err(e: redis::RedisError) -> NexusError {
    NexusError::Storage(e.to_string())
}

/// Redis-backed key-value store. The connection manager reconnects on its
/// own, so one handle is shared by every store in the process.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connect to Redis.
    pub async fn connect(url: &str) -> Result<Self> {
        info!(url = %url, "Connecting to Redis");
        let client = Client::open(url).map_err(storage_err)?;
        let conn = ConnectionManager::new(client).await.map_err(storage_err)?;
        info!("Connected to Redis");
        Ok(Self { conn })
    }

    /// Round-trip a PING.
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(storage_err)?;
        Ok(())
    }
}

impl KvStore for RedisStore {
    fn set_ex(&self, key: &str, value: String, ttl_secs: u64) -> BoxFuture<'_, Result<()>> {
        let key = key.to_string();
        Box::pin(async move {
            let mut conn = self.conn.clone();
            debug!(key = %key, ttl_secs, "SETEX");
            conn.set_ex::<_, _, ()>(&key, value, ttl_secs)
                .await
                .map_err(storage_err)
        })
    }

    fn get(&self, key: &str) -> BoxFuture<'_, Result<Option<String>>> {
        let key = key.to_string();
        Box::pin(async move {
            let mut conn = self.conn.clone();
            conn.get::<_, Option<String>>(&key).await.map_err(storage_err)
        })
    }

    fn expire(&self, key: &str, ttl_secs: u64) -> BoxFuture<'_, Result<bool>> {
        let key = key.to_string();
        Box::pin(async move {
            let mut conn = self.conn.clone();
            redis::cmd("EXPIRE")
                .arg(&key)
                .arg(ttl_secs)
                .query_async::<_, bool>(&mut conn)
                .await
                .map_err(storage_err)
        })
    }
}
