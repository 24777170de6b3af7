use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::time::Instant;

use nexus_core::error::{NexusError, Result};
use nexus_core::traits::KvStore;

/// In-process key-value store with per-key expiry.
///
/// Used when Redis is not reachable (`--memory` on the CLI) and by tests.
/// Expiry follows the tokio clock, so paused-time tests can step past a TTL.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, (String, Instant)>>,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail with a storage error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.lock()
            .values()
            .filter(|(_, deadline)| *deadline > now)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, (String, Instant)>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NexusError::Storage("memory store unavailable".into()));
        }
        Ok(())
    }
}

impl KvStore for MemoryStore {
    fn set_ex(&self, key: &str, value: String, ttl_secs: u64) -> BoxFuture<'_, Result<()>> {
        let key = key.to_string();
        Box::pin(async move {
            self.check()?;
            let now = Instant::now();
            let mut entries = self.lock();
            // Keys that are never read again would otherwise linger.
            entries.retain(|_, (_, deadline)| *deadline > now);
            entries.insert(key, (value, now + Duration::from_secs(ttl_secs)));
            Ok(())
        })
    }

    fn get(&self, key: &str) -> BoxFuture<'_, Result<Option<String>>> {
        let key = key.to_string();
        Box::pin(async move {
            self.check()?;
            let mut entries = self.lock();
            match entries.get(&key) {
                Some((value, deadline)) if *deadline > Instant::now() => Ok(Some(value.clone())),
                Some(_) => {
                    entries.remove(&key);
                    Ok(None)
                }
                None => Ok(None),
            }
        })
    }

    fn expire(&self, key: &str, ttl_secs: u64) -> BoxFuture<'_, Result<bool>> {
        let key = key.to_string();
        Box::pin(async move {
            self.check()?;
            let now = Instant::now();
            let mut entries = self.lock();
            match entries.get_mut(&key) {
                Some((_, deadline)) if *deadline > now => {
                    *deadline = now + Duration::from_secs(ttl_secs);
                    Ok(true)
                }
                Some(_) => {
                    entries.remove(&key);
                    Ok(false)
                }
                None => Ok(false),
            }
        })
    }
}
