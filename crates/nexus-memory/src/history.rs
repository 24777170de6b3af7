use std::sync::Arc;

use tracing::{debug, error, warn};

use nexus_core::state::HistoryEntry;
use nexus_core::traits::KvStore;

/// Per-agent conversation history, one JSON array per workflow and agent.
///
/// Keys look like `<agent_type>:<workflow_id>:messages`. Every read and
/// every write restarts the key's TTL.
#[derive(Clone)]
pub struct AgentHistoryStore {
    kv: Arc<dyn KvStore>,
    ttl_secs: u64,
}

impl AgentHistoryStore {
    pub fn new(kv: Arc<dyn KvStore>, ttl_secs: u64) -> Self {
        Self { kv, ttl_secs }
    }

    pub fn key(workflow_id: &str, agent_type: &str) -> String {
        format!("{agent_type}:{workflow_id}:messages")
    }

    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    /// Load the stored history. Missing keys, unreadable payloads and
    /// backend errors all yield an empty history.
    pub async fn load(&self, workflow_id: &str, agent_type: &str) -> Vec<HistoryEntry> {
        let key = Self::key(workflow_id, agent_type);
        let raw = match self.kv.get(&key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to load agent history");
                return Vec::new();
            }
        };

        if let Err(e) = self.kv.expire(&key, self.ttl_secs).await {
            warn!(key = %key, error = %e, "Failed to refresh history TTL");
        }

        match serde_json::from_str::<Vec<HistoryEntry>>(&raw) {
            Ok(entries) => {
                debug!(key = %key, entries = entries.len(), "Loaded agent history");
                entries
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Stored agent history is not valid JSON");
                Vec::new()
            }
        }
    }

    /// Replace the stored history. Blank identifiers are refused; an empty
    /// history is a no-op that counts as success.
    pub async fn save(
        &self,
        workflow_id: &str,
        agent_type: &str,
        entries: &[HistoryEntry],
    ) -> bool {
        if workflow_id.trim().is_empty() || agent_type.trim().is_empty() {
            error!(
                workflow_id,
                agent_type, "Refusing to save agent history without workflow id and agent"
            );
            return false;
        }
        if entries.is_empty() {
            warn!(workflow_id, agent_type, "No agent history to save");
            return true;
        }
        let key = Self::key(workflow_id, agent_type);
        let payload = match serde_json::to_string(entries) {
            Ok(p) => p,
            Err(e) => {
                error!(key = %key, error = %e, "Failed to serialize agent history");
                return false;
            }
        };
        match self.kv.set_ex(&key, payload, self.ttl_secs).await {
            Ok(()) => {
                debug!(key = %key, entries = entries.len(), "Saved agent history");
                true
            }
            Err(e) => {
                error!(key = %key, error = %e, "Failed to save agent history");
                false
            }
        }
    }
}
