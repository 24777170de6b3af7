use std::sync::Arc;

use tracing::{debug, error, warn};

use nexus_core::output::AgentOutput;
use nexus_core::state::{RoutingRecord, WorkflowStatus};
use nexus_core::traits::KvStore;

const FINAL_OUTPUT: &str = "final_output";
const ROUTING_STATE: &str = "routing_state";
const SUB_AGENT: &str = "sub_agent";
const WORKFLOW_NAME: &str = "workflow_name";
const STATUS: &str = "status";

/// Checkpoint keys kept per workflow under `workflow:<id>:<field>`.
///
/// Saves report success as a bool. Loads never fail: a missing key, an
/// unreadable value or a backend error returns the field's default.
#[derive(Clone)]
pub struct WorkflowStateStore {
    kv: Arc<dyn KvStore>,
    ttl_secs: u64,
}

impl WorkflowStateStore {
    pub fn new(kv: Arc<dyn KvStore>, ttl_secs: u64) -> Self {
        Self { kv, ttl_secs }
    }

    pub fn key(workflow_id: &str, field: &str) -> String {
        format!("workflow:{workflow_id}:{field}")
    }

    pub async fn save_final_output(&self, workflow_id: &str, output: &AgentOutput) -> bool {
        match serde_json::to_string(output) {
            Ok(json) => self.save_raw(workflow_id, FINAL_OUTPUT, json).await,
            Err(e) => {
                warn!(workflow_id, error = %e, "Failed to serialize final output");
                false
            }
        }
    }

    pub async fn load_final_output(&self, workflow_id: &str) -> Option<AgentOutput> {
        let raw = self.load_raw(workflow_id, FINAL_OUTPUT).await?;
        serde_json::from_str(&raw)
            .map_err(|e| warn!(workflow_id, error = %e, "Stored final output is not valid"))
            .ok()
    }

    pub async fn save_routing_state(&self, workflow_id: &str, routing: &RoutingRecord) -> bool {
        match serde_json::to_string(routing) {
            Ok(json) => self.save_raw(workflow_id, ROUTING_STATE, json).await,
            Err(e) => {
                warn!(workflow_id, error = %e, "Failed to serialize routing state");
                false
            }
        }
    }

    pub async fn load_routing_state(&self, workflow_id: &str) -> RoutingRecord {
        self.load_raw(workflow_id, ROUTING_STATE)
            .await
            .and_then(|raw| {
                serde_json::from_str(&raw)
                    .map_err(|e| warn!(workflow_id, error = %e, "Stored routing state is not valid"))
                    .ok()
            })
            .unwrap_or_default()
    }

    pub async fn save_sub_agent(&self, workflow_id: &str, sub_agent: &str) -> bool {
        self.save_raw(workflow_id, SUB_AGENT, sub_agent.to_string())
            .await
    }

    pub async fn load_sub_agent(&self, workflow_id: &str) -> String {
        self.load_raw(workflow_id, SUB_AGENT)
            .await
            .unwrap_or_default()
    }

    pub async fn save_workflow_name(&self, workflow_id: &str, name: &str) -> bool {
        self.save_raw(workflow_id, WORKFLOW_NAME, name.to_string())
            .await
    }

    pub async fn load_workflow_name(&self, workflow_id: &str) -> String {
        self.load_raw(workflow_id, WORKFLOW_NAME)
            .await
            .unwrap_or_default()
    }

    pub async fn save_status(&self, workflow_id: &str, status: WorkflowStatus) -> bool {
        self.save_raw(workflow_id, STATUS, status.as_str().to_string())
            .await
    }

    pub async fn load_status(&self, workflow_id: &str) -> WorkflowStatus {
        self.load_raw(workflow_id, STATUS)
            .await
            .and_then(|raw| WorkflowStatus::parse(&raw))
            .unwrap_or_default()
    }

    async fn save_raw(&self, workflow_id: &str, field: &str, value: String) -> bool {
        if workflow_id.is_empty() {
            error!(field, "Refusing to save workflow state without a workflow id");
            return false;
        }
        let key = Self::key(workflow_id, field);
        match self.kv.set_ex(&key, value, self.ttl_secs).await {
            Ok(()) => {
                debug!(key = %key, "Saved workflow state");
                true
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to save workflow state");
                false
            }
        }
    }

    async fn load_raw(&self, workflow_id: &str, field: &str) -> Option<String> {
        if workflow_id.is_empty() {
            error!(field, "Cannot load workflow state without a workflow id");
            return None;
        }
        let key = Self::key(workflow_id, field);
        match self.kv.get(&key).await {
            Ok(Some(raw)) => {
                if let Err(e) = self.kv.expire(&key, self.ttl_secs).await {
                    warn!(key = %key, error = %e, "Failed to refresh workflow state TTL");
                }
                Some(raw)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to load workflow state");
                None
            }
        }
    }
}
