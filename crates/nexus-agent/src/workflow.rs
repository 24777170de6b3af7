//! Runs one conversational turn end to end and checkpoints the result.

use std::sync::Arc;

use tracing::{info, warn};

use nexus_core::error::{NexusError, Result};
use nexus_core::event::EventBus;
use nexus_core::output::AgentOutput;
use nexus_core::state::{AgentName, HistoryEntry, RoutingRecord, WorkflowState, WorkflowStatus};
use nexus_core::traits::KvStore;
use nexus_memory::{AgentHistoryStore, WorkflowLocks, WorkflowStateStore};

use crate::definition::AgentDefinition;
use crate::executor::{AgentExecutor, BoundAgent};
use crate::graph::StateGraph;
use crate::router::{build_router_graph, default_agents};
use crate::runtime::AgentRuntime;

/// One user turn.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub workflow_id: String,
    pub user_input: serde_json::Value,
    pub agent_name: Option<AgentName>,
    pub workflow_name: Option<String>,
}

impl TurnRequest {
    pub fn new(
        workflow_id: impl Into<String>,
        user_input: impl Into<serde_json::Value>,
        agent_name: Option<AgentName>,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            user_input: user_input.into(),
            agent_name,
            workflow_name: None,
        }
    }

    pub fn with_workflow_name(mut self, name: impl Into<String>) -> Self {
        self.workflow_name = Some(name.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub state: WorkflowState,
    /// Top-level graph nodes in execution order.
    pub visited: Vec<String>,
    pub status: WorkflowStatus,
}

/// Drives the router graph and keeps the `workflow:<id>:*` keys current.
pub struct WorkflowRunner {
    graph: StateGraph,
    state_store: WorkflowStateStore,
    history: AgentHistoryStore,
    locks: WorkflowLocks,
}

impl WorkflowRunner {
    pub fn new(
        graph: StateGraph,
        state_store: WorkflowStateStore,
        history: AgentHistoryStore,
    ) -> Self {
        Self {
            graph,
            state_store,
            history,
            locks: WorkflowLocks::new(),
        }
    }

    /// Runner with both domain agents bound to `runtime`, persisting to `kv`.
    pub fn with_runtime(runtime: Arc<AgentRuntime>, kv: Arc<dyn KvStore>, ttl_secs: u64) -> Self {
        let events = Arc::clone(runtime.event_bus());
        let agents = default_agents(|definition| {
            Arc::new(BoundAgent::new(Arc::clone(&runtime), definition.clone()))
                as Arc<dyn AgentExecutor>
        });
        Self::with_agents(agents, kv, ttl_secs, Some(events))
    }

    pub fn with_agents(
        agents: Vec<(AgentDefinition, Arc<dyn AgentExecutor>)>,
        kv: Arc<dyn KvStore>,
        ttl_secs: u64,
        events: Option<Arc<EventBus>>,
    ) -> Self {
        let history = AgentHistoryStore::new(Arc::clone(&kv), ttl_secs);
        let state_store = WorkflowStateStore::new(kv, ttl_secs);
        let graph = build_router_graph(agents, history.clone(), events);
        Self::new(graph, state_store, history)
    }

    /// Run one turn. Turns for the same workflow id run one at a time.
    pub async fn run_turn(&self, request: TurnRequest) -> Result<TurnOutcome> {
        let workflow_id = request.workflow_id.trim().to_string();
        if workflow_id.is_empty() {
            return Err(NexusError::InvalidRequest("workflow_id must not be empty".into()));
        }

        let _guard = self.locks.acquire(&workflow_id).await;
        self.state_store
            .save_status(&workflow_id, WorkflowStatus::Processing)
            .await;
        if let Some(name) = request.workflow_name.as_deref().filter(|n| !n.trim().is_empty()) {
            self.state_store.save_workflow_name(&workflow_id, name).await;
        }

        let mut state = WorkflowState::new(&workflow_id, request.user_input, request.agent_name);
        let prior = self.state_store.load_routing_state(&workflow_id).await;
        if !prior.previous_agent.is_empty() {
            state.routing.previous = Some(prior.previous_agent);
        }

        let result = match self.graph.execute(state).await {
            Ok(result) => result,
            Err(e) => {
                self.state_store
                    .save_status(&workflow_id, WorkflowStatus::Failed)
                    .await;
                return Err(e);
            }
        };
        let state = result.state;

        if let Some(output) = state.agent_output() {
            self.state_store.save_final_output(&workflow_id, output).await;
        }
        self.state_store
            .save_routing_state(&workflow_id, &RoutingRecord::from(&state.routing))
            .await;
        if let Some(agent) = state.agent_name {
            if result.visited.iter().any(|n| n == agent.as_str()) {
                self.state_store
                    .save_sub_agent(&workflow_id, agent.as_str())
                    .await;
            }
        }

        let status = if state.agent_input_output.error.is_some() {
            WorkflowStatus::Failed
        } else {
            WorkflowStatus::Completed
        };
        if !self.state_store.save_status(&workflow_id, status).await {
            warn!(workflow_id = %workflow_id, "Failed to record final workflow status");
        }
        info!(
            workflow_id = %workflow_id,
            visited = ?result.visited,
            status = %status,
            elapsed_ms = result.total_elapsed_ms,
            "Turn finished"
        );

        Ok(TurnOutcome {
            state,
            visited: result.visited,
            status,
        })
    }

    pub async fn status(&self, workflow_id: &str) -> WorkflowStatus {
        self.state_store.load_status(workflow_id).await
    }

    pub async fn final_output(&self, workflow_id: &str) -> Option<AgentOutput> {
        self.state_store.load_final_output(workflow_id).await
    }

    pub async fn routing(&self, workflow_id: &str) -> RoutingRecord {
        self.state_store.load_routing_state(workflow_id).await
    }

    pub async fn sub_agent(&self, workflow_id: &str) -> String {
        self.state_store.load_sub_agent(workflow_id).await
    }

    pub async fn workflow_name(&self, workflow_id: &str) -> String {
        self.state_store.load_workflow_name(workflow_id).await
    }

    pub async fn history(&self, workflow_id: &str, agent: AgentName) -> Vec<HistoryEntry> {
        self.history.load(workflow_id, agent.as_str()).await
    }
}
