use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use tracing::{debug, info, warn};

use nexus_core::error::{NexusError, Result};
use nexus_core::event::EventBus;
use nexus_core::state::{WorkflowState, END};
use nexus_core::types::AgentEvent;

use super::edge::Edge;
use super::node::GraphNode;

/// How many times one node may run in a single walk.
const MAX_VISITS: usize = 5;

/// Result of walking a graph.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub state: WorkflowState,
    /// Node ids in execution order.
    pub visited: Vec<String>,
    pub total_elapsed_ms: u64,
}

/// Executes a directed graph of nodes over a [`WorkflowState`].
pub struct StateGraph {
    id: String,
    entry: String,
    nodes: HashMap<String, Arc<dyn GraphNode>>,
    edges: Vec<Edge>,
    events: Option<Arc<EventBus>>,
}

impl StateGraph {
    pub fn new(id: impl Into<String>, entry: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entry: entry.into(),
            nodes: HashMap::new(),
            edges: Vec::new(),
            events: None,
        }
    }

    pub fn add_node(&mut self, node: impl GraphNode) -> &mut Self {
        self.nodes.insert(node.id().to_string(), Arc::new(node));
        self
    }

    pub fn add_edge(&mut self, edge: Edge) -> &mut Self {
        self.edges.push(edge);
        self
    }

    /// Publish a `NodeEntered` event for every node run.
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Walk the graph from the entry node.
    pub async fn execute(&self, initial: WorkflowState) -> Result<ExecutionResult> {
        let start = Instant::now();
        let mut state = initial;
        let mut visited: Vec<String> = Vec::new();
        let mut current = self.entry.clone();

        loop {
            if current == END {
                break;
            }
            if visited.iter().filter(|id| **id == current).count() >= MAX_VISITS {
                warn!(
                    graph = %self.id,
                    node_id = %current,
                    "Node visited more than {} times, terminating graph", MAX_VISITS
                );
                break;
            }

            let node = self.nodes.get(&current).ok_or_else(|| {
                NexusError::Graph(format!(
                    "Node '{}' not found in graph '{}'",
                    current, self.id
                ))
            })?;

            debug!(graph = %self.id, node_id = %current, "Executing graph node");
            if let Some(events) = &self.events {
                events.publish(AgentEvent::NodeEntered {
                    workflow_id: state.workflow_id.clone(),
                    node: current.clone(),
                });
            }
            visited.push(current.clone());
            state = node.run(state).await?;

            let context = state.context();
            let next = self
                .edges
                .iter()
                .filter(|e| e.from == current)
                .find(|e| e.matches(&context))
                .map(|e| e.to.clone());

            match next {
                Some(next) => current = next,
                None => {
                    debug!(graph = %self.id, node_id = %current, "No edge matched, graph complete");
                    break;
                }
            }
        }

        let total_elapsed_ms = start.elapsed().as_millis() as u64;
        info!(graph = %self.id, visited = ?visited, total_elapsed_ms, "Graph execution complete");
        Ok(ExecutionResult {
            state,
            visited,
            total_elapsed_ms,
        })
    }
}

impl GraphNode for StateGraph {
    fn id(&self) -> &str {
        &self.id
    }

    fn run(&self, state: WorkflowState) -> BoxFuture<'_, Result<WorkflowState>> {
        Box::pin(async move { Ok(self.execute(state).await?.state) })
    }
}
