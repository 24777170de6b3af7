//! Top-level graph: one router node dispatching to the agent subgraphs.

use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{info, warn};

use nexus_core::error::Result;
use nexus_core::event::EventBus;
use nexus_core::state::{AgentName, WorkflowState};
use nexus_memory::AgentHistoryStore;

use crate::definition::AgentDefinition;
use crate::executor::AgentExecutor;
use crate::graph::{Edge, GraphNode, StateGraph};
use crate::subgraph::agent_subgraph;

pub const ROUTER_NODE: &str = "agent_router";
pub const ROUTER_GRAPH: &str = "nexus_router";

/// Passes state through; routing happens on its outgoing edges.
pub struct RouterNode;

impl GraphNode for RouterNode {
    fn id(&self) -> &str {
        ROUTER_NODE
    }

    fn run(&self, state: WorkflowState) -> BoxFuture<'_, Result<WorkflowState>> {
        Box::pin(async move {
            match state.agent_name {
                Some(agent) => info!(workflow_id = %state.workflow_id, agent = %agent, "Routing turn"),
                None => warn!(workflow_id = %state.workflow_id, "No known agent name, nothing to route to"),
            }
            Ok(state)
        })
    }
}

/// Build the router graph with one subgraph per agent in `agents`.
pub fn build_router_graph(
    agents: Vec<(AgentDefinition, Arc<dyn AgentExecutor>)>,
    history: AgentHistoryStore,
    events: Option<Arc<EventBus>>,
) -> StateGraph {
    let mut graph = StateGraph::new(ROUTER_GRAPH, ROUTER_NODE);
    graph.add_node(RouterNode);

    for (definition, executor) in agents {
        let target = definition.agent.as_str();
        graph.add_edge(Edge::conditional(
            ROUTER_NODE,
            target,
            format!("agent_name == \"{target}\""),
        ));
        graph.add_node(agent_subgraph(
            definition,
            history.clone(),
            executor,
            events.clone(),
        ));
    }

    match events {
        Some(events) => graph.with_events(events),
        None => graph,
    }
}

/// Both domain agents, each bound to `executor_for(agent)`.
pub fn default_agents(
    executor_for: impl Fn(&AgentDefinition) -> Arc<dyn AgentExecutor>,
) -> Vec<(AgentDefinition, Arc<dyn AgentExecutor>)> {
    AgentName::ALL
        .into_iter()
        .map(|agent| {
            let definition = AgentDefinition::for_agent(agent);
            let executor = executor_for(&definition);
            (definition, executor)
        })
        .collect()
}
