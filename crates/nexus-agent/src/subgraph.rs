//! One graph per domain agent: load history, call the agent, save history.

use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{error, info, warn};

use nexus_core::error::Result;
use nexus_core::event::EventBus;
use nexus_core::output::AgentOutput;
use nexus_core::state::{HistoryEntry, WorkflowState, END};
use nexus_core::types::AgentEvent;
use nexus_memory::AgentHistoryStore;

use crate::definition::AgentDefinition;
use crate::executor::AgentExecutor;
use crate::graph::{Edge, GraphNode, StateGraph};

pub const AGENT_NODE: &str = "agent_node";

/// Build the prompt the agent sees for one turn.
pub fn compose_prompt(
    definition: &AgentDefinition,
    workflow_id: &str,
    history: &[HistoryEntry],
    user_input: &str,
) -> String {
    let history_json = serde_json::to_string(history).unwrap_or_else(|_| "[]".to_string());
    let mut prompt = String::new();
    if definition.include_workflow_id {
        prompt.push_str(&format!("# Workflow ID\n{workflow_id}\n\n"));
    }
    prompt.push_str(&format!(
        "# Conversation History\n{history_json}\n\n# User Input\n{user_input}\n"
    ));
    prompt
}

/// The node that runs a domain agent for the current turn.
pub struct AgentNode {
    definition: AgentDefinition,
    history: AgentHistoryStore,
    executor: Arc<dyn AgentExecutor>,
    events: Option<Arc<EventBus>>,
}

impl AgentNode {
    pub fn new(
        definition: AgentDefinition,
        history: AgentHistoryStore,
        executor: Arc<dyn AgentExecutor>,
    ) -> Self {
        Self {
            definition,
            history,
            executor,
            events: None,
        }
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    async fn turn(&self, mut state: WorkflowState) -> WorkflowState {
        let agent = self.definition.agent.as_str();
        let workflow_id = state.workflow_id.clone();
        let mut history = self.history.load(&workflow_id, agent).await;

        state.routing.previous = Some(agent.to_string());
        state.routing.next = Some(END.to_string());

        let Some(user_input) = state.user_input_text() else {
            info!(agent, workflow_id = %workflow_id, "No user input, skipping agent");
            state.agent_input_output.agent_output =
                Some(AgentOutput::Message(self.definition.empty_input_reply.clone()));
            return state;
        };

        let prompt = compose_prompt(&self.definition, &workflow_id, &history, &user_input);

        let output = match self.executor.execute(&workflow_id, prompt).await {
            Ok(output) => output,
            Err(e) => {
                error!(agent, workflow_id = %workflow_id, error = %e, "Agent failed");
                state.agent_input_output.agent_output = Some(AgentOutput::Message(format!(
                    "Sorry, the {} could not answer this request: {}",
                    self.definition.display_name, e
                )));
                state.agent_input_output.error = Some(e.to_string());
                return state;
            }
        };

        history.push(HistoryEntry {
            user_input,
            agent_response: output.payload(),
        });
        let persisted = self.history.save(&workflow_id, agent, &history).await;
        if !persisted {
            warn!(agent, workflow_id = %workflow_id, "History not persisted for this turn");
        }
        if let Some(events) = &self.events {
            events.publish(AgentEvent::HistorySaved {
                workflow_id: workflow_id.clone(),
                agent: agent.to_string(),
                persisted,
            });
        }

        state.agent_input_output.history_persisted = Some(persisted);
        state.agent_input_output.agent_output = Some(output);
        state
    }
}

impl GraphNode for AgentNode {
    fn id(&self) -> &str {
        AGENT_NODE
    }

    fn run(&self, state: WorkflowState) -> BoxFuture<'_, Result<WorkflowState>> {
        Box::pin(async move { Ok(self.turn(state).await) })
    }
}

/// `agent_node -> END`, named after the agent so the router can target it.
pub fn agent_subgraph(
    definition: AgentDefinition,
    history: AgentHistoryStore,
    executor: Arc<dyn AgentExecutor>,
    events: Option<Arc<EventBus>>,
) -> StateGraph {
    let mut graph = StateGraph::new(definition.agent.as_str(), AGENT_NODE);
    let mut node = AgentNode::new(definition, history, executor);
    if let Some(events) = events {
        node = node.with_events(events);
    }
    graph.add_node(node).add_edge(Edge::always(AGENT_NODE, END));
    graph
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_core::error::NexusError;
    use nexus_core::output::GovSchemeAgentOutput;
    use nexus_core::state::AgentName;
    use nexus_memory::MemoryStore;
    use std::sync::Mutex;

    struct Scripted {
        prompts: Mutex<Vec<String>>,
        fail: bool,
    }

    impl Scripted {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                prompts: Mutex::new(Vec::new()),
                fail,
            })
        }
    }

    impl AgentExecutor for Scripted {
        fn execute(
            &self,
            _workflow_id: &str,
            prompt: String,
        ) -> BoxFuture<'_, Result<AgentOutput>> {
            self.prompts.lock().unwrap().push(prompt);
            let fail = self.fail;
            Box::pin(async move {
                if fail {
                    return Err(NexusError::LlmRequest("HTTP 503".into()));
                }
                Ok(AgentOutput::GovScheme(GovSchemeAgentOutput {
                    schemes: Vec::new(),
                    automation_feasible: false,
                    application_status: Default::default(),
                    required_user_details: Vec::new(),
                    next_steps: Vec::new(),
                    sources: Vec::new(),
                    full_response: "PM-KISAN pays 6000 per year.".into(),
                }))
            })
        }
    }

    fn store() -> AgentHistoryStore {
        AgentHistoryStore::new(Arc::new(MemoryStore::new()), 60)
    }

    #[test]
    fn prompt_sections_follow_definition() {
        let history = vec![HistoryEntry {
            user_input: "hi".into(),
            agent_response: serde_json::json!("hello"),
        }];
        let gov = compose_prompt(&AgentDefinition::gov_scheme(), "wf-3", &history, "PM-KISAN?");
        assert!(gov.starts_with("# Workflow ID\nwf-3\n"));
        assert!(gov.contains(r#"[{"user_input":"hi","agent_response":"hello"}]"#));
        assert!(gov.ends_with("# User Input\nPM-KISAN?\n"));

        let market = compose_prompt(&AgentDefinition::market_price(), "wf-3", &[], "onion");
        assert!(market.starts_with("# Conversation History\n[]"));
        assert!(!market.contains("wf-3"));
    }

    #[tokio::test]
    async fn second_turn_sees_first_in_history() {
        let history = store();
        let exec = Scripted::new(false);
        let node = AgentNode::new(AgentDefinition::gov_scheme(), history.clone(), exec.clone());

        node.run(WorkflowState::new("wf", "first question", Some(AgentName::GovSchemeAgent)))
            .await
            .unwrap();
        let state = node
            .run(WorkflowState::new("wf", "second question", Some(AgentName::GovSchemeAgent)))
            .await
            .unwrap();

        let entries = history.load("wf", "gov_scheme_agent").await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].user_input, "first question");
        assert!(exec.prompts.lock().unwrap()[1].contains("first question"));
        assert_eq!(state.agent_input_output.history_persisted, Some(true));
        assert_eq!(state.routing.previous.as_deref(), Some("gov_scheme_agent"));
        assert_eq!(state.routing.next.as_deref(), Some(END));
    }

    #[tokio::test]
    async fn failure_degrades_without_touching_history() {
        let history = store();
        let node = AgentNode::new(
            AgentDefinition::gov_scheme(),
            history.clone(),
            Scripted::new(true),
        );
        let state = node
            .run(WorkflowState::new("wf", "question", Some(AgentName::GovSchemeAgent)))
            .await
            .unwrap();

        let output = state.agent_output().unwrap();
        assert!(matches!(output, AgentOutput::Message(m) if m.starts_with("Sorry") && m.contains("503")));
        assert!(state.agent_input_output.error.is_some());
        assert!(history.load("wf", "gov_scheme_agent").await.is_empty());
    }

    #[tokio::test]
    async fn unsaved_history_is_reported() {
        let kv = Arc::new(MemoryStore::new());
        kv.set_failing(true);
        let node = AgentNode::new(
            AgentDefinition::gov_scheme(),
            AgentHistoryStore::new(kv, 60),
            Scripted::new(false),
        );
        let state = node
            .run(WorkflowState::new("wf", "question", None))
            .await
            .unwrap();
        assert_eq!(state.agent_input_output.history_persisted, Some(false));
        assert!(matches!(state.agent_output(), Some(AgentOutput::GovScheme(_))));
    }
}
