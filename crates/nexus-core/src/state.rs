//! Workflow state carried through the router graph, plus the records that
//! are persisted between turns.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::output::AgentOutput;

/// Terminal sentinel node id.
pub const END: &str = "__end__";

/// The domain agents a turn can be routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentName {
    MarketPriceAgent,
    GovSchemeAgent,
}

impl AgentName {
    pub const ALL: [AgentName; 2] = [AgentName::MarketPriceAgent, AgentName::GovSchemeAgent];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MarketPriceAgent => "market_price_agent",
            Self::GovSchemeAgent => "gov_scheme_agent",
        }
    }

    /// Recognize an agent name. Anything else routes nowhere.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.as_str() == s.trim())
    }
}

impl fmt::Display for AgentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| {
            format!(
                "unknown agent '{s}' (expected one of: {})",
                Self::ALL.map(|a| a.as_str()).join(", ")
            )
        })
    }
}

fn lenient_agent_name<'de, D>(deserializer: D) -> Result<Option<AgentName>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(AgentName::parse))
}

/// Where the graph goes next and where it came from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Routing {
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentInputOutput {
    /// Opaque payload supplied by the caller.
    #[serde(default)]
    pub user_input: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_output: Option<AgentOutput>,
    /// Whether the agent subgraph managed to save history this turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_persisted: Option<bool>,
    /// Set when the agent failed and the output is a degraded message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// State of one turn as it moves through the graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub workflow_id: String,
    #[serde(default, deserialize_with = "lenient_agent_name")]
    pub agent_name: Option<AgentName>,
    #[serde(default)]
    pub routing: Routing,
    #[serde(default)]
    pub agent_input_output: AgentInputOutput,
}

impl WorkflowState {
    pub fn new(
        workflow_id: impl Into<String>,
        user_input: impl Into<serde_json::Value>,
        agent_name: Option<AgentName>,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            agent_name,
            routing: Routing::default(),
            agent_input_output: AgentInputOutput {
                user_input: user_input.into(),
                ..Default::default()
            },
        }
    }

    /// The user input as prompt text. `None` for null, empty or blank input.
    pub fn user_input_text(&self) -> Option<String> {
        match &self.agent_input_output.user_input {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) if s.trim().is_empty() => None,
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    pub fn agent_output(&self) -> Option<&AgentOutput> {
        self.agent_input_output.agent_output.as_ref()
    }

    /// Flat view used when evaluating edge conditions.
    pub fn context(&self) -> HashMap<String, serde_json::Value> {
        let opt = |v: Option<&str>| {
            v.map(|s| serde_json::Value::String(s.to_string()))
                .unwrap_or(serde_json::Value::Null)
        };
        let mut ctx = HashMap::new();
        ctx.insert(
            "workflow_id".to_string(),
            serde_json::Value::String(self.workflow_id.clone()),
        );
        ctx.insert(
            "agent_name".to_string(),
            opt(self.agent_name.map(|a| a.as_str())),
        );
        ctx.insert("routing_next".to_string(), opt(self.routing.next.as_deref()));
        ctx.insert(
            "routing_previous".to_string(),
            opt(self.routing.previous.as_deref()),
        );
        ctx
    }
}

/// One persisted exchange in an agent's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub user_input: String,
    pub agent_response: serde_json::Value,
}

/// Routing as stored under `workflow:<id>:routing_state`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingRecord {
    #[serde(default)]
    pub next_agent: String,
    #[serde(default)]
    pub previous_agent: String,
}

impl From<&Routing> for RoutingRecord {
    fn from(routing: &Routing) -> Self {
        Self {
            next_agent: routing.next.clone().unwrap_or_default(),
            previous_agent: routing.previous.clone().unwrap_or_default(),
        }
    }
}

/// Lifecycle status of a workflow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStatus {
    #[default]
    Processing,
    Completed,
    Failed,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "PROCESSING" => Some(Self::Processing),
            "COMPLETED" => Some(Self::Completed),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_name_round_trips_through_str() {
        for agent in AgentName::ALL {
            assert_eq!(AgentName::parse(agent.as_str()), Some(agent));
            assert_eq!(agent.as_str().parse::<AgentName>().unwrap(), agent);
        }
        assert_eq!(AgentName::parse("weather_agent"), None);
        assert!("weather_agent".parse::<AgentName>().is_err());
    }

    #[test]
    fn unknown_agent_name_deserializes_to_none() {
        let state: WorkflowState = serde_json::from_value(serde_json::json!({
            "workflow_id": "wf-1",
            "agent_name": "weather_agent",
        }))
        .unwrap();
        assert_eq!(state.agent_name, None);

        let state: WorkflowState = serde_json::from_value(serde_json::json!({
            "workflow_id": "wf-1",
            "agent_name": "gov_scheme_agent",
        }))
        .unwrap();
        assert_eq!(state.agent_name, Some(AgentName::GovSchemeAgent));
    }

    #[test]
    fn blank_user_input_has_no_text() {
        assert!(WorkflowState::new("wf", serde_json::Value::Null, None)
            .user_input_text()
            .is_none());
        assert!(WorkflowState::new("wf", "   ", None).user_input_text().is_none());
        assert_eq!(
            WorkflowState::new("wf", "onion price in Nashik", None).user_input_text(),
            Some("onion price in Nashik".to_string())
        );
        let structured = WorkflowState::new("wf", serde_json::json!({"crop": "wheat"}), None);
        assert_eq!(structured.user_input_text().unwrap(), r#"{"crop":"wheat"}"#);
    }

    #[test]
    fn context_exposes_routing_keys() {
        let mut state = WorkflowState::new("wf-9", "hi", Some(AgentName::MarketPriceAgent));
        state.routing.previous = Some("gov_scheme_agent".into());
        let ctx = state.context();
        assert_eq!(ctx["agent_name"], "market_price_agent");
        assert_eq!(ctx["routing_previous"], "gov_scheme_agent");
        assert!(ctx["routing_next"].is_null());
    }

    #[test]
    fn status_parses_known_values_only() {
        assert_eq!(WorkflowStatus::parse("COMPLETED"), Some(WorkflowStatus::Completed));
        assert_eq!(WorkflowStatus::parse("done"), None);
        assert_eq!(WorkflowStatus::default().as_str(), "PROCESSING");
    }

    #[test]
    fn routing_record_uses_empty_strings_for_missing_hops() {
        let record = RoutingRecord::from(&Routing {
            next: Some(END.into()),
            previous: None,
        });
        assert_eq!(record.next_agent, END);
        assert_eq!(record.previous_agent, "");
    }
}
