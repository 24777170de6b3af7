use nexus_core::state::AgentName;

use crate::prompts;

/// Static description of a domain agent: what it is told, which tools it
/// may call and how its node behaves around the model call.
#[derive(Debug, Clone)]
pub struct AgentDefinition {
    pub agent: AgentName,
    pub display_name: String,
    pub system_prompt: String,
    /// Tool names, or prefixes ending in `*`.
    pub tools: Vec<String>,
    /// Prefix the prompt with a `# Workflow ID` section.
    pub include_workflow_id: bool,
    /// Canned reply when the turn has no user input.
    pub empty_input_reply: String,
}

impl AgentDefinition {
    pub fn for_agent(agent: AgentName) -> Self {
        match agent {
            AgentName::MarketPriceAgent => Self::market_price(),
            AgentName::GovSchemeAgent => Self::gov_scheme(),
        }
    }

    pub fn market_price() -> Self {
        Self {
            agent: AgentName::MarketPriceAgent,
            display_name: "Market Price Agent".into(),
            system_prompt: prompts::MARKET_PRICE_AGENT.into(),
            tools: tool_list(&[
                "get_date",
                "get_time",
                "get_market_price",
                "web_search",
                "mcp__calculator__*",
            ]),
            include_workflow_id: false,
            empty_input_reply: prompts::MARKET_PRICE_EMPTY_INPUT.into(),
        }
    }

    pub fn gov_scheme() -> Self {
        Self {
            agent: AgentName::GovSchemeAgent,
            display_name: "Government Scheme Agent".into(),
            system_prompt: prompts::GOV_SCHEME_AGENT.into(),
            tools: tool_list(&[
                "get_date",
                "get_time",
                "web_search",
                "web_scraper",
                "rag_query",
                "confirm_scheme_apply_automation",
                "research_gov_schemes",
                "apply_scheme",
            ]),
            include_workflow_id: true,
            empty_input_reply: prompts::GOV_SCHEME_EMPTY_INPUT.into(),
        }
    }
}

fn tool_list(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}
