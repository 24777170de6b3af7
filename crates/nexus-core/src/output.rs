//! Structured answers produced by the domain agents.
//!
//! Every payload rejects unknown fields so that a model answer drifting
//! from the schema fails at deserialization instead of leaking through.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Output of one agent turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "agent", content = "output", rename_all = "snake_case")]
pub enum AgentOutput {
    MarketPrice(MarketPriceAgentOutput),
    GovScheme(GovSchemeAgentOutput),
    /// Canned payload from a node that did not run an agent.
    Message(String),
}

impl AgentOutput {
    /// The bare payload, as stored in conversation history.
    pub fn payload(&self) -> serde_json::Value {
        let value = match self {
            Self::MarketPrice(out) => serde_json::to_value(out),
            Self::GovScheme(out) => serde_json::to_value(out),
            Self::Message(msg) => return serde_json::Value::String(msg.clone()),
        };
        value.unwrap_or(serde_json::Value::Null)
    }

    /// Human-readable answer text.
    pub fn full_response(&self) -> &str {
        match self {
            Self::MarketPrice(out) => &out.full_response,
            Self::GovScheme(out) => &out.full_response,
            Self::Message(msg) => msg,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Price quote for a single market.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct MarketInfo {
    pub market_name: String,
    #[serde(default)]
    pub min_price: Option<f64>,
    #[serde(default)]
    pub max_price: Option<f64>,
    #[serde(default)]
    pub avg_price: Option<f64>,
    #[serde(default)]
    pub modal_price: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
}

/// Aggregate over all markets that reported a price.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct PriceSummary {
    #[serde(default)]
    pub overall_min_price: Option<f64>,
    #[serde(default)]
    pub overall_max_price: Option<f64>,
    #[serde(default)]
    pub weighted_avg_price: Option<f64>,
    /// e.g. "2100 - 2450"
    #[serde(default)]
    pub price_range: Option<String>,
    #[serde(default)]
    pub standard_unit: Option<String>,
}

/// One calculator invocation reported back to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct CalculationResult {
    pub calculation_type: String,
    #[serde(default)]
    pub input_parameters: serde_json::Map<String, serde_json::Value>,
    pub result: serde_json::Value,
    #[serde(default)]
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct MarketPriceAgentOutput {
    #[serde(default)]
    pub crop: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub district: Option<String>,
    #[serde(default)]
    pub market: Option<String>,

    /// Legacy single-market minimum, kept as free text.
    #[serde(default)]
    pub min_market_price: Option<String>,
    /// Legacy single-market maximum, kept as free text.
    #[serde(default)]
    pub max_market_price: Option<String>,

    #[serde(default)]
    pub price_summary: Option<PriceSummary>,
    #[serde(default)]
    pub markets_data: Vec<MarketInfo>,

    /// DD-MM-YYYY
    #[serde(default)]
    pub search_date: Option<String>,
    #[serde(default)]
    pub price_date: Option<String>,

    #[serde(default)]
    pub calculation_requested: bool,
    #[serde(default)]
    pub calculation_results: Vec<CalculationResult>,

    #[serde(default = "default_true")]
    pub search_successful: bool,
    #[serde(default)]
    pub data_availability: Option<String>,
    #[serde(default)]
    pub sources: Vec<String>,

    pub full_response: String,

    #[serde(default)]
    pub structured_data_available: bool,
    #[serde(default)]
    pub market_trends: Option<String>,
    #[serde(default)]
    pub seasonal_context: Option<String>,
}

/// How far along an application the agent got.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    #[default]
    NotStarted,
    InfoProvided,
    AwaitingUserDetails,
    Submitted,
    NotPossible,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SchemeInfo {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub eligibility: Vec<String>,
    #[serde(default)]
    pub benefits: Vec<String>,
    #[serde(default)]
    pub required_documents: Vec<String>,
    #[serde(default)]
    pub application_url: Option<String>,
    /// online, offline, csc, ...
    #[serde(default)]
    pub application_mode: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct GovSchemeAgentOutput {
    #[serde(default)]
    pub schemes: Vec<SchemeInfo>,
    #[serde(default)]
    pub automation_feasible: bool,
    #[serde(default)]
    pub application_status: ApplicationStatus,
    #[serde(default)]
    pub required_user_details: Vec<String>,
    #[serde(default)]
    pub next_steps: Vec<String>,
    #[serde(default)]
    pub sources: Vec<String>,
    pub full_response: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn market_output_minimal_payload_fills_defaults() {
        let out: MarketPriceAgentOutput =
            serde_json::from_str(r#"{"full_response": "Onion trades at 1800-2200 Rs/quintal"}"#)
                .unwrap();
        assert!(out.search_successful);
        assert!(!out.calculation_requested);
        assert!(out.markets_data.is_empty());
        assert!(out.price_summary.is_none());
    }

    #[test]
    fn market_output_rejects_unknown_fields() {
        let err = serde_json::from_str::<MarketPriceAgentOutput>(
            r#"{"full_response": "x", "confidence": 0.9}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown field"));
    }

    #[test]
    fn market_output_requires_full_response() {
        assert!(serde_json::from_str::<MarketPriceAgentOutput>(r#"{"crop": "onion"}"#).is_err());
    }

    #[test]
    fn gov_output_parses_nested_schemes() {
        let out: GovSchemeAgentOutput = serde_json::from_value(serde_json::json!({
            "schemes": [{
                "name": "PM-KISAN",
                "eligibility": ["Small and marginal farmers"],
                "application_url": "https://pmkisan.gov.in"
            }],
            "application_status": "info_provided",
            "full_response": "You can apply for PM-KISAN online."
        }))
        .unwrap();
        assert_eq!(out.schemes[0].name, "PM-KISAN");
        assert_eq!(out.application_status, ApplicationStatus::InfoProvided);
        assert!(!out.automation_feasible);
    }

    #[test]
    fn agent_output_is_tagged_by_agent() {
        let output = AgentOutput::Message("No data found!!!".into());
        let value = serde_json::to_value(&output).unwrap();
        assert_eq!(value["agent"], "message");
        assert_eq!(value["output"], "No data found!!!");
        let back: AgentOutput = serde_json::from_value(value).unwrap();
        assert_eq!(back, output);
        assert_eq!(output.payload(), serde_json::json!("No data found!!!"));
    }

    #[test]
    fn output_schema_forbids_additional_properties() {
        let schema = serde_json::to_value(schemars::schema_for!(GovSchemeAgentOutput)).unwrap();
        assert_eq!(schema["additionalProperties"], false);
        assert!(schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .any(|f| f == "full_response"));
    }
}
