use std::time::Duration;

use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use nexus_core::error::{NexusError, Result};
use nexus_core::traits::Tool;
use nexus_core::types::{ToolContext, ToolResult};

use super::nexus_service::NexusServiceClient;
use super::transport_error;

pub const AUTOMATION_UNAVAILABLE: &str =
    "No, this scheme can't be applied through browser automation.";

pub const RESEARCH_COMPLETE: &str =
    "Research is completed successfully, you can use the rag_query tool to get the information.";

// ── ConfirmSchemeApplyAutomationTool ────────────────────────────

/// Reports whether a scheme can be applied for through browser automation.
/// No scheme currently can.
pub struct ConfirmSchemeApplyAutomationTool;

impl Tool for ConfirmSchemeApplyAutomationTool {
    fn name(&self) -> &str {
        "confirm_scheme_apply_automation"
    }
    fn description(&self) -> &str {
        "Check whether a scheme application can be completed through browser automation."
    }
    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "The scheme and what the farmer wants to do" }
            },
            "required": ["query"]
        })
    }
    fn execute(
        &self,
        _input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move { Ok(ToolResult::success(AUTOMATION_UNAVAILABLE)) })
    }
}

// ── ResearchGovSchemesTool ──────────────────────────────────────

/// Researches schemes for a farmer's problem, then loads the report into the
/// workflow's RAG collection so `rag_query` can answer from it.
pub struct ResearchGovSchemesTool {
    service: NexusServiceClient,
    ingest_delay: Duration,
}

impl ResearchGovSchemesTool {
    pub fn new(service: NexusServiceClient, ingest_delay: Duration) -> Self {
        Self {
            service,
            ingest_delay,
        }
    }
}

#[derive(Deserialize)]
struct ResearchInput {
    problem: String,
    #[serde(default)]
    workflow_id: Option<String>,
}

impl Tool for ResearchGovSchemesTool {
    fn name(&self) -> &str {
        "research_gov_schemes"
    }
    fn description(&self) -> &str {
        "Research government schemes for the farmer's specific problem. After it completes, \
         use rag_query to read the findings."
    }
    fn timeout_secs(&self) -> u64 {
        300
    }
    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "problem": { "type": "string", "description": "The farmer's problem description" },
                "workflow_id": { "type": "string", "description": "Workflow id (defaults to the current workflow)" }
            },
            "required": ["problem"]
        })
    }
    fn execute(
        &self,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let params: ResearchInput = serde_json::from_value(input)
                .map_err(|e| NexusError::ToolValidation(e.to_string()))?;
            let workflow_id = params
                .workflow_id
                .filter(|w| !w.trim().is_empty())
                .unwrap_or(ctx.workflow_id);

            let report = match self.service.scheme_research(&workflow_id, &params.problem).await {
                Ok(report) => report,
                Err(e) => {
                    warn!(%workflow_id, error = %e, "Scheme research failed");
                    return Ok(transport_error("research_scheme", e));
                }
            };

            if let Err(e) = self.service.add_data(&workflow_id, &report).await {
                warn!(%workflow_id, error = %e, "Storing research report failed");
                return Ok(transport_error("add_data", e));
            }

            // Give the RAG service time to index the report.
            tokio::time::sleep(self.ingest_delay).await;
            info!(%workflow_id, "Scheme research stored");
            Ok(ToolResult::success(RESEARCH_COMPLETE))
        })
    }
}
