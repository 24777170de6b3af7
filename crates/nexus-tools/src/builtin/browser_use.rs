use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::info;

use nexus_core::error::{NexusError, Result};
use nexus_core::traits::Tool;
use nexus_core::types::{ToolContext, ToolResult};

pub const APPLY_SCHEME_REPLY: &str =
    "Sorry, I am not able to apply the scheme, since it has a bit complex process to automate.";

/// Browser-automation entry point for scheme applications.
///
/// No automation backend is wired in; the tool validates its input and
/// always declines, so the agent falls back to giving manual instructions.
pub struct ApplySchemeTool;

#[derive(Deserialize)]
struct ApplySchemeInput {
    query: String,
    url: String,
}

impl Tool for ApplySchemeTool {
    fn name(&self) -> &str {
        "apply_scheme"
    }
    fn description(&self) -> &str {
        "Apply for a government scheme on the farmer's behalf through browser automation, \
         given the request and the scheme's application URL."
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "What to apply for, with the farmer's details" },
                "url": { "type": "string", "description": "Application page URL" }
            },
            "required": ["query", "url"]
        })
    }
    fn execute(
        &self,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let params: ApplySchemeInput = serde_json::from_value(input)
                .map_err(|e| NexusError::ToolValidation(e.to_string()))?;
            info!(workflow_id = %ctx.workflow_id, url = %params.url, query_len = params.query.len(), "Scheme application requested");
            Ok(ToolResult::success(APPLY_SCHEME_REPLY))
        })
    }
}
