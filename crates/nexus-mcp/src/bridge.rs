//! Exposes the tools of connected MCP servers to agents as ordinary registry
//! tools named `mcp__<server>__<tool>`, e.g. `mcp__calculator__percentage`.

use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, warn};

use rmcp::model::Tool as McpTool;

use nexus_core::error::Result;
use nexus_core::traits::Tool;
use nexus_core::types::{ToolContext, ToolResult};
use nexus_tools::ToolRegistry;

use crate::McpClientManager;

const PREFIX: &str = "mcp__";
const SEPARATOR: &str = "__";

/// A registry name split into the serving server and its tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgedName {
    pub server: String,
    pub tool: String,
}

impl BridgedName {
    pub fn new(server: &str, tool: &str) -> Self {
        Self {
            server: server.to_string(),
            tool: tool.to_string(),
        }
    }

    /// Split a registry name. Server names never contain `__`; tool names may.
    pub fn parse(name: &str) -> Option<Self> {
        let rest = name.strip_prefix(PREFIX)?;
        let (server, tool) = rest.split_once(SEPARATOR)?;
        if server.is_empty() || tool.is_empty() {
            return None;
        }
        Some(Self::new(server, tool))
    }

    pub fn registry_name(&self) -> String {
        format!("{PREFIX}{}{SEPARATOR}{}", self.server, self.tool)
    }
}

/// Registry name for a tool served by an MCP server.
pub fn bridged_name(server: &str, tool: &str) -> String {
    BridgedName::new(server, tool).registry_name()
}

/// A registry tool whose calls are answered by an MCP server.
struct RemoteTool {
    name: BridgedName,
    registry_name: String,
    description: String,
    schema: serde_json::Value,
    manager: Arc<McpClientManager>,
    timeout_secs: u64,
}

impl RemoteTool {
    fn from_listing(
        server: &str,
        tool: &McpTool,
        manager: &Arc<McpClientManager>,
        timeout_secs: u64,
    ) -> Self {
        let name = BridgedName::new(server, &tool.name);
        let description = match tool.description.as_deref() {
            Some(d) if !d.trim().is_empty() => d.to_string(),
            _ => format!("{} (served by the {} MCP server)", tool.name, server),
        };
        let schema = serde_json::Value::Object((*tool.input_schema).clone());
        Self {
            registry_name: name.registry_name(),
            name,
            description,
            schema,
            manager: manager.clone(),
            timeout_secs,
        }
    }
}

/// MCP tools take named arguments only. Null means no arguments.
fn arguments(
    input: serde_json::Value,
) -> std::result::Result<Option<serde_json::Map<String, serde_json::Value>>, String> {
    match input {
        serde_json::Value::Object(map) => Ok(Some(map)),
        serde_json::Value::Null => Ok(None),
        other => Err(format!(
            "invalid_argument: expected an object of named arguments, got {other}"
        )),
    }
}

impl Tool for RemoteTool {
    fn name(&self) -> &str {
        &self.registry_name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> serde_json::Value {
        self.schema.clone()
    }

    fn execute(
        &self,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let args = match arguments(input) {
                Ok(args) => args,
                Err(message) => return Ok(ToolResult::error(message)),
            };
            debug!(
                workflow_id = %ctx.workflow_id,
                server = %self.name.server,
                tool = %self.name.tool,
                "Calling MCP tool"
            );
            match self
                .manager
                .call_tool(&self.name.server, &self.name.tool, args)
                .await
            {
                Ok(result) if result.content.trim().is_empty() && !result.is_error => Ok(
                    ToolResult::error(format!("{} returned no content", self.registry_name)),
                ),
                Ok(result) => Ok(result),
                // The model sees an unavailable server like any failed call.
                Err(e) => {
                    warn!(server = %self.name.server, error = %e, "MCP tool call failed");
                    Ok(ToolResult::error(format!("mcp_unavailable: {e}")))
                }
            }
        })
    }

    fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }
}

/// Replace every registry tool of `server` with the given listing. Returns
/// the number of stale tools removed.
pub fn replace_server_tools(
    registry: &mut ToolRegistry,
    manager: &Arc<McpClientManager>,
    server: &str,
    listing: &[McpTool],
    timeout_secs: u64,
) -> usize {
    let stale: Vec<String> = registry
        .list()
        .into_iter()
        .filter(|name| BridgedName::parse(name).is_some_and(|n| n.server == server))
        .map(str::to_string)
        .collect();
    for name in &stale {
        registry.unregister(name);
    }

    for tool in listing {
        registry.register(RemoteTool::from_listing(server, tool, manager, timeout_secs));
    }
    stale.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_split_on_the_first_separator() {
        let name = BridgedName::parse("mcp__calculator__price_range_analysis_five").unwrap();
        assert_eq!(name.server, "calculator");
        assert_eq!(name.tool, "price_range_analysis_five");

        let nested = BridgedName::parse("mcp__calculator__odd__name").unwrap();
        assert_eq!(nested.tool, "odd__name");
        assert_eq!(nested.registry_name(), "mcp__calculator__odd__name");
    }

    #[test]
    fn builtin_names_are_not_bridged() {
        assert_eq!(BridgedName::parse("web_search"), None);
        assert_eq!(BridgedName::parse("mcp__calculator"), None);
        assert_eq!(BridgedName::parse("mcp____add"), None);
    }

    #[test]
    fn positional_arguments_are_rejected() {
        assert_eq!(arguments(serde_json::Value::Null).unwrap(), None);
        assert!(arguments(serde_json::json!({"a": 1})).unwrap().is_some());
        let err = arguments(serde_json::json!([1, 2])).unwrap_err();
        assert!(err.starts_with("invalid_argument: "));
    }

    fn listing(names: &[&str]) -> Vec<McpTool> {
        names
            .iter()
            .map(|name| {
                serde_json::from_value(serde_json::json!({
                    "name": name,
                    "inputSchema": {"type": "object", "properties": {}}
                }))
                .unwrap()
            })
            .collect()
    }

    #[test]
    fn replacing_only_touches_the_named_server() {
        let manager = Arc::new(McpClientManager::new());
        let mut registry = ToolRegistry::new();
        let calculator = listing(&["add", "divide"]);
        replace_server_tools(&mut registry, &manager, "calculator", &calculator, 30);
        replace_server_tools(&mut registry, &manager, "weather", &listing(&["forecast"]), 30);

        let removed =
            replace_server_tools(&mut registry, &manager, "calculator", &listing(&["add"]), 30);
        assert_eq!(removed, 2);
        assert!(registry.get("mcp__calculator__add").is_some());
        assert!(registry.get("mcp__calculator__divide").is_none());
        assert!(registry.get("mcp__weather__forecast").is_some());
    }

    #[tokio::test]
    async fn disconnected_server_yields_error_result() {
        let manager = Arc::new(McpClientManager::new());
        let mut registry = ToolRegistry::new();
        replace_server_tools(&mut registry, &manager, "calculator", &listing(&["add"]), 30);

        let tool = registry.get("mcp__calculator__add").unwrap();
        let result = tool
            .execute(serde_json::json!({"a": 1, "b": 2}), ToolContext::for_workflow("wf"))
            .await
            .unwrap();
        assert!(result.is_error);
        assert!(result.content.starts_with("mcp_unavailable: "));
        assert_eq!(tool.timeout_secs(), 30);
        assert!(tool.description().contains("calculator"));
    }
}
