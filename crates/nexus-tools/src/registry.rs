use std::collections::BTreeMap;
use std::sync::Arc;

use nexus_core::error::{NexusError, Result};
use nexus_core::traits::Tool;
use nexus_core::types::{ToolContext, ToolDefinition, ToolResult};

/// Registry of available tools.
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Register a tool.
    pub fn register(&mut self, tool: impl Tool) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    /// Register an already shared tool.
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Unregister a tool by name.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.tools.remove(name).is_some()
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// List all registered tools, sorted by name.
    pub fn list(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// Get tool definitions for sending to the LLM.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| definition(t.as_ref())).collect()
    }

    /// Definitions for the tools an agent may use. A pattern ending in `*`
    /// matches every tool with that prefix; names not registered are skipped.
    pub fn definitions_for(&self, allowed: &[String]) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .filter(|(name, _)| is_allowed(name, allowed))
            .map(|(_, t)| definition(t.as_ref()))
            .collect()
    }

    /// Execute a tool by name.
    pub async fn execute(
        &self,
        name: &str,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> Result<ToolResult> {
        let tool = self
            .get(name)
            .ok_or_else(|| NexusError::ToolNotFound(name.to_string()))?;

        let timeout = std::time::Duration::from_secs(tool.timeout_secs());

        match tokio::time::timeout(timeout, tool.execute(input, ctx)).await {
            Ok(result) => result,
            Err(_) => Err(NexusError::ToolTimeout {
                tool: name.to_string(),
                timeout_secs: tool.timeout_secs(),
            }),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn definition(tool: &dyn Tool) -> ToolDefinition {
    ToolDefinition {
        name: tool.name().to_string(),
        description: tool.description().to_string(),
        input_schema: tool.input_schema(),
    }
}

/// Whether `name` is matched by one of the allow-list patterns.
pub fn is_allowed(name: &str, allowed: &[String]) -> bool {
    allowed.iter().any(|pattern| match pattern.strip_suffix('*') {
        Some(prefix) => name.starts_with(prefix),
        None => name == pattern,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use nexus_test_utils::RecordingTool;

    struct SlowTool;

    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "Never finishes in time."
        }
        fn input_schema(&self) -> serde_json::Value {
            serde_json::json!({ "type": "object" })
        }
        fn execute(
            &self,
            _input: serde_json::Value,
            _ctx: ToolContext,
        ) -> BoxFuture<'_, Result<ToolResult>> {
            Box::pin(async {
                tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
                Ok(ToolResult::success("late"))
            })
        }
        fn timeout_secs(&self) -> u64 {
            1
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        for name in ["get_date", "web_search", "mcp__calculator__add", "mcp__calculator__divide"] {
            registry.register(RecordingTool::new(name, ToolResult::success("ok")));
        }
        registry
    }

    #[test]
    fn definitions_for_honours_prefix_patterns() {
        let defs = registry().definitions_for(&[
            "get_date".to_string(),
            "mcp__calculator__*".to_string(),
            "not_registered".to_string(),
        ]);
        let names: Vec<_> = defs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["get_date", "mcp__calculator__add", "mcp__calculator__divide"]
        );
    }

    #[tokio::test]
    async fn execute_unknown_tool_is_not_found() {
        let err = registry()
            .execute("apply_for_loan", serde_json::json!({}), ToolContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, NexusError::ToolNotFound(name) if name == "apply_for_loan"));
    }

    #[tokio::test]
    async fn execute_passes_context_through() {
        let tool = RecordingTool::new("rag_query", ToolResult::success("answer"));
        let mut registry = ToolRegistry::new();
        registry.register(tool.clone());

        let result = registry
            .execute(
                "rag_query",
                serde_json::json!({ "query": "eligibility" }),
                ToolContext::for_workflow("wf-7"),
            )
            .await
            .unwrap();
        assert_eq!(result.content, "answer");
        let calls = tool.calls();
        assert_eq!(calls[0].1.workflow_id, "wf-7");
        assert_eq!(calls[0].0["query"], "eligibility");
    }

    #[tokio::test(start_paused = true)]
    async fn slow_tools_time_out() {
        let mut registry = ToolRegistry::new();
        registry.register(SlowTool);
        let err = registry
            .execute("slow", serde_json::json!({}), ToolContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, NexusError::ToolTimeout { timeout_secs: 1, .. }));
    }
}
