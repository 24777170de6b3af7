use futures::future::BoxFuture;

use crate::config::ModelConfig;
use crate::error::Result;
use crate::types::*;

/// LLM client: one request, one complete reply.
pub trait LlmClient: Send + Sync + 'static {
    /// Send the conversation (plus tool definitions) and wait for the reply.
    fn chat(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
        tools: &[ToolDefinition],
    ) -> BoxFuture<'_, Result<ChatResponse>>;
}

/// A callable tool offered to the model.
pub trait Tool: Send + Sync + 'static {
    /// Tool name (used in LLM tool calls).
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// JSON Schema for tool input.
    fn input_schema(&self) -> serde_json::Value;

    /// Execute the tool with given input and context.
    fn execute(
        &self,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>>;

    /// Timeout in seconds for this tool.
    fn timeout_secs(&self) -> u64 {
        30
    }
}

/// Expiring key-value store. Backs agent history and workflow checkpoint keys.
pub trait KvStore: Send + Sync + 'static {
    /// Write `value` under `key` and (re)start its TTL.
    fn set_ex(&self, key: &str, value: String, ttl_secs: u64) -> BoxFuture<'_, Result<()>>;

    /// Read the value under `key`, `None` when absent or expired.
    fn get(&self, key: &str) -> BoxFuture<'_, Result<Option<String>>>;

    /// Restart the TTL of an existing key. Returns false when the key is absent.
    fn expire(&self, key: &str, ttl_secs: u64) -> BoxFuture<'_, Result<bool>>;
}
