//! Mocks and fixtures shared by the Nexus crates' tests.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;

use nexus_core::config::ModelConfig;
use nexus_core::error::{NexusError, Result};
use nexus_core::traits::{LlmClient, Tool};
use nexus_core::types::*;

enum Scripted {
    Reply(ChatResponse),
    Error(NexusError),
}

#[derive(Default)]
struct MockState {
    script: VecDeque<Scripted>,
    requests: Vec<Vec<ChatMessage>>,
    tool_names: Vec<Vec<String>>,
}

/// LLM client that replays a fixed script of replies and records every request.
///
/// Clones share the same script, so a test can keep one handle for assertions
/// after moving another into the code under test.
#[derive(Clone, Default)]
pub struct MockLlmClient {
    state: Arc<Mutex<MockState>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(self, item: Scripted) -> Self {
        self.state.lock().unwrap().script.push_back(item);
        self
    }

    /// Queue a plain text answer.
    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.push(Scripted::Reply(ChatResponse::text(text)))
    }

    /// Queue a single tool call.
    pub fn with_tool_call(self, name: &str, input: serde_json::Value) -> Self {
        let idx = self.state.lock().unwrap().script.len();
        self.push(Scripted::Reply(ChatResponse {
            message: ChatMessage::assistant(vec![ContentBlock::ToolUse {
                id: format!("call_{idx}_{name}"),
                name: name.to_string(),
                input,
            }]),
            stop_reason: StopReason::ToolUse,
            usage: Usage {
                input_tokens: 10,
                output_tokens: 5,
            },
        }))
    }

    /// Queue a failure.
    pub fn with_error(self, error: NexusError) -> Self {
        self.push(Scripted::Error(error))
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().unwrap().requests.len()
    }

    /// Every message list the client was called with, in order.
    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.state.lock().unwrap().requests.clone()
    }

    /// Tool names offered on each call.
    pub fn offered_tools(&self) -> Vec<Vec<String>> {
        self.state.lock().unwrap().tool_names.clone()
    }
}

impl LlmClient for MockLlmClient {
    fn chat(
        &self,
        _config: &ModelConfig,
        messages: Vec<ChatMessage>,
        tools: &[ToolDefinition],
    ) -> BoxFuture<'_, Result<ChatResponse>> {
        let next = {
            let mut state = self.state.lock().unwrap();
            state.requests.push(messages);
            state
                .tool_names
                .push(tools.iter().map(|t| t.name.clone()).collect());
            state.script.pop_front()
        };
        Box::pin(async move {
            match next {
                Some(Scripted::Reply(reply)) => Ok(reply),
                Some(Scripted::Error(e)) => Err(e),
                None => Err(NexusError::LlmRequest("mock script exhausted".into())),
            }
        })
    }
}

/// Tool that returns a canned result and remembers the inputs it saw.
#[derive(Clone)]
pub struct RecordingTool {
    name: String,
    result: ToolResult,
    calls: Arc<Mutex<Vec<(serde_json::Value, ToolContext)>>>,
}

impl RecordingTool {
    pub fn new(name: impl Into<String>, result: ToolResult) -> Self {
        Self {
            name: name.into(),
            result,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> Vec<(serde_json::Value, ToolContext)> {
        self.calls.lock().unwrap().clone()
    }
}

impl Tool for RecordingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Records its inputs and returns a canned result."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    fn execute(
        &self,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        self.calls.lock().unwrap().push((input, ctx));
        let result = self.result.clone();
        Box::pin(async move { Ok(result) })
    }
}

/// Model config pointing at nothing in particular.
pub fn test_model_config() -> ModelConfig {
    ModelConfig {
        provider: "mock".into(),
        model_id: "mock-model".into(),
        api_key: None,
        base_url: None,
        max_tokens: 1024,
        temperature: 0.0,
        retry: None,
    }
}

/// Write a config file into a fresh temp dir. Keep the dir alive while the
/// path is in use.
pub fn write_config(toml: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nexus.toml");
    std::fs::write(&path, toml).unwrap();
    (dir, path)
}
