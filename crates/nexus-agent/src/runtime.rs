use std::sync::Arc;
use std::time::{Duration, Instant};

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use nexus_core::config::{AgentConfig, AppConfig, ModelConfig};
use nexus_core::error::{NexusError, Result};
use nexus_core::event::EventBus;
use nexus_core::traits::LlmClient;
use nexus_core::types::*;
use nexus_tools::registry::is_allowed;
use nexus_tools::ToolRegistry;

use crate::definition::AgentDefinition;
use crate::output_parser::parse_structured;

/// Counters shared by every model round trip of one run.
struct RunBudget {
    start: Instant,
    turns: usize,
    input_tokens: u64,
    output_tokens: u64,
}

impl RunBudget {
    fn new() -> Self {
        Self {
            start: Instant::now(),
            turns: 0,
            input_tokens: 0,
            output_tokens: 0,
        }
    }
}

/// The agent runtime: a tool-calling loop around one LLM client.
pub struct AgentRuntime {
    config: AgentConfig,
    model: ModelConfig,
    llm: Arc<dyn LlmClient>,
    tools: Arc<RwLock<ToolRegistry>>,
    event_bus: Arc<EventBus>,
    cancel: CancellationToken,
}

impl AgentRuntime {
    pub fn new(
        config: &AppConfig,
        llm: Arc<dyn LlmClient>,
        tools: Arc<RwLock<ToolRegistry>>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            config: config.agent.clone(),
            model: config.model.clone(),
            llm,
            tools,
            event_bus,
            cancel: CancellationToken::new(),
        }
    }

    /// Cancelling the token aborts every run in progress.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Run the agent and return its final text answer.
    pub async fn run(
        &self,
        definition: &AgentDefinition,
        workflow_id: &str,
        prompt: &str,
    ) -> Result<String> {
        let mut budget = RunBudget::new();
        let mut messages = vec![
            ChatMessage::system(definition.system_prompt.clone()),
            ChatMessage::user(prompt),
        ];
        self.started(definition, workflow_id);
        let result = self
            .converse(definition, workflow_id, &mut messages, &mut budget)
            .await;
        self.finished(workflow_id, &budget, result.as_ref().err());
        result
    }

    /// Run the agent and parse its final answer into `T`.
    ///
    /// The JSON schema of `T` is appended to the system prompt. An answer
    /// that does not parse is sent back with the parse error, up to
    /// `output_retries` times.
    pub async fn run_structured<T>(
        &self,
        definition: &AgentDefinition,
        workflow_id: &str,
        prompt: &str,
    ) -> Result<T>
    where
        T: DeserializeOwned + JsonSchema,
    {
        let schema = serde_json::to_string_pretty(&schemars::schema_for!(T))?;
        let system = format!(
            "{}\n\n## Output format\n\nWhen you are done, reply with a single JSON object \
             and nothing else. It must match this JSON schema; fields not in the schema \
             are rejected.\n\n```json\n{}\n```",
            definition.system_prompt, schema
        );

        let mut budget = RunBudget::new();
        let mut messages = vec![ChatMessage::system(system), ChatMessage::user(prompt)];
        self.started(definition, workflow_id);

        let result = self
            .structured_loop(definition, workflow_id, &mut messages, &mut budget)
            .await;
        self.finished(workflow_id, &budget, result.as_ref().err());
        result
    }

    async fn structured_loop<T: DeserializeOwned>(
        &self,
        definition: &AgentDefinition,
        workflow_id: &str,
        messages: &mut Vec<ChatMessage>,
        budget: &mut RunBudget,
    ) -> Result<T> {
        let attempts = self.config.output_retries + 1;
        let mut last_reason = String::new();

        for attempt in 1..=attempts {
            let text = self
                .converse(definition, workflow_id, messages, budget)
                .await?;
            match parse_structured::<T>(&text) {
                Ok(value) => return Ok(value),
                Err(reason) => {
                    warn!(agent = %definition.agent, attempt, reason = %reason, "Final answer rejected");
                    self.event_bus.publish(AgentEvent::OutputRejected {
                        attempt,
                        reason: reason.clone(),
                    });
                    messages.push(ChatMessage::user(format!(
                        "Your answer could not be accepted: {reason}\n\
                         Reply again with only the JSON object described in the output format."
                    )));
                    last_reason = reason;
                }
            }
        }

        Err(NexusError::OutputValidation {
            attempts,
            message: last_reason,
        })
    }

    /// Call the model until it answers without requesting tools.
    async fn converse(
        &self,
        definition: &AgentDefinition,
        workflow_id: &str,
        messages: &mut Vec<ChatMessage>,
        budget: &mut RunBudget,
    ) -> Result<String> {
        let max_duration = Duration::from_secs(self.config.max_duration_secs);
        let tool_defs = self.tools.read().await.definitions_for(&definition.tools);
        let ctx = ToolContext {
            workflow_id: workflow_id.to_string(),
            agent: Some(definition.agent.as_str().to_string()),
        };

        loop {
            if self.cancel.is_cancelled() {
                return Err(NexusError::Cancelled);
            }
            if budget.turns >= self.config.max_turns {
                return Err(NexusError::MaxTurnsExceeded(self.config.max_turns));
            }
            if budget.start.elapsed() > max_duration {
                return Err(NexusError::MaxDurationExceeded(
                    self.config.max_duration_secs,
                ));
            }

            let turn = budget.turns;
            budget.turns += 1;
            debug!(agent = %definition.agent, turn, "Starting agent turn");

            let reply = tokio::select! {
                result = self.llm.chat(&self.model, messages.clone(), &tool_defs) => result?,
                _ = self.cancel.cancelled() => return Err(NexusError::Cancelled),
            };
            budget.input_tokens += reply.usage.input_tokens;
            budget.output_tokens += reply.usage.output_tokens;

            let text = reply.message.text();
            let calls: Vec<(String, String, serde_json::Value)> = reply
                .message
                .tool_uses()
                .into_iter()
                .map(|(id, name, input)| (id.to_string(), name.to_string(), input.clone()))
                .collect();
            messages.push(reply.message);
            self.event_bus.publish(AgentEvent::TurnComplete { turn });

            if calls.is_empty() {
                if reply.stop_reason == StopReason::MaxTokens {
                    warn!(agent = %definition.agent, "LLM hit max tokens");
                }
                return Ok(text);
            }

            let results = self.execute_tools(definition, &calls, &ctx).await;
            let blocks = results
                .into_iter()
                .map(|(id, result)| ContentBlock::ToolResult {
                    tool_use_id: id,
                    content: result.content,
                    is_error: result.is_error,
                })
                .collect();
            messages.push(ChatMessage::tool_results(blocks));
        }
    }

    /// Execute one batch of tool calls, returning `(call id, result)` in call
    /// order. Failures become error results for the model to read.
    async fn execute_tools(
        &self,
        definition: &AgentDefinition,
        calls: &[(String, String, serde_json::Value)],
        ctx: &ToolContext,
    ) -> Vec<(String, ToolResult)> {
        for (_, name, input) in calls {
            self.event_bus.publish(AgentEvent::ToolStart {
                name: name.clone(),
                input: input.clone(),
            });
        }

        let run_one = |name: String, input: serde_json::Value| {
            let ctx = ctx.clone();
            async move {
                if !is_allowed(&name, &definition.tools) {
                    warn!(agent = %definition.agent, tool = %name, "Model called a tool it was not offered");
                    return ToolResult::error(format!(
                        "Tool '{}' is not available to this agent",
                        name
                    ));
                }
                let registry = self.tools.read().await;
                match registry.execute(&name, input, ctx).await {
                    Ok(result) => result,
                    Err(e) => {
                        error!(tool = %name, error = %e, "Tool execution failed");
                        ToolResult::error(e.to_string())
                    }
                }
            }
        };

        let raw: Vec<ToolResult> = if self.config.parallel_tools && calls.len() > 1 {
            futures::future::join_all(
                calls
                    .iter()
                    .map(|(_, name, input)| run_one(name.clone(), input.clone())),
            )
            .await
        } else {
            let mut out = Vec::with_capacity(calls.len());
            for (_, name, input) in calls {
                out.push(run_one(name.clone(), input.clone()).await);
            }
            out
        };

        calls
            .iter()
            .zip(raw)
            .map(|((id, name, _), result)| {
                let result = ToolResult {
                    content: truncate_output(&result.content, self.config.max_tool_output_chars),
                    is_error: result.is_error,
                };
                self.event_bus.publish(AgentEvent::ToolEnd {
                    name: name.clone(),
                    result: result.clone(),
                });
                (id.clone(), result)
            })
            .collect()
    }

    fn started(&self, definition: &AgentDefinition, workflow_id: &str) {
        info!(agent = %definition.agent, workflow_id, "Agent run started");
        self.event_bus.publish(AgentEvent::RunStarted {
            workflow_id: workflow_id.to_string(),
            agent: definition.agent.as_str().to_string(),
        });
    }

    fn finished(&self, workflow_id: &str, budget: &RunBudget, error: Option<&NexusError>) {
        match error {
            None => {
                info!(
                    workflow_id,
                    turns = budget.turns,
                    input_tokens = budget.input_tokens,
                    output_tokens = budget.output_tokens,
                    "Agent run complete"
                );
                self.event_bus.publish(AgentEvent::RunComplete {
                    workflow_id: workflow_id.to_string(),
                    total_turns: budget.turns,
                    input_tokens: budget.input_tokens,
                    output_tokens: budget.output_tokens,
                });
            }
            Some(e) => {
                error!(workflow_id, error = %e, "Agent run failed");
                self.event_bus.publish(AgentEvent::RunError {
                    error: e.to_string(),
                });
            }
        }
    }
}

/// Cut tool output to `max_chars` characters, noting how much was dropped.
pub fn truncate_output(content: &str, max_chars: usize) -> String {
    let total = content.chars().count();
    if total <= max_chars {
        return content.to_string();
    }
    let kept: String = content.chars().take(max_chars).collect();
    format!("{kept}\n\n[output truncated: {max_chars} of {total} characters shown]")
}
