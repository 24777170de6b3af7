use std::sync::Arc;

use futures::future::BoxFuture;

use nexus_core::error::Result;
use nexus_core::output::{AgentOutput, GovSchemeAgentOutput, MarketPriceAgentOutput};
use nexus_core::state::AgentName;

use crate::definition::AgentDefinition;
use crate::runtime::AgentRuntime;

/// Something that answers one composed prompt for one agent.
pub trait AgentExecutor: Send + Sync + 'static {
    fn execute(&self, workflow_id: &str, prompt: String) -> BoxFuture<'_, Result<AgentOutput>>;
}

/// An [`AgentDefinition`] bound to a runtime, producing that agent's
/// structured output.
pub struct BoundAgent {
    runtime: Arc<AgentRuntime>,
    definition: AgentDefinition,
}

impl BoundAgent {
    pub fn new(runtime: Arc<AgentRuntime>, definition: AgentDefinition) -> Self {
        Self {
            runtime,
            definition,
        }
    }

    pub fn definition(&self) -> &AgentDefinition {
        &self.definition
    }
}

impl AgentExecutor for BoundAgent {
    fn execute(&self, workflow_id: &str, prompt: String) -> BoxFuture<'_, Result<AgentOutput>> {
        let workflow_id = workflow_id.to_string();
        Box::pin(async move {
            let def = &self.definition;
            let output = match def.agent {
                AgentName::MarketPriceAgent => AgentOutput::MarketPrice(
                    self.runtime
                        .run_structured::<MarketPriceAgentOutput>(def, &workflow_id, &prompt)
                        .await?,
                ),
                AgentName::GovSchemeAgent => AgentOutput::GovScheme(
                    self.runtime
                        .run_structured::<GovSchemeAgentOutput>(def, &workflow_id, &prompt)
                        .await?,
                ),
            };
            Ok(output)
        })
    }
}
