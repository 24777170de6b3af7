pub mod definition;
pub mod executor;
pub mod graph;
pub mod output_parser;
pub mod prompts;
pub mod router;
pub mod runtime;
pub mod subgraph;
pub mod workflow;

pub use definition::AgentDefinition;
pub use executor::{AgentExecutor, BoundAgent};
pub use graph::{ExecutionResult, GraphNode, StateGraph};
pub use router::build_router_graph;
pub use runtime::AgentRuntime;
pub use workflow::{TurnOutcome, TurnRequest, WorkflowRunner};
