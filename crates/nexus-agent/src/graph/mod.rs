//! State graph engine.
//!
//! A graph is a set of [`GraphNode`]s connected by [`Edge`]s. Execution
//! starts at the entry node, hands the [`WorkflowState`] from node to node
//! and follows the first outgoing edge whose condition matches the state.
//! A [`StateGraph`] is itself a node, so subgraphs nest.
//!
//! [`WorkflowState`]: nexus_core::state::WorkflowState

pub mod edge;
pub mod executor;
pub mod node;

pub use edge::{evaluate_condition, Edge, EdgeCondition};
pub use executor::{ExecutionResult, StateGraph};
pub use node::GraphNode;
