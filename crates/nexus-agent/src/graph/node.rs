use futures::future::BoxFuture;

use nexus_core::error::Result;
use nexus_core::state::WorkflowState;

/// A step of a state graph: state in, state out.
pub trait GraphNode: Send + Sync + 'static {
    /// Unique id within the enclosing graph.
    fn id(&self) -> &str;

    fn run(&self, state: WorkflowState) -> BoxFuture<'_, Result<WorkflowState>>;
}
