mod bridge;
pub mod calculator;
mod client;
mod handler;

pub use bridge::{bridged_name, replace_server_tools, BridgedName};
pub use calculator::CalculatorServer;
pub use client::McpClientManager;
pub use handler::ServerWatcher;

use std::sync::Arc;

use tracing::debug;

use nexus_core::config::McpServerConfig;
use nexus_core::error::NexusError;
use nexus_tools::ToolRegistry;

/// Connect to an MCP server and register its tools into the registry.
/// Returns the number of tools registered.
pub async fn connect_and_register(
    manager: &Arc<McpClientManager>,
    server_name: &str,
    config: &McpServerConfig,
    registry: &mut ToolRegistry,
) -> Result<usize, NexusError> {
    manager.connect(server_name, config).await?;
    register_from(manager, server_name, config.timeout_secs, registry).await
}

/// Register the tools of an already connected server, replacing any that
/// were registered for it before.
pub async fn register_from(
    manager: &Arc<McpClientManager>,
    server_name: &str,
    timeout_secs: u64,
    registry: &mut ToolRegistry,
) -> Result<usize, NexusError> {
    let tools = manager.list_tools(server_name).await?;
    let replaced = replace_server_tools(registry, manager, server_name, &tools, timeout_secs);
    debug!(server = %server_name, replaced, count = tools.len(), "Registered MCP tools");
    Ok(tools.len())
}
