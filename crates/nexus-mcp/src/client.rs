use std::collections::HashMap;

use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use rmcp::model::{CallToolRequestParams, RawContent, Tool as McpTool};
use rmcp::service::RunningService;
use rmcp::transport::streamable_http_client::StreamableHttpClientTransport;
use rmcp::transport::IntoTransport;
use rmcp::{RoleClient, ServiceExt};

use nexus_core::config::{McpServerConfig, McpTransport};
use nexus_core::error::NexusError;
use nexus_core::types::ToolResult;

use crate::handler::ServerWatcher;

type McpConnection = RunningService<RoleClient, ServerWatcher>;

/// Manages connections to MCP servers. Constructed once in `main` and
/// shared by every bridged tool.
pub struct McpClientManager {
    connections: Mutex<HashMap<String, McpConnection>>,
    server_configs: Mutex<HashMap<String, McpServerConfig>>,
    tools_changed: broadcast::Sender<String>,
}

impl Default for McpClientManager {
    fn default() -> Self {
        let (tools_changed, _) = broadcast::channel(64);
        Self {
            connections: Mutex::new(HashMap::new()),
            server_configs: Mutex::new(HashMap::new()),
            tools_changed,
        }
    }
}

impl McpClientManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of servers whose tool list changed, as they announce it.
    pub fn subscribe_tool_changes(&self) -> broadcast::Receiver<String> {
        self.tools_changed.subscribe()
    }

    /// Connect to an MCP server using its configured transport.
    pub async fn connect(&self, name: &str, config: &McpServerConfig) -> Result<(), NexusError> {
        match &config.transport {
            McpTransport::Stdio { command, args, env } => {
                let mut cmd = tokio::process::Command::new(command);
                cmd.args(args);
                for (k, v) in env {
                    cmd.env(k, v);
                }

                let transport = rmcp::transport::TokioChildProcess::new(cmd)
                    .map_err(|e| NexusError::Mcp(format!("Failed to spawn {}: {}", command, e)))?;
                self.connect_with(name, config, transport).await
            }
            McpTransport::Http { url } => {
                let transport = StreamableHttpClientTransport::from_uri(url.as_str());
                self.connect_with(name, config, transport).await
            }
        }
    }

    /// Connect over an already established transport. `config` is kept for
    /// reconnects.
    pub async fn connect_with<T, E, A>(
        &self,
        name: &str,
        config: &McpServerConfig,
        transport: T,
    ) -> Result<(), NexusError>
    where
        T: IntoTransport<RoleClient, E, A>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let watcher = ServerWatcher::new(name, self.tools_changed.clone());
        let client = <ServerWatcher as ServiceExt<RoleClient>>::serve(watcher, transport)
            .await
            .map_err(|e| {
                NexusError::Mcp(format!("Failed to initialize MCP client for {}: {}", name, e))
            })?;

        info!(server = %name, "MCP server connected");

        self.connections
            .lock()
            .await
            .insert(name.to_string(), client);
        self.server_configs
            .lock()
            .await
            .insert(name.to_string(), config.clone());
        Ok(())
    }

    /// Attempt to reconnect to a server using its stored config.
    pub async fn reconnect(&self, server_name: &str) -> Result<(), NexusError> {
        let config = {
            let configs = self.server_configs.lock().await;
            configs.get(server_name).cloned().ok_or_else(|| {
                NexusError::Mcp(format!("No stored config for server '{}'", server_name))
            })?
        };

        {
            let mut conns = self.connections.lock().await;
            if let Some(mut old) = conns.remove(server_name) {
                let _ = old.close().await;
            }
        }

        self.connect(server_name, &config).await
    }

    pub async fn is_connected(&self, server_name: &str) -> bool {
        let conns = self.connections.lock().await;
        conns
            .get(server_name)
            .map(|c| !c.is_closed())
            .unwrap_or(false)
    }

    pub async fn connected_servers(&self) -> Vec<String> {
        let conns = self.connections.lock().await;
        let mut names: Vec<String> = conns.keys().cloned().collect();
        names.sort();
        names
    }

    /// List tools from a connected server.
    pub async fn list_tools(&self, server_name: &str) -> Result<Vec<McpTool>, NexusError> {
        let conns = self.connections.lock().await;
        let client = conns
            .get(server_name)
            .ok_or_else(|| NexusError::Mcp(format!("Server '{}' not connected", server_name)))?;

        let tools = client.list_all_tools().await.map_err(|e| {
            NexusError::Mcp(format!("Failed to list tools from '{}': {}", server_name, e))
        })?;

        debug!(server = %server_name, count = tools.len(), "Listed MCP tools");
        Ok(tools)
    }

    /// Call a tool on a connected server, reconnecting once if the
    /// transport has gone away. A result the server flags as an error comes
    /// back as an error [`ToolResult`], not as `Err`.
    pub async fn call_tool(
        &self,
        server_name: &str,
        tool_name: &str,
        arguments: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Result<ToolResult, NexusError> {
        let result = self
            .call_tool_inner(server_name, tool_name, arguments.clone())
            .await;

        if let Err(ref e) = result {
            let err_str = e.to_string();
            if err_str.contains("closed") || err_str.contains("Transport") {
                warn!(server = %server_name, "MCP transport closed, attempting reconnect");
                if self.reconnect(server_name).await.is_ok() {
                    return self.call_tool_inner(server_name, tool_name, arguments).await;
                }
            }
        }

        result
    }

    async fn call_tool_inner(
        &self,
        server_name: &str,
        tool_name: &str,
        arguments: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Result<ToolResult, NexusError> {
        let conns = self.connections.lock().await;
        let client = conns
            .get(server_name)
            .ok_or_else(|| NexusError::Mcp(format!("Server '{}' not connected", server_name)))?;

        let params = CallToolRequestParams {
            name: tool_name.to_string().into(),
            arguments,
            meta: None,
            task: None,
        };

        let result = client.call_tool(params).await.map_err(|e| {
            NexusError::Mcp(format!(
                "Tool call '{}.{}' failed: {}",
                server_name, tool_name, e
            ))
        })?;

        let content: Vec<String> = result
            .content
            .iter()
            .map(|c| match c.raw {
                RawContent::Text(ref t) => t.text.to_string(),
                _ => format!("{:?}", c.raw),
            })
            .collect();
        let text = content.join("\n");

        if result.is_error.unwrap_or(false) {
            Ok(ToolResult::error(text))
        } else {
            Ok(ToolResult::success(text))
        }
    }

    /// Disconnect from all servers.
    pub async fn disconnect_all(&self) {
        let mut conns = self.connections.lock().await;
        for (name, mut client) in conns.drain() {
            let _ = client.close().await;
            info!(server = %name, "MCP server disconnected");
        }
    }
}
