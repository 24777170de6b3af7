use std::future::Future;

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn, Level};

use rmcp::handler::client::ClientHandler;
use rmcp::model::{
    ClientCapabilities, ClientInfo, Implementation, LoggingLevel, LoggingMessageNotificationParam,
};
use rmcp::service::NotificationContext;
use rmcp::RoleClient;

/// Watches one server connection. Tool list changes are announced by server
/// name so the bridged tools can be re-registered; server log messages go
/// straight to tracing.
pub struct ServerWatcher {
    server: String,
    tools_changed: broadcast::Sender<String>,
}

impl ServerWatcher {
    pub fn new(server: &str, tools_changed: broadcast::Sender<String>) -> Self {
        Self {
            server: server.to_string(),
            tools_changed,
        }
    }
}

/// Tracing level for an MCP log level. Notice folds into info and
/// everything above error folds into error.
pub fn log_level(level: LoggingLevel) -> Level {
    match level {
        LoggingLevel::Debug => Level::DEBUG,
        LoggingLevel::Info | LoggingLevel::Notice => Level::INFO,
        LoggingLevel::Warning => Level::WARN,
        _ => Level::ERROR,
    }
}

fn log_text(data: &serde_json::Value) -> String {
    match data {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[allow(clippy::manual_async_fn)]
impl ClientHandler for ServerWatcher {
    fn on_tool_list_changed(
        &self,
        _ctx: NotificationContext<RoleClient>,
    ) -> impl Future<Output = ()> + Send + '_ {
        async {
            debug!(server = %self.server, "Server tool list changed");
            // Nobody listening just means no refresh is wanted.
            let _ = self.tools_changed.send(self.server.clone());
        }
    }

    fn on_logging_message(
        &self,
        params: LoggingMessageNotificationParam,
        _ctx: NotificationContext<RoleClient>,
    ) -> impl Future<Output = ()> + Send + '_ {
        async move {
            let server = self.server.as_str();
            let logger = params.logger.as_deref().unwrap_or("-");
            let text = log_text(&params.data);
            let level = log_level(params.level);
            if level == Level::DEBUG {
                debug!(server, logger, "{}", text);
            } else if level == Level::INFO {
                info!(server, logger, "{}", text);
            } else if level == Level::WARN {
                warn!(server, logger, "{}", text);
            } else {
                error!(server, logger, "{}", text);
            }
        }
    }

    fn get_info(&self) -> ClientInfo {
        ClientInfo {
            meta: None,
            protocol_version: Default::default(),
            capabilities: ClientCapabilities::default(),
            client_info: Implementation {
                name: "nexus".into(),
                title: Some("nexus farm advisory".into()),
                version: env!("CARGO_PKG_VERSION").into(),
                description: None,
                icons: None,
                website_url: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severities_collapse_onto_tracing_levels() {
        assert_eq!(log_level(LoggingLevel::Debug), Level::DEBUG);
        assert_eq!(log_level(LoggingLevel::Notice), Level::INFO);
        assert_eq!(log_level(LoggingLevel::Warning), Level::WARN);
        assert_eq!(log_level(LoggingLevel::Critical), Level::ERROR);
        assert_eq!(log_level(LoggingLevel::Emergency), Level::ERROR);
    }

    #[test]
    fn string_payloads_are_logged_unquoted() {
        assert_eq!(log_text(&serde_json::json!("starting")), "starting");
        assert_eq!(log_text(&serde_json::json!({"op": "add"})), r#"{"op":"add"}"#);
    }

    #[test]
    fn client_identifies_as_nexus() {
        let (tx, _) = broadcast::channel(1);
        let info = ServerWatcher::new("calculator", tx).get_info();
        assert_eq!(info.client_info.name, "nexus");
    }
}
