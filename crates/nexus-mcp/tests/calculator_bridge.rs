use std::sync::Arc;

use rmcp::ServiceExt;

use nexus_core::config::McpServerConfig;
use nexus_core::types::ToolContext;
use nexus_mcp::{register_from, CalculatorServer, McpClientManager};
use nexus_tools::ToolRegistry;

async fn connected_registry() -> (Arc<McpClientManager>, ToolRegistry) {
    let (server_side, client_side) = tokio::io::duplex(64 * 1024);
    tokio::spawn(async move {
        if let Ok(service) = CalculatorServer::new().serve(server_side).await {
            let _ = service.waiting().await;
        }
    });

    let manager = Arc::new(McpClientManager::new());
    manager
        .connect_with(
            "calculator",
            &McpServerConfig::bundled_calculator("nexus"),
            client_side,
        )
        .await
        .unwrap();

    let mut registry = ToolRegistry::new();
    let count = register_from(&manager, "calculator", 30, &mut registry)
        .await
        .unwrap();
    assert_eq!(count, 29);
    (manager, registry)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn bridged_tools_are_namespaced() {
    let (manager, registry) = connected_registry().await;
    assert!(registry.get("mcp__calculator__add").is_some());
    assert!(registry.get("mcp__calculator__unit_conversion").is_some());
    assert!(registry.get("add").is_none());
    assert!(manager.is_connected("calculator").await);
    manager.disconnect_all().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn calls_round_trip_through_mcp() {
    let (manager, registry) = connected_registry().await;
    let result = registry
        .execute(
            "mcp__calculator__price_range_analysis_five",
            serde_json::json!({
                "price1": 10, "price2": 20, "price3": 30, "price4": 40, "price5": 50
            }),
            ToolContext::default(),
        )
        .await
        .unwrap();
    assert!(!result.is_error);
    let value: serde_json::Value = serde_json::from_str(&result.content).unwrap();
    assert_eq!(value["median"], 30.0);
    assert_eq!(value["price_spread"], 40.0);
    manager.disconnect_all().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn calculation_errors_become_error_results() {
    let (manager, registry) = connected_registry().await;
    let result = registry
        .execute(
            "mcp__calculator__divide",
            serde_json::json!({ "dividend": 5, "divisor": 0 }),
            ToolContext::default(),
        )
        .await
        .unwrap();
    assert!(result.is_error);
    assert!(result.content.starts_with("divide_by_zero"));
    manager.disconnect_all().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn re_registering_replaces_existing_tools() {
    let (manager, mut registry) = connected_registry().await;
    let before = registry.list().len();
    register_from(&manager, "calculator", 30, &mut registry)
        .await
        .unwrap();
    assert_eq!(registry.list().len(), before);
    manager.disconnect_all().await;
}
