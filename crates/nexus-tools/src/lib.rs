pub mod builtin;
pub mod registry;

use std::time::Duration;

use tracing::warn;

use nexus_core::config::AppConfig;

pub use registry::ToolRegistry;

/// Register every HTTP-backed and local tool the configuration allows.
///
/// Tools whose backing service is not configured are skipped with a warning;
/// the agents still run, they just cannot call them.
pub fn register_builtins(registry: &mut ToolRegistry, config: &AppConfig, http: reqwest::Client) {
    use builtin::*;

    registry.register(datetime::GetDateTool);
    registry.register(datetime::GetTimeTool);
    registry.register(scheme::ConfirmSchemeApplyAutomationTool);
    registry.register(browser_use::ApplySchemeTool);

    match &config.web_search {
        Some(ws) => registry.register(web_search::WebSearchTool::new(
            http.clone(),
            &ws.api_key,
            &ws.country,
        )),
        None => warn!("web_search not configured, tool disabled"),
    }

    match &config.services.nexus_base_url {
        Some(base_url) => {
            let service = nexus_service::NexusServiceClient::new(http.clone(), base_url);
            registry.register(nexus_service::WebScraperTool::new(service.clone()));
            registry.register(nexus_service::RagQueryTool::new(service.clone()));
            registry.register(scheme::ResearchGovSchemesTool::new(
                service,
                Duration::from_secs(config.services.research_ingest_delay_secs),
            ));
        }
        None => warn!("services.nexus_base_url not set, scrape/RAG/research tools disabled"),
    }

    match &config.services.perplexity {
        Some(pplx) => registry.register(market_price::MarketPriceTool::new(http, pplx)),
        None => warn!("services.perplexity not configured, get_market_price disabled"),
    }
}

/// Shared HTTP client with the configured request timeout.
pub fn build_http_client(config: &AppConfig) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.services.http_timeout_secs))
        .user_agent(concat!("nexus/", env!("CARGO_PKG_VERSION")))
        .build()
}
