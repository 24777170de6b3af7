//! Client for the nexus helper service and the tools built on it.
//!
//! Endpoints: `POST /scrape?url=`, `POST /query-data`, `POST /scheme-research`,
//! `POST /add-data`.

use futures::future::BoxFuture;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use nexus_core::error::{NexusError, Result};
use nexus_core::traits::Tool;
use nexus_core::types::{ToolContext, ToolResult};

use super::transport_error;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    Transport(#[from] reqwest::Error),
    #[error("HTTP {0}")]
    Status(u16),
}

/// Thin handle on the helper service. Cheap to clone.
#[derive(Clone)]
pub struct NexusServiceClient {
    http: reqwest::Client,
    base_url: String,
}

impl NexusServiceClient {
    pub fn new(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Scrape a page. JSON bodies come back as JSON, anything else as a string.
    pub async fn scrape(&self, url: &str) -> std::result::Result<serde_json::Value, ServiceError> {
        let resp = self
            .http
            .post(self.url("scrape"))
            .query(&[("url", url)])
            .send()
            .await?;
        if resp.status().as_u16() != 200 {
            return Err(ServiceError::Status(resp.status().as_u16()));
        }
        read_body(resp).await
    }

    /// Ask the RAG collection of `workflow_id` a question.
    pub async fn query_data(
        &self,
        workflow_id: &str,
        query: &str,
    ) -> std::result::Result<String, ServiceError> {
        let resp = self
            .http
            .post(self.url("query-data"))
            .json(&json!({ "workflow_id": workflow_id, "query": query }))
            .send()
            .await?;
        if resp.status().as_u16() != 200 {
            return Err(ServiceError::Status(resp.status().as_u16()));
        }
        let body: serde_json::Value = resp.json().await?;
        Ok(match &body["response"] {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        })
    }

    /// Run scheme research for a farmer's problem and return the report.
    pub async fn scheme_research(
        &self,
        workflow_id: &str,
        problem: &str,
    ) -> std::result::Result<serde_json::Value, ServiceError> {
        let resp = self
            .http
            .post(self.url("scheme-research"))
            .json(&json!({
                "workflow_id": workflow_id,
                "problem": problem,
                "include_application_methods": true,
                "include_automation_analysis": true,
            }))
            .send()
            .await?;
        if resp.status().as_u16() != 200 {
            return Err(ServiceError::Status(resp.status().as_u16()));
        }
        read_body(resp).await
    }

    /// Append data to the RAG collection of `workflow_id`. 200 and 202 both count.
    pub async fn add_data(
        &self,
        workflow_id: &str,
        data: &serde_json::Value,
    ) -> std::result::Result<(), ServiceError> {
        let resp = self
            .http
            .post(self.url("add-data"))
            .json(&json!({ "workflow_id": workflow_id, "data": data }))
            .send()
            .await?;
        match resp.status().as_u16() {
            200 | 202 => Ok(()),
            code => Err(ServiceError::Status(code)),
        }
    }
}

async fn read_body(
    resp: reqwest::Response,
) -> std::result::Result<serde_json::Value, ServiceError> {
    let is_json = resp
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("application/json"));
    if is_json {
        Ok(resp.json().await?)
    } else {
        Ok(serde_json::Value::String(resp.text().await?))
    }
}

/// Render a service payload for the model.
pub(crate) fn render(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

// ── WebScraperTool ──────────────────────────────────────────────

pub struct WebScraperTool {
    service: NexusServiceClient,
}

impl WebScraperTool {
    pub fn new(service: NexusServiceClient) -> Self {
        Self { service }
    }
}

#[derive(Deserialize)]
struct ScrapeInput {
    url_to_scrape: String,
}

impl Tool for WebScraperTool {
    fn name(&self) -> &str {
        "web_scraper"
    }
    fn description(&self) -> &str {
        "Scrape a web page (for example a scheme's official page) and return its content."
    }
    fn timeout_secs(&self) -> u64 {
        90
    }
    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "url_to_scrape": { "type": "string", "description": "Full URL of the page to scrape" }
            },
            "required": ["url_to_scrape"]
        })
    }
    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let params: ScrapeInput = serde_json::from_value(input)
                .map_err(|e| NexusError::ToolValidation(e.to_string()))?;
            debug!(url = %params.url_to_scrape, "Scraping");
            match self.service.scrape(&params.url_to_scrape).await {
                Ok(body) => Ok(ToolResult::success(render(&body))),
                Err(e) => Ok(transport_error("scrape", e)),
            }
        })
    }
}

// ── RagQueryTool ────────────────────────────────────────────────

pub struct RagQueryTool {
    service: NexusServiceClient,
}

impl RagQueryTool {
    pub fn new(service: NexusServiceClient) -> Self {
        Self { service }
    }
}

#[derive(Deserialize)]
struct RagInput {
    query: String,
    #[serde(default)]
    workflow_id: Option<String>,
}

impl Tool for RagQueryTool {
    fn name(&self) -> &str {
        "rag_query"
    }
    fn description(&self) -> &str {
        "Query the research collected for this workflow (after research_gov_schemes has run)."
    }
    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "The question to answer" },
                "workflow_id": { "type": "string", "description": "Workflow id (defaults to the current workflow)" }
            },
            "required": ["query"]
        })
    }
    fn execute(
        &self,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let params: RagInput = serde_json::from_value(input)
                .map_err(|e| NexusError::ToolValidation(e.to_string()))?;
            let workflow_id = params
                .workflow_id
                .filter(|w| !w.trim().is_empty())
                .unwrap_or(ctx.workflow_id);
            match self.service.query_data(&workflow_id, &params.query).await {
                Ok(answer) => Ok(ToolResult::success(answer)),
                Err(e) => Ok(transport_error("rag query", e)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service(server: &MockServer) -> NexusServiceClient {
        NexusServiceClient::new(reqwest::Client::new(), &format!("{}/", server.uri()))
    }

    #[tokio::test]
    async fn scrape_returns_json_bodies_pretty_printed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/scrape"))
            .and(query_param("url", "https://pmkisan.gov.in"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "markdown": "# PM-KISAN" })))
            .mount(&server)
            .await;

        let result = WebScraperTool::new(service(&server))
            .execute(json!({ "url_to_scrape": "https://pmkisan.gov.in" }), ToolContext::default())
            .await
            .unwrap();
        assert!(!result.is_error);
        assert!(result.content.contains("\"markdown\": \"# PM-KISAN\""));
    }

    #[tokio::test]
    async fn scrape_returns_text_bodies_verbatim() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/scrape"))
            .respond_with(ResponseTemplate::new(200).set_body_string("plain page"))
            .mount(&server)
            .await;

        let result = WebScraperTool::new(service(&server))
            .execute(json!({ "url_to_scrape": "https://example.org" }), ToolContext::default())
            .await
            .unwrap();
        assert_eq!(result.content, "plain page");
    }

    #[tokio::test]
    async fn scrape_non_200_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let result = WebScraperTool::new(service(&server))
            .execute(json!({ "url_to_scrape": "https://example.org" }), ToolContext::default())
            .await
            .unwrap();
        assert!(result.is_error);
        assert_eq!(result.content, "Error in scrape: HTTP 502");
    }

    #[tokio::test]
    async fn rag_query_defaults_to_context_workflow() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/query-data"))
            .and(body_json(json!({ "workflow_id": "wf-42", "query": "documents needed?" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "response": "Aadhaar and land records." })))
            .mount(&server)
            .await;

        let result = RagQueryTool::new(service(&server))
            .execute(json!({ "query": "documents needed?" }), ToolContext::for_workflow("wf-42"))
            .await
            .unwrap();
        assert_eq!(result.content, "Aadhaar and land records.");
    }

    #[tokio::test]
    async fn unreachable_service_is_reported_not_raised() {
        let service = NexusServiceClient::new(reqwest::Client::new(), "http://127.0.0.1:9");
        let result = RagQueryTool::new(service)
            .execute(json!({ "query": "x" }), ToolContext::for_workflow("wf"))
            .await
            .unwrap();
        assert!(result.is_error);
        assert!(result.content.starts_with("Error in rag query:"));
    }
}
