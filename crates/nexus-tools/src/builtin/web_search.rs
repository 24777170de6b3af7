use futures::future::BoxFuture;
use serde_json::json;
use tracing::debug;

use nexus_core::error::{NexusError, Result};
use nexus_core::traits::Tool;
use nexus_core::types::{ToolContext, ToolResult};

use super::transport_error;

const TAVILY_API_URL: &str = "https://api.tavily.com";

/// Tavily-backed web search. Returns the synthesized answer, or the result
/// snippets when Tavily gives no answer.
pub struct WebSearchTool {
    api_key: String,
    country: String,
    base_url: String,
    http: reqwest::Client,
}

impl WebSearchTool {
    pub fn new(http: reqwest::Client, api_key: &str, country: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            country: country.to_string(),
            base_url: TAVILY_API_URL.to_string(),
            http,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

fn render_results(body: &serde_json::Value) -> String {
    body["results"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .map(|r| {
                    format!(
                        "**{}**\n{}\nURL: {}",
                        r["title"].as_str().unwrap_or(""),
                        r["content"].as_str().unwrap_or(""),
                        r["url"].as_str().unwrap_or("")
                    )
                })
                .collect::<Vec<_>>()
                .join("\n\n---\n\n")
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "No results found.".into())
}

impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the internet and get a synthesized answer. Use for current information \
         such as scheme announcements, eligibility rules or news."
    }

    fn timeout_secs(&self) -> u64 {
        60
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The question to answer"
                }
            },
            "required": ["query"]
        })
    }

    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let query = input["query"]
                .as_str()
                .ok_or_else(|| NexusError::ToolValidation("'query' must be a string".into()))?;

            debug!(%query, "Tavily search");
            let resp = match self
                .http
                .post(format!("{}/search", self.base_url.trim_end_matches('/')))
                .json(&json!({
                    "api_key": self.api_key,
                    "query": query,
                    "include_answer": "advanced",
                    "include_raw_content": "text",
                    "country": self.country,
                }))
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => return Ok(transport_error("web_search", e)),
            };

            if !resp.status().is_success() {
                return Ok(transport_error(
                    "web_search",
                    format!("HTTP {}", resp.status().as_u16()),
                ));
            }

            let body: serde_json::Value = match resp.json().await {
                Ok(body) => body,
                Err(e) => return Ok(transport_error("web_search", e)),
            };

            match body["answer"].as_str().filter(|a| !a.trim().is_empty()) {
                Some(answer) => Ok(ToolResult::success(answer)),
                None => Ok(ToolResult::success(render_results(&body))),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn tool(server: &MockServer) -> WebSearchTool {
        WebSearchTool::new(reqwest::Client::new(), "tvly-test", "india").with_base_url(server.uri())
    }

    #[tokio::test]
    async fn returns_tavily_answer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(body_partial_json(json!({
                "include_answer": "advanced",
                "include_raw_content": "text",
                "country": "india"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "answer": "PM-KISAN pays Rs 6000 per year in three instalments.",
                "results": []
            })))
            .mount(&server)
            .await;

        let result = tool(&server)
            .execute(json!({ "query": "PM-KISAN benefit" }), ToolContext::default())
            .await
            .unwrap();
        assert!(!result.is_error);
        assert!(result.content.contains("6000"));
    }

    #[tokio::test]
    async fn falls_back_to_snippets_without_answer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "answer": null,
                "results": [{ "title": "Agmarknet", "content": "Onion modal price 2100", "url": "https://agmarknet.gov.in" }]
            })))
            .mount(&server)
            .await;

        let result = tool(&server)
            .execute(json!({ "query": "onion price" }), ToolContext::default())
            .await
            .unwrap();
        assert!(result.content.contains("Agmarknet"));
        assert!(result.content.contains("URL: https://agmarknet.gov.in"));
    }

    #[tokio::test]
    async fn http_failure_becomes_error_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let result = tool(&server)
            .execute(json!({ "query": "anything" }), ToolContext::default())
            .await
            .unwrap();
        assert!(result.is_error);
        assert_eq!(result.content, "Error in web_search: HTTP 401");
    }

    #[tokio::test]
    async fn missing_query_is_rejected() {
        let server = MockServer::start().await;
        let err = tool(&server)
            .execute(json!({}), ToolContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, NexusError::ToolValidation(_)));
    }
}
