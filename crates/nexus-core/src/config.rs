use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{NexusError, Result};

/// Top-level Nexus configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub agent: AgentConfig,
    pub model: ModelConfig,
    #[serde(default)]
    pub fallback_models: Vec<ModelConfig>,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub services: ServicesConfig,
    #[serde(default)]
    pub web_search: Option<WebSearchConfig>,
    #[serde(default)]
    pub mcp: Option<McpConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
    #[serde(default = "default_max_duration")]
    pub max_duration_secs: u64,
    /// Tool output beyond this many characters is cut before reaching the model.
    #[serde(default = "default_max_tool_output_chars")]
    pub max_tool_output_chars: usize,
    #[serde(default = "default_parallel_tools")]
    pub parallel_tools: bool,
    /// How many times a final answer that fails schema validation is sent back.
    #[serde(default = "default_output_retries")]
    pub output_retries: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            max_duration_secs: default_max_duration(),
            max_tool_output_chars: default_max_tool_output_chars(),
            parallel_tools: default_parallel_tools(),
            output_retries: default_output_retries(),
        }
    }
}

fn default_max_turns() -> usize { 15 }
fn default_max_duration() -> u64 { 300 }
fn default_max_tool_output_chars() -> usize { 12_000 }
fn default_parallel_tools() -> bool { true }
fn default_output_retries() -> u32 { 5 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

fn default_provider() -> String { "gemini".to_string() }
fn default_model_id() -> String { "gemini-2.5-flash".to_string() }
fn default_max_tokens() -> u32 { 8192 }
fn default_temperature() -> f32 { 0.0 }

/// Retry configuration for LLM requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_retries() -> u32 { 3 }
fn default_initial_backoff() -> u64 { 1000 }
fn default_max_backoff() -> u64 { 30000 }

/// Redis connection and key lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
    /// TTL applied to history and workflow keys on every write and read.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            ttl_secs: default_ttl_secs(),
        }
    }
}

fn default_redis_url() -> String { "redis://127.0.0.1:6379".to_string() }
fn default_ttl_secs() -> u64 { 86_400 }

/// External HTTP services used by tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    /// Base URL of the nexus helper service (scrape, RAG, scheme research).
    #[serde(default)]
    pub nexus_base_url: Option<String>,
    #[serde(default)]
    pub perplexity: Option<PerplexityConfig>,
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
    /// Pause after handing a research report to the RAG store, so it is indexed
    /// before the agent queries it.
    #[serde(default = "default_ingest_delay")]
    pub research_ingest_delay_secs: u64,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            nexus_base_url: None,
            perplexity: None,
            http_timeout_secs: default_http_timeout(),
            research_ingest_delay_secs: default_ingest_delay(),
        }
    }
}

fn default_http_timeout() -> u64 { 60 }
fn default_ingest_delay() -> u64 { 10 }

/// Perplexity-compatible chat completion endpoint for market prices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerplexityConfig {
    /// Full chat completions URL, e.g. `https://api.perplexity.ai/chat/completions`.
    pub base_url: String,
    pub api_key: String,
    #[serde(default = "default_perplexity_model")]
    pub model: String,
}

fn default_perplexity_model() -> String { "sonar-pro".to_string() }

/// Web search provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSearchConfig {
    #[serde(default = "default_search_provider")]
    pub provider: String,
    pub api_key: String,
    #[serde(default = "default_search_country")]
    pub country: String,
}

fn default_search_provider() -> String { "tavily".to_string() }
fn default_search_country() -> String { "india".to_string() }

/// MCP (Model Context Protocol) configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpConfig {
    #[serde(default)]
    pub servers: HashMap<String, McpServerConfig>,
}

/// Configuration for a single MCP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    pub transport: McpTransport,
    #[serde(default = "default_auto_connect")]
    pub auto_connect: bool,
    /// Per-tool-call timeout in seconds.
    #[serde(default = "default_mcp_timeout")]
    pub timeout_secs: u64,
}

fn default_auto_connect() -> bool { true }
fn default_mcp_timeout() -> u64 { 30 }

/// MCP transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum McpTransport {
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
    Http {
        url: String,
    },
}

impl McpServerConfig {
    /// The bundled calculator, served by this same binary over stdio.
    pub fn bundled_calculator(command: impl Into<String>) -> Self {
        Self {
            transport: McpTransport::Stdio {
                command: command.into(),
                args: vec!["calculator".to_string()],
                env: HashMap::new(),
            },
            auto_connect: true,
            timeout_secs: default_mcp_timeout(),
        }
    }
}

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| NexusError::ConfigNotFound(path.display().to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse TOML text after expanding `${ENV_VAR}` references.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content);
        let config: Self =
            toml::from_str(&expanded).map_err(|e| NexusError::Config(e.to_string()))?;
        // SETEX refuses a zero expiry.
        if config.redis.ttl_secs == 0 {
            return Err(NexusError::Config("redis.ttl_secs must be positive".into()));
        }
        Ok(config)
    }

    /// Build a config purely from environment variables. Used when no config
    /// file exists. Values are only checked for presence, never validated.
    pub fn from_env() -> Self {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    pub fn from_env_with(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let model = ModelConfig {
            provider: get("NEXUS_LLM_PROVIDER").unwrap_or_else(default_provider),
            model_id: get("NEXUS_MODEL_ID").unwrap_or_else(default_model_id),
            api_key: get("GOOGLE_API_KEY").or_else(|| get("NEXUS_LLM_API_KEY")),
            base_url: get("NEXUS_LLM_BASE_URL"),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            retry: None,
        };

        let mut redis = RedisConfig::default();
        if let Some(url) = get("REDIS_URL") {
            redis.url = url;
        }
        if let Some(ttl) = get("MESSAGE_EXPIRY_SECONDS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|ttl| *ttl > 0)
        {
            redis.ttl_secs = ttl;
        }

        let perplexity = match (get("PERPLEXITY_BASE_URL"), get("PERPLEXITY_API_KEY")) {
            (Some(base_url), Some(api_key)) => Some(PerplexityConfig {
                base_url,
                api_key,
                model: default_perplexity_model(),
            }),
            _ => None,
        };

        let web_search = get("TAVILY_API_KEY").map(|api_key| WebSearchConfig {
            provider: default_search_provider(),
            api_key,
            country: default_search_country(),
        });

        Self {
            agent: AgentConfig::default(),
            model,
            fallback_models: Vec::new(),
            redis,
            services: ServicesConfig {
                nexus_base_url: get("NEXUS_SERVICE_BASE_URL"),
                perplexity,
                ..Default::default()
            },
            web_search,
            mcp: None,
        }
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                // Leave unset references in place
                Err(_) => result.push_str(&format!("${{{}}}", var_name)),
            }
        } else {
            result.push(c);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("TEST_NEXUS_VAR", "hello");
        let result = expand_env_vars("key = \"${TEST_NEXUS_VAR}\"");
        assert_eq!(result, "key = \"hello\"");
        std::env::remove_var("TEST_NEXUS_VAR");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("key = \"${NONEXISTENT_NEXUS_VAR}\"");
        assert_eq!(result, "key = \"${NONEXISTENT_NEXUS_VAR}\"");
    }

    #[test]
    fn test_defaults_from_minimal_toml() {
        let config = AppConfig::from_toml_str(
            r#"
[model]
model_id = "gemini-2.5-flash"
"#,
        )
        .unwrap();
        assert_eq!(config.model.provider, "gemini");
        assert_eq!(config.agent.max_turns, 15);
        assert_eq!(config.agent.output_retries, 5);
        assert!(config.agent.parallel_tools);
        assert_eq!(config.redis.ttl_secs, 86_400);
        assert_eq!(config.services.research_ingest_delay_secs, 10);
        assert!(config.web_search.is_none());
        assert!(config.mcp.is_none());
    }

    #[test]
    fn test_services_and_mcp_sections() {
        let config = AppConfig::from_toml_str(
            r#"
[model]
model_id = "gemini-2.5-flash"

[redis]
url = "redis://cache:6379/2"
ttl_secs = 3600

[services]
nexus_base_url = "http://nexus:8000"

[services.perplexity]
base_url = "https://api.perplexity.ai"
api_key = "pplx-test"

[web_search]
api_key = "tvly-test"

[mcp.servers.calculator]
transport = { type = "stdio", command = "nexus", args = ["calculator"] }
"#,
        )
        .unwrap();
        assert_eq!(config.redis.url, "redis://cache:6379/2");
        assert_eq!(config.redis.ttl_secs, 3600);
        assert_eq!(config.services.perplexity.unwrap().model, "sonar-pro");
        assert_eq!(config.web_search.unwrap().country, "india");
        let mcp = config.mcp.unwrap();
        match &mcp.servers["calculator"].transport {
            McpTransport::Stdio { command, args, .. } => {
                assert_eq!(command, "nexus");
                assert_eq!(args, &vec!["calculator".to_string()]);
            }
            other => panic!("unexpected transport: {other:?}"),
        }
    }

    #[test]
    fn test_from_env_reads_known_variables() {
        let vars: HashMap<&str, &str> = [
            ("GOOGLE_API_KEY", "g-key"),
            ("TAVILY_API_KEY", "t-key"),
            ("NEXUS_SERVICE_BASE_URL", "http://localhost:8000"),
            ("PERPLEXITY_BASE_URL", "https://api.perplexity.ai"),
            ("PERPLEXITY_API_KEY", "p-key"),
            ("MESSAGE_EXPIRY_SECONDS", "600"),
        ]
        .into_iter()
        .collect();
        let config = AppConfig::from_env_with(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.model.provider, "gemini");
        assert_eq!(config.model.model_id, "gemini-2.5-flash");
        assert_eq!(config.model.api_key.as_deref(), Some("g-key"));
        assert_eq!(config.redis.ttl_secs, 600);
        assert_eq!(config.web_search.unwrap().api_key, "t-key");
        assert_eq!(
            config.services.nexus_base_url.as_deref(),
            Some("http://localhost:8000")
        );
        assert!(config.services.perplexity.is_some());
    }

    #[test]
    fn test_zero_ttl_is_rejected() {
        let err = AppConfig::from_toml_str("[redis]\nttl_secs = 0\n").unwrap_err();
        assert!(matches!(err, NexusError::Config(ref m) if m.contains("ttl_secs")));

        let config = AppConfig::from_env_with(|k| match k {
            "MESSAGE_EXPIRY_SECONDS" => Some("0".to_string()),
            _ => None,
        });
        assert_eq!(config.redis.ttl_secs, 86_400);
    }

    #[test]
    fn test_from_env_skips_blank_values() {
        let config = AppConfig::from_env_with(|k| match k {
            "TAVILY_API_KEY" => Some("  ".to_string()),
            _ => None,
        });
        assert!(config.web_search.is_none());
        assert!(config.services.perplexity.is_none());
        assert_eq!(config.redis.url, "redis://127.0.0.1:6379");
    }
}
