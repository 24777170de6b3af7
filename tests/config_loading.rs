use std::io::Write;

use nexus_core::config::{AppConfig, McpTransport};
use nexus_core::error::NexusError;

#[test]
fn test_load_full_config_from_file() {
    let toml_content = r#"
[agent]
max_turns = 10
output_retries = 2

[model]
provider = "gemini"
model_id = "gemini-2.5-flash"
api_key = "test-google-key"
max_tokens = 4096
temperature = 0.5

[[fallback_models]]
provider = "openai"
model_id = "gpt-4o-mini"
api_key = "sk-fallback"

[redis]
url = "redis://cache:6380/2"
ttl_secs = 600

[services]
nexus_base_url = "http://nexus-service:8000"
research_ingest_delay_secs = 0

[services.perplexity]
base_url = "https://api.perplexity.ai/chat/completions"
api_key = "pplx-test"

[web_search]
api_key = "tvly-test"

[mcp.servers.weather]
auto_connect = false

[mcp.servers.weather.transport]
type = "http"
url = "http://localhost:9000/mcp"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.agent.max_turns, 10);
    assert_eq!(config.agent.output_retries, 2);
    assert_eq!(config.model.provider, "gemini");
    assert_eq!(config.model.api_key, Some("test-google-key".to_string()));
    assert_eq!(config.model.max_tokens, 4096);
    assert_eq!(config.fallback_models.len(), 1);
    assert_eq!(config.fallback_models[0].provider, "openai");

    assert_eq!(config.redis.url, "redis://cache:6380/2");
    assert_eq!(config.redis.ttl_secs, 600);

    assert_eq!(
        config.services.nexus_base_url.as_deref(),
        Some("http://nexus-service:8000")
    );
    assert_eq!(config.services.research_ingest_delay_secs, 0);
    assert_eq!(config.services.http_timeout_secs, 60);
    let pplx = config.services.perplexity.expect("perplexity present");
    assert_eq!(pplx.model, "sonar-pro");

    let ws = config.web_search.expect("web search present");
    assert_eq!(ws.provider, "tavily");
    assert_eq!(ws.country, "india");

    let mcp = config.mcp.expect("mcp present");
    let weather = &mcp.servers["weather"];
    assert!(!weather.auto_connect);
    assert!(matches!(&weather.transport, McpTransport::Http { url } if url.ends_with("/mcp")));
}

#[test]
fn test_env_var_expansion_in_config() {
    std::env::set_var("NEXUS_TEST_GOOGLE_KEY", "expanded-key-value");

    let toml_content = r#"
[model]
model_id = "gemini-2.5-flash"
api_key = "${NEXUS_TEST_GOOGLE_KEY}"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");
    assert_eq!(config.model.api_key, Some("expanded-key-value".to_string()));

    std::env::remove_var("NEXUS_TEST_GOOGLE_KEY");
}

#[test]
fn test_minimal_config_uses_defaults() {
    let toml_content = r#"
[model]
model_id = "gemini-2.5-flash"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.model.provider, "gemini");
    assert_eq!(config.agent.max_turns, 15);
    assert_eq!(config.agent.max_duration_secs, 300);
    assert_eq!(config.agent.output_retries, 5);
    assert!(config.agent.parallel_tools);
    assert_eq!(config.redis.ttl_secs, 86_400);
    assert_eq!(config.services.research_ingest_delay_secs, 10);
    assert!(config.services.nexus_base_url.is_none());
    assert!(config.web_search.is_none());
    assert!(config.mcp.is_none());
}

#[test]
fn test_missing_file_is_config_not_found() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = AppConfig::load(&dir.path().join("nexus.toml")).unwrap_err();
    assert!(matches!(err, NexusError::ConfigNotFound(_)));
}

#[test]
fn test_example_config_parses() {
    let config = AppConfig::from_toml_str(include_str!("../nexus.toml.example"))
        .expect("example config parses");
    assert_eq!(config.model.model_id, "gemini-2.5-flash");
    assert_eq!(config.model.retry.as_ref().map(|r| r.max_retries), Some(3));
    assert!(config.services.perplexity.is_some());
    assert!(config.mcp.is_none());
}

#[test]
fn test_written_config_round_trips() {
    let (_dir, path) = nexus_test_utils::write_config(
        "[model]\nmodel_id = \"gemini-2.5-flash\"\n\n[redis]\nttl_secs = 120\n",
    );
    let config = AppConfig::load(&path).expect("load config");
    let rendered = toml::to_string_pretty(&config).expect("render config");
    let again = AppConfig::from_toml_str(&rendered).expect("reparse config");
    assert_eq!(again.redis.ttl_secs, 120);
    assert_eq!(again.model.model_id, config.model.model_id);
}
