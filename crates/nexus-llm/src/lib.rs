pub mod providers;
pub mod retry;

use nexus_core::config::AppConfig;
use nexus_core::config::ModelConfig;
use nexus_core::error::{NexusError, Result};
use nexus_core::traits::LlmClient;

pub use providers::gemini::GeminiClient;
pub use providers::openai::OpenAiClient;
pub use retry::RetryingClient;

/// Providers reached through the OpenAI chat completions dialect.
const OPENAI_COMPATIBLE: &[&str] = &[
    "openai",
    "azure",
    "ollama",
    "groq",
    "openrouter",
    "together",
    "deepseek",
    "mistral",
];

/// Create an LLM client based on the provider name.
pub fn create_client(config: &ModelConfig, http: reqwest::Client) -> Result<Box<dyn LlmClient>> {
    let provider = config.provider.trim().to_ascii_lowercase();
    match provider.as_str() {
        "gemini" | "google" => Ok(Box::new(GeminiClient::new(http))),
        p if OPENAI_COMPATIBLE.contains(&p) => Ok(Box::new(OpenAiClient::new(http))),
        _ => Err(NexusError::UnsupportedProvider(config.provider.clone())),
    }
}

/// Primary model wrapped with retry, plus any configured fallbacks.
pub fn create_retrying_client(config: &AppConfig, http: reqwest::Client) -> Result<RetryingClient> {
    let primary = create_client(&config.model, http.clone())?;
    let fallbacks = config
        .fallback_models
        .iter()
        .map(|fb| Ok((fb.clone(), create_client(fb, http.clone())?)))
        .collect::<Result<Vec<_>>>()?;
    Ok(RetryingClient::new(
        primary,
        fallbacks,
        config.model.retry.clone().unwrap_or_default(),
    ))
}
