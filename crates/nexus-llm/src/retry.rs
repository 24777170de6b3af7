use std::time::Duration;

use futures::future::BoxFuture;
use tracing::{info, warn};

use nexus_core::config::{ModelConfig, RetryConfig};
use nexus_core::error::{NexusError, Result};
use nexus_core::traits::LlmClient;
use nexus_core::types::*;

/// An LLM client that retries failed requests and falls back to alternative providers.
pub struct RetryingClient {
    primary: Box<dyn LlmClient>,
    fallbacks: Vec<(ModelConfig, Box<dyn LlmClient>)>,
    retry_config: RetryConfig,
}

impl RetryingClient {
    pub fn new(
        primary: Box<dyn LlmClient>,
        fallbacks: Vec<(ModelConfig, Box<dyn LlmClient>)>,
        retry_config: RetryConfig,
    ) -> Self {
        Self {
            primary,
            fallbacks,
            retry_config,
        }
    }
}

fn is_retryable(e: &NexusError) -> bool {
    match e {
        NexusError::LlmRequest(msg) => {
            msg.contains("429")
                || msg.contains("500")
                || msg.contains("502")
                || msg.contains("503")
                || msg.contains("timeout")
                || msg.contains("connection")
        }
        _ => false,
    }
}

fn calculate_backoff(attempt: u32, config: &RetryConfig) -> Duration {
    let ms = (config.initial_backoff_ms * 2u64.pow(attempt)).min(config.max_backoff_ms);
    // Jitter: 0.8x to 1.2x
    let jitter = 0.8 + rand::random::<f64>() * 0.4;
    Duration::from_millis((ms as f64 * jitter) as u64)
}

impl LlmClient for RetryingClient {
    fn chat(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
        tools: &[ToolDefinition],
    ) -> BoxFuture<'_, Result<ChatResponse>> {
        let config = config.clone();
        let tools = tools.to_vec();

        Box::pin(async move {
            let max_retries = self.retry_config.max_retries;

            let mut last_err = None;
            for attempt in 0..=max_retries {
                match self.primary.chat(&config, messages.clone(), &tools).await {
                    Ok(reply) => return Ok(reply),
                    Err(e) => {
                        if is_retryable(&e) && attempt < max_retries {
                            let backoff = calculate_backoff(attempt, &self.retry_config);
                            warn!(
                                attempt = attempt + 1,
                                max_retries,
                                backoff_ms = backoff.as_millis() as u64,
                                error = %e,
                                "Retrying LLM request"
                            );
                            tokio::time::sleep(backoff).await;
                            last_err = Some(e);
                            continue;
                        }
                        last_err = Some(e);
                        break;
                    }
                }
            }

            if !self.fallbacks.is_empty() {
                info!("Primary LLM exhausted, trying fallback models");
            }
            for (fb_config, fb_client) in &self.fallbacks {
                match fb_client.chat(fb_config, messages.clone(), &tools).await {
                    Ok(reply) => {
                        info!(
                            model = %fb_config.model_id,
                            provider = %fb_config.provider,
                            "Fell back to alternative model"
                        );
                        return Ok(reply);
                    }
                    Err(e) => {
                        warn!(
                            model = %fb_config.model_id,
                            error = %e,
                            "Fallback model also failed"
                        );
                    }
                }
            }

            Err(last_err.unwrap_or_else(|| NexusError::LlmRequest("All providers failed".into())))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_test_utils::{test_model_config, MockLlmClient};

    fn fast_retry(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        }
    }

    #[tokio::test]
    async fn retries_transient_errors_then_succeeds() {
        let primary = MockLlmClient::new()
            .with_error(NexusError::LlmRequest("HTTP 503: overloaded".into()))
            .with_text("recovered");
        let recorded = primary.clone();
        let client = RetryingClient::new(Box::new(primary), vec![], fast_retry(2));

        let reply = client
            .chat(&test_model_config(), vec![ChatMessage::user("hi")], &[])
            .await
            .unwrap();
        assert_eq!(reply.message.text(), "recovered");
        assert_eq!(recorded.call_count(), 2);
    }

    #[tokio::test]
    async fn non_retryable_errors_go_straight_to_fallback() {
        let primary = MockLlmClient::new()
            .with_error(NexusError::Config("Gemini: api_key is required".into()));
        let recorded = primary.clone();
        let fallback = MockLlmClient::new().with_text("from fallback");
        let client = RetryingClient::new(
            Box::new(primary),
            vec![(test_model_config(), Box::new(fallback))],
            fast_retry(3),
        );

        let reply = client
            .chat(&test_model_config(), vec![ChatMessage::user("hi")], &[])
            .await
            .unwrap();
        assert_eq!(reply.message.text(), "from fallback");
        assert_eq!(recorded.call_count(), 1);
    }

    #[tokio::test]
    async fn last_primary_error_surfaces_when_everything_fails() {
        let primary = MockLlmClient::new()
            .with_error(NexusError::LlmRequest("HTTP 429: slow down".into()))
            .with_error(NexusError::LlmRequest("HTTP 429: still slow".into()));
        let client = RetryingClient::new(Box::new(primary), vec![], fast_retry(1));

        let err = client
            .chat(&test_model_config(), vec![ChatMessage::user("hi")], &[])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("still slow"));
    }

    #[test]
    fn backoff_is_capped() {
        let config = RetryConfig {
            max_retries: 10,
            initial_backoff_ms: 1000,
            max_backoff_ms: 4000,
        };
        let d = calculate_backoff(8, &config);
        assert!(d <= Duration::from_millis(4800));
        assert!(d >= Duration::from_millis(3200));
    }
}
