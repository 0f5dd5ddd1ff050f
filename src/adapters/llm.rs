use anyhow::Result;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Claude,
    OpenAI,
    Gemini,
}

impl Provider {
    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::Claude => "claude-sonnet-4-5",
            Provider::OpenAI => "gpt-4o",
            Provider::Gemini => "gemini-2.0-flash",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Claude => "claude",
            Provider::OpenAI => "openai",
            Provider::Gemini => "gemini",
        }
    }
}

impl std::str::FromStr for Provider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "claude" | "anthropic" => Ok(Provider::Claude),
            "openai" => Ok(Provider::OpenAI),
            "gemini" => Ok(Provider::Gemini),
            other => anyhow::bail!("Unknown AI provider: {}", other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub provider: Provider,
    pub model_name: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub temperature: f32,
    pub max_tokens: usize,
}

impl ModelConfig {
    pub fn for_provider(provider: Provider) -> Self {
        Self {
            provider,
            model_name: provider.default_model().to_string(),
            ..Self::default()
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: Provider::Claude,
            model_name: Provider::Claude.default_model().to_string(),
            api_key: None,
            base_url: None,
            temperature: 0.2,
            max_tokens: 4000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMResponse {
    pub content: String,
    pub model: String,
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

#[async_trait]
pub trait LLMAdapter: Send + Sync {
    async fn complete(&self, request: LLMRequest) -> Result<LLMResponse>;
    fn model_name(&self) -> &str;
}

pub fn create_adapter(config: &ModelConfig) -> Result<Box<dyn LLMAdapter>> {
    match config.provider {
        Provider::Claude => Ok(Box::new(crate::adapters::AnthropicAdapter::new(
            config.clone(),
        )?)),
        Provider::OpenAI => Ok(Box::new(crate::adapters::OpenAIAdapter::new(config.clone())?)),
        Provider::Gemini => Ok(Box::new(crate::adapters::GeminiAdapter::new(config.clone())?)),
    }
}

const MAX_RETRIES: usize = 2;
const BASE_DELAY_MS: u64 = 250;

/// Sends a request, retrying rate limits, server errors and transport failures.
pub(crate) async fn send_with_retry<F>(vendor: &str, mut make_request: F) -> Result<reqwest::Response>
where
    F: FnMut() -> reqwest::RequestBuilder,
{
    for attempt in 0..=MAX_RETRIES {
        let delay = retry_delay(attempt);
        match make_request().send().await {
            Ok(response) => {
                if response.status().is_success() {
                    return Ok(response);
                }

                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                if is_retryable_status(status) && attempt < MAX_RETRIES {
                    debug!(vendor, %status, attempt, "Retrying LLM request");
                    sleep(delay).await;
                    continue;
                }

                anyhow::bail!("{} API error ({}): {}", vendor, status, body);
            }
            Err(err) => {
                if attempt < MAX_RETRIES {
                    debug!(vendor, error = %err, attempt, "Retrying LLM request");
                    sleep(delay).await;
                    continue;
                }
                return Err(err.into());
            }
        }
    }

    anyhow::bail!("{} request failed after retries", vendor);
}

/// Exponential backoff: 250 ms, 500 ms, 1 s, ...
fn retry_delay(attempt: usize) -> Duration {
    let factor = 1u64.checked_shl(attempt as u32).unwrap_or(u64::MAX);
    Duration::from_millis(BASE_DELAY_MS.saturating_mul(factor))
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

pub(crate) fn http_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(120))
        .build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parsing_and_defaults() {
        assert_eq!("Claude".parse::<Provider>().unwrap(), Provider::Claude);
        assert_eq!("openai".parse::<Provider>().unwrap(), Provider::OpenAI);
        assert!("mistral".parse::<Provider>().is_err());
        assert_eq!(
            ModelConfig::for_provider(Provider::Gemini).model_name,
            "gemini-2.0-flash"
        );
        assert_eq!(ModelConfig::default().max_tokens, 4000);
    }

    #[test]
    fn test_retry_delay_doubles() {
        assert_eq!(retry_delay(0), Duration::from_millis(250));
        assert_eq!(retry_delay(1), Duration::from_millis(500));
        assert_eq!(retry_delay(2), Duration::from_millis(1000));
        assert_eq!(retry_delay(200), Duration::from_millis(u64::MAX));
    }

    #[tokio::test]
    async fn test_send_with_retry_gives_up_after_server_errors() {
        let mut server = mockito::Server::new_async().await;
        let failing = server
            .mock("POST", "/v1/x")
            .with_status(503)
            .expect(3)
            .create_async()
            .await;
        let url = format!("{}/v1/x", server.url());
        let client = reqwest::Client::new();

        let mut calls = 0;
        let result = send_with_retry("Test", || {
            calls += 1;
            client.post(&url)
        })
        .await;

        assert!(result.unwrap_err().to_string().contains("503"));
        assert_eq!(calls, 3);
        failing.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_with_retry_does_not_retry_client_errors() {
        let mut server = mockito::Server::new_async().await;
        let bad_request = server
            .mock("POST", "/v1/x")
            .with_status(400)
            .with_body("bad input")
            .expect(1)
            .create_async()
            .await;
        let url = format!("{}/v1/x", server.url());
        let client = reqwest::Client::new();

        let err = send_with_retry("Test", || client.post(&url)).await.unwrap_err();
        assert!(err.to_string().contains("bad input"));
        bad_request.assert_async().await;
    }
}
