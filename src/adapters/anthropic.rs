use crate::adapters::llm::{
    http_client, send_with_retry, LLMAdapter, LLMRequest, LLMResponse, ModelConfig, Usage,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicAdapter {
    client: Client,
    config: ModelConfig,
    api_key: String,
    base_url: String,
}

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: usize,
    temperature: f32,
    system: String,
}

#[derive(Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<Content>,
    model: String,
    usage: Option<AnthropicUsage>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    text: String,
    #[serde(rename = "type")]
    content_type: String,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: usize,
    output_tokens: usize,
}

impl AnthropicAdapter {
    pub fn new(config: ModelConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .context("Claude API key not configured. Set claude_api_key or ANTHROPIC_API_KEY")?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client: http_client()?,
            config,
            api_key,
            base_url,
        })
    }
}

#[async_trait]
impl LLMAdapter for AnthropicAdapter {
    async fn complete(&self, request: LLMRequest) -> Result<LLMResponse> {
        let anthropic_request = AnthropicRequest {
            model: self.config.model_name.clone(),
            messages: vec![Message {
                role: "user".to_string(),
                content: request.user_prompt,
            }],
            max_tokens: request.max_tokens.unwrap_or(self.config.max_tokens),
            temperature: request.temperature.unwrap_or(self.config.temperature),
            system: request.system_prompt,
        };

        let url = format!("{}/messages", self.base_url);
        let response = send_with_retry("Claude", || {
            self.client
                .post(&url)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", API_VERSION)
                .json(&anthropic_request)
        })
        .await
        .context("Failed to send request to Claude")?;

        let anthropic_response: AnthropicResponse = response
            .json()
            .await
            .context("Failed to parse Claude response")?;

        let content = anthropic_response
            .content
            .iter()
            .filter(|c| c.content_type == "text")
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("");

        Ok(LLMResponse {
            content,
            model: anthropic_response.model,
            usage: anthropic_response.usage.map(|usage| Usage {
                prompt_tokens: usage.input_tokens,
                completion_tokens: usage.output_tokens,
                total_tokens: usage.input_tokens + usage.output_tokens,
            }),
        })
    }

    fn model_name(&self) -> &str {
        &self.config.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::llm::Provider;
    use mockito::Matcher;

    fn config(base_url: String) -> ModelConfig {
        ModelConfig {
            api_key: Some("sk-ant".into()),
            base_url: Some(base_url),
            ..ModelConfig::for_provider(Provider::Claude)
        }
    }

    #[tokio::test]
    async fn test_complete_sends_system_and_joins_text_blocks() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/messages")
            .match_header("x-api-key", "sk-ant")
            .match_header("anthropic-version", API_VERSION)
            .match_body(Matcher::PartialJson(serde_json::json!({
                "model": "claude-sonnet-4-5",
                "system": "be kind",
                "max_tokens": 4000,
                "messages": [{"role": "user", "content": "review this"}]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"model":"claude-sonnet-4-5","content":[{"type":"text","text":"{\"summary\":"},{"type":"tool_use","id":"x"},{"type":"text","text":"\"ok\"}"}],"usage":{"input_tokens":10,"output_tokens":5}}"#,
            )
            .create_async()
            .await;

        let adapter = AnthropicAdapter::new(config(server.url())).unwrap();
        let response = adapter
            .complete(LLMRequest {
                system_prompt: "be kind".into(),
                user_prompt: "review this".into(),
                temperature: None,
                max_tokens: None,
            })
            .await
            .unwrap();

        assert_eq!(response.content, r#"{"summary":"ok"}"#);
        assert_eq!(response.usage.unwrap().total_tokens, 15);
        mock.assert_async().await;
    }

    #[test]
    fn test_missing_key_is_an_error() {
        let mut cfg = config("http://localhost".into());
        cfg.api_key = None;
        assert!(AnthropicAdapter::new(cfg).is_err());
    }
}
