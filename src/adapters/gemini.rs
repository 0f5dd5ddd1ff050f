use crate::adapters::llm::{
    http_client, send_with_retry, LLMAdapter, LLMRequest, LLMResponse, ModelConfig, Usage,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiAdapter {
    client: Client,
    config: ModelConfig,
    api_key: String,
    base_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    system_instruction: Instruction,
    contents: Vec<Turn>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Instruction {
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Turn {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: usize,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
    model_version: Option<String>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Turn>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: usize,
    #[serde(default)]
    candidates_token_count: usize,
    #[serde(default)]
    total_token_count: usize,
}

impl GeminiAdapter {
    pub fn new(config: ModelConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .context("Gemini API key not configured. Set gemini_api_key or GEMINI_API_KEY")?;

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
impl LLMAdapter for GeminiAdapter {
    async fn complete(&self, request: LLMRequest) -> Result<LLMResponse> {
        let body = GenerateRequest {
            system_instruction: Instruction {
                parts: vec![Part {
                    text: Some(request.system_prompt),
                }],
            },
            contents: vec![Turn {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: Some(request.user_prompt),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: request.temperature.unwrap_or(self.config.temperature),
                max_output_tokens: request.max_tokens.unwrap_or(self.config.max_tokens),
            },
        };

        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url, self.config.model_name
        );
        let response = send_with_retry("Gemini", || {
            self.client
                .post(&url)
                .header("x-goog-api-key", &self.api_key)
                .json(&body)
        })
        .await
        .context("Failed to send request to Gemini")?;

        let parsed: GenerateResponse = response
            .json()
            .await
            .context("Failed to parse Gemini response")?;

        let content = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|turn| {
                turn.parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        Ok(LLMResponse {
            content,
            model: parsed
                .model_version
                .unwrap_or_else(|| self.config.model_name.clone()),
            usage: parsed.usage_metadata.map(|usage| Usage {
                prompt_tokens: usage.prompt_token_count,
                completion_tokens: usage.candidates_token_count,
                total_tokens: usage.total_token_count,
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

    #[tokio::test]
    async fn test_generate_content() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/models/gemini-2.0-flash:generateContent")
            .match_header("x-goog-api-key", "g-key")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "systemInstruction": {"parts": [{"text": "sys"}]},
                "contents": [{"role": "user", "parts": [{"text": "prompt"}]}],
                "generationConfig": {"maxOutputTokens": 4000}
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"{\"summary\":"},{"text":"\"ok\"}"}]}}],"usageMetadata":{"promptTokenCount":2,"candidatesTokenCount":3,"totalTokenCount":5}}"#)
            .create_async()
            .await;

        let adapter = GeminiAdapter::new(ModelConfig {
            api_key: Some("g-key".into()),
            base_url: Some(server.url()),
            ..ModelConfig::for_provider(Provider::Gemini)
        })
        .unwrap();
        let response = adapter
            .complete(LLMRequest {
                system_prompt: "sys".into(),
                user_prompt: "prompt".into(),
                temperature: None,
                max_tokens: None,
            })
            .await
            .unwrap();

        assert_eq!(response.content, r#"{"summary":"ok"}"#);
        assert_eq!(response.model, "gemini-2.0-flash");
        assert_eq!(response.usage.unwrap().total_tokens, 5);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_empty_candidates_yield_empty_content() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/models/gemini-2.0-flash:generateContent")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"candidates":[]}"#)
            .create_async()
            .await;

        let adapter = GeminiAdapter::new(ModelConfig {
            api_key: Some("g".into()),
            base_url: Some(server.url()),
            ..ModelConfig::for_provider(Provider::Gemini)
        })
        .unwrap();
        let response = adapter
            .complete(LLMRequest {
                system_prompt: String::new(),
                user_prompt: String::new(),
                temperature: None,
                max_tokens: None,
            })
            .await
            .unwrap();
        assert!(response.content.is_empty());
        assert!(response.usage.is_none());
    }
}
