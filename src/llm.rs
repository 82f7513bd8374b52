//! Generator client: one chat completion per request, no internal retries.

use crate::agent_prompts::GenerationRequest;
use crate::error::{AstroError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String, // "system", "user", "assistant"
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Text generator behind SQL generation, repair, judging and explanation.
///
/// Implementations make a single call. Transport failures surface as
/// `GenerationTransport`; the correction agent decides what to retry.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;
}

/// OpenAI-compatible chat completions client
pub struct OpenAiGenerator {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiGenerator {
    pub fn new(api_key: String, base_url: String, model: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AstroError::Config(format!("cannot build generator HTTP client: {}", e)))?;
        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": request.messages(),
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });

        debug!(purpose = ?request.purpose, model = %self.model, "Calling generator");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| AstroError::GenerationTransport(format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AstroError::GenerationTransport(format!(
                "LLM API error ({}): {}",
                status, error_text
            )));
        }

        let response_json: serde_json::Value = response.json().await.map_err(|e| {
            AstroError::GenerationTransport(format!("Failed to parse LLM response: {}", e))
        })?;

        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| AstroError::GenerationTransport("No content in LLM response".to_string()))?;

        Ok(content.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_message_serializes_role_and_content() {
        let json = serde_json::to_value(ChatMessage::user("hi")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "user", "content": "hi"}));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let generator = OpenAiGenerator::new(
            "key".to_string(),
            "http://localhost:8080/v1/".to_string(),
            "gpt-3.5-turbo".to_string(),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(generator.base_url, "http://localhost:8080/v1");
        assert_eq!(generator.model(), "gpt-3.5-turbo");
    }
}
