use crate::domain::ports::TextGenerator;
use crate::utils::error::{EtlError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-5-mini";
pub const SYSTEM_PROMPT: &str = "You are a helpful assistant that creates personalized, professional pitches based on the provided template and information. Keep the tone professional and engaging.";

const PROVIDER: &str = "openai";

/// OpenAI 相容的 chat completions 客戶端
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    /// API key 缺少時直接回傳設定錯誤，不會發出任何請求
    pub fn new(endpoint: &str, api_key: &str, model: &str) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(EtlError::MissingConfigError {
                field: "generation.api_key".to_string(),
            });
        }

        Ok(Self {
            client: Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    fn provider_error(message: impl Into<String>) -> EtlError {
        EtlError::ProviderError {
            provider: PROVIDER.to_string(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl TextGenerator for OpenAiClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.endpoint);
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt }
            ]
        });

        tracing::debug!("📡 POST {} (model {})", url, self.model);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::provider_error(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<serde_json::Value>(&text)
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
                .unwrap_or(text);
            return Err(Self::provider_error(format!(
                "API error ({}): {}",
                status, message
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Self::provider_error(format!("Failed to parse JSON: {}", e)))?;

        json["choices"][0]["message"]["content"]
            .as_str()
            .filter(|content| !content.trim().is_empty())
            .map(str::to_string)
            .ok_or_else(|| Self::provider_error("Response contained no pitch text"))
    }
}
