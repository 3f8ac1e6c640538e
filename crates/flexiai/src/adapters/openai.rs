use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use flexiai_config::ProviderConfig;
use flexiai_core::{FinishReason, FlexiError, Result, Role, UnifiedRequest, UnifiedResponse, Usage};

use crate::provider::{Provider, classify_status, transport_error};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// OpenAI chat-completions adapter.
pub struct OpenAiAdapter {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiAdapter {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| FlexiError::Configuration(format!("http client: {e}")))?;
        let base_url = config
            .extra_config
            .get("base_url")
            .and_then(|v| v.as_str())
            .unwrap_or(DEFAULT_BASE_URL)
            .to_string();
        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url,
            model: config.model.clone().unwrap_or_else(|| DEFAULT_MODEL.into()),
        })
    }

    fn build_request_body(&self, request: &UnifiedRequest, model: &str) -> serde_json::Value {
        let messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .map(|msg| {
                let role = match msg.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    // Tool transcripts arrive without call ids in the unified
                    // model, so they travel as user turns.
                    Role::Tool => "user",
                };
                serde_json::json!({"role": role, "content": msg.content})
            })
            .collect();

        let mut body = serde_json::json!({
            "model": model,
            "messages": messages,
        });
        if let Some(t) = request.temperature {
            body["temperature"] = serde_json::json!(t);
        }
        if let Some(m) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(m);
        }
        for (k, v) in &request.extra {
            body[k.as_str()] = v.clone();
        }
        body
    }

    fn parse_response(&self, model: &str, data: serde_json::Value) -> UnifiedResponse {
        let content = data["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        let usage = Usage::new(
            data["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32,
            data["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32,
        );
        let finish_reason = match data["choices"][0]["finish_reason"].as_str() {
            Some("stop") => FinishReason::Stop,
            Some("length") => FinishReason::Length,
            Some("content_filter") => FinishReason::ContentFilter,
            Some("tool_calls") => FinishReason::ToolCall,
            _ => FinishReason::Stop,
        };
        UnifiedResponse {
            content,
            provider: "openai".into(),
            model: model.to_string(),
            usage,
            finish_reason,
            raw: data,
        }
    }
}

#[async_trait]
impl Provider for OpenAiAdapter {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn invoke(&self, request: &UnifiedRequest) -> Result<UnifiedResponse> {
        let model = request.model.clone().unwrap_or_else(|| self.model.clone());
        let body = self.build_request_body(request, &model);
        debug!(model = %model, "sending OpenAI API request");

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error("openai", e))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            return Err(classify_status("openai", status, &text));
        }

        let data: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| transport_error("openai", e))?;
        Ok(self.parse_response(&model, data))
    }

    async fn health_check(&self) -> bool {
        self.client
            .get(format!("{}/models", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}
