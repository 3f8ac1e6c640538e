use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use flexiai_config::ProviderConfig;
use flexiai_core::{FinishReason, FlexiError, Result, Role, UnifiedRequest, UnifiedResponse, Usage};

use crate::provider::{Provider, classify_status, transport_error};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const DEFAULT_MODEL: &str = "claude-3-5-haiku-20241022";
const API_VERSION: &str = "2024-10-22";
/// The messages API requires max_tokens; used when the request omits it.
const FALLBACK_MAX_TOKENS: u32 = 1024;

/// Anthropic Claude messages adapter.
pub struct AnthropicAdapter {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl AnthropicAdapter {
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
        // System turns move to the top-level "system" field.
        let system: Vec<&str> = request
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();

        let messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|msg| {
                let role = match msg.role {
                    Role::Assistant => "assistant",
                    _ => "user",
                };
                serde_json::json!({"role": role, "content": msg.content})
            })
            .collect();

        let mut body = serde_json::json!({
            "model": model,
            "max_tokens": request.max_tokens.unwrap_or(FALLBACK_MAX_TOKENS),
            "messages": messages,
        });
        if !system.is_empty() {
            body["system"] = serde_json::json!(system.join("\n"));
        }
        if let Some(t) = request.temperature {
            body["temperature"] = serde_json::json!(t);
        }
        for (k, v) in &request.extra {
            body[k.as_str()] = v.clone();
        }
        body
    }

    fn parse_response(&self, model: &str, data: serde_json::Value) -> UnifiedResponse {
        let content = data["content"]
            .as_array()
            .map(|blocks| {
                blocks
                    .iter()
                    .filter_map(|b| {
                        if b["type"] == "text" {
                            b["text"].as_str()
                        } else {
                            None
                        }
                    })
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();
        let usage = Usage::new(
            data["usage"]["input_tokens"].as_u64().unwrap_or(0) as u32,
            data["usage"]["output_tokens"].as_u64().unwrap_or(0) as u32,
        );
        let finish_reason = match data["stop_reason"].as_str() {
            Some("end_turn") | Some("stop_sequence") => FinishReason::Stop,
            Some("max_tokens") => FinishReason::Length,
            Some("refusal") => FinishReason::ContentFilter,
            Some("tool_use") => FinishReason::ToolCall,
            _ => FinishReason::Stop,
        };
        UnifiedResponse {
            content,
            provider: "anthropic".into(),
            model: model.to_string(),
            usage,
            finish_reason,
            raw: data,
        }
    }
}

#[async_trait]
impl Provider for AnthropicAdapter {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn invoke(&self, request: &UnifiedRequest) -> Result<UnifiedResponse> {
        let model = request.model.clone().unwrap_or_else(|| self.model.clone());
        let body = self.build_request_body(request, &model);
        debug!(model = %model, "sending Anthropic API request");

        let resp = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error("anthropic", e))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            return Err(classify_status("anthropic", status, &text));
        }

        let data: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| transport_error("anthropic", e))?;
        Ok(self.parse_response(&model, data))
    }

    async fn health_check(&self) -> bool {
        self.client
            .get(format!("{}/models", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}
