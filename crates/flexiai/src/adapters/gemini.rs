use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use flexiai_config::ProviderConfig;
use flexiai_core::{FinishReason, FlexiError, Result, Role, UnifiedRequest, UnifiedResponse, Usage};

use crate::provider::{Provider, classify_status, transport_error};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// Google Gemini generateContent adapter.
pub struct GeminiAdapter {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiAdapter {
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

    fn build_request_body(&self, request: &UnifiedRequest) -> serde_json::Value {
        // System turns become systemInstruction; assistant turns are "model".
        let system: Vec<&str> = request
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();

        let contents: Vec<serde_json::Value> = request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|msg| {
                let role = match msg.role {
                    Role::Assistant => "model",
                    _ => "user",
                };
                serde_json::json!({"role": role, "parts": [{"text": msg.content}]})
            })
            .collect();

        let mut body = serde_json::json!({ "contents": contents });
        if !system.is_empty() {
            body["systemInstruction"] = serde_json::json!({
                "parts": [{"text": system.join("\n")}]
            });
        }
        let mut generation = serde_json::Map::new();
        if let Some(t) = request.temperature {
            generation.insert("temperature".into(), serde_json::json!(t));
        }
        if let Some(m) = request.max_tokens {
            generation.insert("maxOutputTokens".into(), serde_json::json!(m));
        }
        if !generation.is_empty() {
            body["generationConfig"] = serde_json::Value::Object(generation);
        }
        for (k, v) in &request.extra {
            body[k.as_str()] = v.clone();
        }
        body
    }

    fn parse_response(&self, model: &str, data: serde_json::Value) -> Result<UnifiedResponse> {
        if let Some(reason) = data["promptFeedback"]["blockReason"].as_str() {
            return Err(FlexiError::ContentPolicy {
                provider: "gemini".into(),
                message: format!("prompt blocked: {reason}"),
            });
        }

        let candidate = &data["candidates"][0];
        let finish = candidate["finishReason"].as_str().unwrap_or("STOP");
        let content = candidate["content"]["parts"]
            .as_array()
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p["text"].as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if finish == "SAFETY" && content.is_empty() {
            return Err(FlexiError::ContentPolicy {
                provider: "gemini".into(),
                message: "response blocked by safety filters".into(),
            });
        }

        let usage = Usage::new(
            data["usageMetadata"]["promptTokenCount"].as_u64().unwrap_or(0) as u32,
            data["usageMetadata"]["candidatesTokenCount"].as_u64().unwrap_or(0) as u32,
        );
        let finish_reason = match finish {
            "STOP" => FinishReason::Stop,
            "MAX_TOKENS" => FinishReason::Length,
            "SAFETY" => FinishReason::ContentFilter,
            _ => FinishReason::Stop,
        };
        Ok(UnifiedResponse {
            content,
            provider: "gemini".into(),
            model: model.to_string(),
            usage,
            finish_reason,
            raw: data,
        })
    }
}

#[async_trait]
impl Provider for GeminiAdapter {
    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn invoke(&self, request: &UnifiedRequest) -> Result<UnifiedResponse> {
        let model = request.model.clone().unwrap_or_else(|| self.model.clone());
        let body = self.build_request_body(request);
        debug!(model = %model, "sending Gemini API request");

        let resp = self
            .client
            .post(format!(
                "{}/models/{}:generateContent?key={}",
                self.base_url, model, self.api_key
            ))
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error("gemini", e))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            return Err(classify_status("gemini", status, &text));
        }

        let data: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| transport_error("gemini", e))?;
        self.parse_response(&model, data)
    }

    async fn health_check(&self) -> bool {
        self.client
            .get(format!("{}/models?key={}", self.base_url, self.api_key))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}
