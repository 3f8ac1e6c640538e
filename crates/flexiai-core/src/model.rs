use serde::{Deserialize, Serialize};

use crate::error::{FlexiError, Result};

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single turn in a conversation, in provider-neutral form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// A provider-neutral chat-completion request.
///
/// Optional fields fall back to the gateway defaults, then to the provider's
/// configured model. Setting `provider` pins the request to one provider and
/// disables failover.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnifiedRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Provider-specific knobs, passed through to the adapter untouched.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl UnifiedRequest {
    /// Build a request from a single user message.
    pub fn from_user(content: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage::user(content)],
            ..Default::default()
        }
    }

    /// Check the construction invariants. A request that fails validation
    /// never reaches any provider.
    pub fn validate(&self) -> Result<()> {
        if self.messages.is_empty() {
            return Err(FlexiError::Validation(
                "request must contain at least one message".into(),
            ));
        }
        for (i, msg) in self.messages.iter().enumerate() {
            if msg.content.is_empty() {
                return Err(FlexiError::Validation(format!(
                    "message {i} has empty content"
                )));
            }
        }
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(FlexiError::Validation(format!(
                    "temperature {t} outside [0.0, 2.0]"
                )));
            }
        }
        if let Some(0) = self.max_tokens {
            return Err(FlexiError::Validation("max_tokens must be positive".into()));
        }
        Ok(())
    }
}

/// Why the provider stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    ToolCall,
    Error,
}

/// Token usage for one completion. `total_tokens` is always
/// `prompt_tokens + completion_tokens`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// A successful, provider-neutral chat completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedResponse {
    pub content: String,
    /// Provider that actually served the request.
    pub provider: String,
    /// Model that actually served the request.
    pub model: String,
    pub usage: Usage,
    pub finish_reason: FinishReason,
    /// The provider's raw payload, kept for debugging.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub raw: serde_json::Value,
}
