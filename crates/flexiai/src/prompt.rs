use flexiai_core::{ChatMessage, Result, UnifiedRequest};

use crate::client::FlexiAI;

/// Reusable prompt template: a named call site with fixed system message and
/// sampling knobs, invoked with just the user input.
///
/// ```no_run
/// # async fn demo(client: flexiai::FlexiAI) -> flexiai::Result<()> {
/// let summarize = flexiai::Prompt::new("summarize")
///     .system("You are a concise technical summarizer.")
///     .temperature(0.2);
/// let answer = summarize.call(&client, "Summarize: Rust ownership…").await?;
/// # Ok(()) }
/// ```
#[derive(Debug, Clone)]
pub struct Prompt {
    name: String,
    system: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    model: Option<String>,
    provider: Option<String>,
}

impl Prompt {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            system: None,
            temperature: None,
            max_tokens: None,
            model: None,
            provider: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Pin to one provider (disables failover for calls through this prompt).
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// The request this prompt produces for `input`, without sending it.
    pub fn request(&self, input: impl Into<String>) -> UnifiedRequest {
        let mut messages = Vec::new();
        if let Some(system) = &self.system {
            messages.push(ChatMessage::system(system.clone()));
        }
        messages.push(ChatMessage::user(input));
        UnifiedRequest {
            messages,
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            provider: self.provider.clone(),
            ..Default::default()
        }
    }

    /// Send `input` through `client` and return the response text.
    pub async fn call(&self, client: &FlexiAI, input: impl Into<String>) -> Result<String> {
        let response = client.chat_completion(self.request(input)).await?;
        Ok(response.content)
    }
}
