//! Mock adapter for deterministic testing.
//!
//! Returns pre-configured replies without making any HTTP calls.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use flexiai_core::{FinishReason, FlexiError, Result, UnifiedRequest, UnifiedResponse, Usage};

use crate::provider::Provider;

#[derive(Clone)]
enum MockFailure {
    Transient(String),
    Auth(String),
    ContentPolicy(String),
}

/// A pre-configured reply from the mock adapter.
#[derive(Clone)]
pub struct MockReply {
    pub content: String,
    pub usage: Usage,
    pub finish_reason: FinishReason,
    failure: Option<MockFailure>,
}

impl Default for MockReply {
    fn default() -> Self {
        Self {
            content: String::new(),
            usage: Usage::new(100, 50),
            finish_reason: FinishReason::Stop,
            failure: None,
        }
    }
}

impl MockReply {
    /// A successful text reply.
    pub fn text(content: &str) -> Self {
        Self {
            content: content.to_string(),
            ..Default::default()
        }
    }

    /// A transient failure (retried, counted by the breaker).
    pub fn transient(message: &str) -> Self {
        Self {
            failure: Some(MockFailure::Transient(message.to_string())),
            ..Default::default()
        }
    }

    /// An authentication failure (fails over, never opens the breaker).
    pub fn auth(message: &str) -> Self {
        Self {
            failure: Some(MockFailure::Auth(message.to_string())),
            ..Default::default()
        }
    }

    /// A content refusal (surfaces to the caller immediately).
    pub fn content_policy(message: &str) -> Self {
        Self {
            failure: Some(MockFailure::ContentPolicy(message.to_string())),
            ..Default::default()
        }
    }
}

/// A mock provider adapter that replays queued replies in order.
///
/// # Example
/// ```
/// use flexiai::adapters::mock::MockAdapter;
/// let adapter = MockAdapter::new("openai").with_response("Hello, world!");
/// ```
pub struct MockAdapter {
    name: String,
    model: String,
    replies: Mutex<Vec<MockReply>>,
    /// Served whenever the queue is empty; lets a test model a provider
    /// that fails (or succeeds) indefinitely.
    default_reply: Mutex<Option<MockReply>>,
    /// Every request received, for assertions.
    requests: Arc<Mutex<Vec<UnifiedRequest>>>,
    healthy: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl MockAdapter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: "mock-model".into(),
            replies: Mutex::new(Vec::new()),
            default_reply: Mutex::new(None),
            requests: Arc::new(Mutex::new(Vec::new())),
            healthy: AtomicBool::new(true),
            delay: Mutex::new(None),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Queue a simple text reply.
    pub fn with_response(self, content: &str) -> Self {
        self.replies.lock().unwrap().push(MockReply::text(content));
        self
    }

    /// Queue a fully custom reply.
    pub fn with_reply(self, reply: MockReply) -> Self {
        self.replies.lock().unwrap().push(reply);
        self
    }

    /// Serve `reply` whenever the queue runs dry.
    pub fn with_default(self, reply: MockReply) -> Self {
        *self.default_reply.lock().unwrap() = Some(reply);
        self
    }

    /// Sleep this long before answering each request.
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Queue a reply on an already-shared adapter.
    pub fn queue(&self, reply: MockReply) {
        self.replies.lock().unwrap().push(reply);
    }

    /// All requests received so far.
    pub fn recorded_requests(&self) -> Arc<Mutex<Vec<UnifiedRequest>>> {
        Arc::clone(&self.requests)
    }

    /// How many times `invoke` was called.
    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn next_reply(&self) -> MockReply {
        let mut replies = self.replies.lock().unwrap();
        if replies.is_empty() {
            self.default_reply
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| MockReply::text("(mock: no more queued replies)"))
        } else {
            replies.remove(0)
        }
    }
}

#[async_trait]
impl Provider for MockAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn invoke(&self, request: &UnifiedRequest) -> Result<UnifiedResponse> {
        self.requests.lock().unwrap().push(request.clone());
        let delay = *self.delay.lock().unwrap();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }

        let reply = self.next_reply();
        if let Some(failure) = reply.failure {
            return Err(match failure {
                MockFailure::Transient(message) => FlexiError::Transient {
                    provider: self.name.clone(),
                    message,
                },
                MockFailure::Auth(message) => FlexiError::Auth {
                    provider: self.name.clone(),
                    message,
                },
                MockFailure::ContentPolicy(message) => FlexiError::ContentPolicy {
                    provider: self.name.clone(),
                    message,
                },
            });
        }

        Ok(UnifiedResponse {
            content: reply.content,
            provider: self.name.clone(),
            model: request.model.clone().unwrap_or_else(|| self.model.clone()),
            usage: reply.usage,
            finish_reason: reply.finish_reason,
            raw: serde_json::Value::Null,
        })
    }

    async fn health_check(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }
}
