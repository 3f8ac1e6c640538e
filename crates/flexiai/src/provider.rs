use async_trait::async_trait;

use flexiai_core::{FlexiError, Result, UnifiedRequest, UnifiedResponse};

/// Trait implemented by each vendor adapter (OpenAI, Anthropic, Gemini,
/// mock). One call, one attempt: retries, breakers, and failover live in the
/// gateway, not here.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Registry name, e.g. "openai".
    fn name(&self) -> &str;

    /// Model this adapter sends when the request does not name one.
    fn model(&self) -> &str;

    /// Perform a single chat-completion attempt. Errors must be classified
    /// onto the gateway taxonomy (transient vs. auth vs. content policy);
    /// cancellation happens by dropping the returned future.
    async fn invoke(&self, request: &UnifiedRequest) -> Result<UnifiedResponse>;

    /// Cheap, idempotent reachability probe.
    async fn health_check(&self) -> bool;
}

/// Map an HTTP status from a vendor API onto the error taxonomy.
///
/// 401/403 are auth problems; 429 and every 5xx are provider problems worth
/// retrying elsewhere; a 4xx whose body names a safety/policy refusal is a
/// content-policy error (the same content will refuse everywhere, so the
/// router must not fail over); anything else surfaces as transient.
pub(crate) fn classify_status(provider: &str, status: u16, body: &str) -> FlexiError {
    let message = format!("HTTP {status}: {body}");
    match status {
        401 | 403 => FlexiError::Auth {
            provider: provider.to_string(),
            message,
        },
        429 => FlexiError::Transient {
            provider: provider.to_string(),
            message,
        },
        400..=499 if looks_like_policy_refusal(body) => FlexiError::ContentPolicy {
            provider: provider.to_string(),
            message,
        },
        _ => FlexiError::Transient {
            provider: provider.to_string(),
            message,
        },
    }
}

fn looks_like_policy_refusal(body: &str) -> bool {
    let body = body.to_ascii_lowercase();
    body.contains("content_policy")
        || body.contains("content_filter")
        || body.contains("content management policy")
        || body.contains("safety")
}

/// Wrap a reqwest transport error. Timeouts and connection failures are all
/// transient from the router's point of view.
pub(crate) fn transport_error(provider: &str, err: reqwest::Error) -> FlexiError {
    FlexiError::Transient {
        provider: provider.to_string(),
        message: err.to_string(),
    }
}
