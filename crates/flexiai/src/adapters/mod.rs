//! Vendor adapters implementing the [`Provider`](crate::provider::Provider)
//! interface, plus a mock adapter for deterministic tests.

pub mod anthropic;
pub mod gemini;
pub mod mock;
pub mod openai;

pub use anthropic::AnthropicAdapter;
pub use gemini::GeminiAdapter;
pub use mock::{MockAdapter, MockReply};
pub use openai::OpenAiAdapter;
