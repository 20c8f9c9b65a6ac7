//! LLM provider abstraction used by the explainer.

mod openai;
mod provider;
mod types;

pub use openai::OpenAiProvider;
pub use provider::{CompletionOptions, LlmError, LlmProvider};
pub use types::{Message, MessageRole};
