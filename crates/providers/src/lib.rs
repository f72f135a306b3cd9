//! LM provider adapters.
//!
//! The booking agent and the inbound dispatcher talk to a language model
//! through the [`LlmProvider`] seam.  One HTTP adapter (OpenAI-compatible
//! chat completions) covers the hosted and local backends we target; the
//! scripted mock drives the orchestration tests without network access.

pub mod anthropic;
pub mod mock;
pub mod openai_compat;
pub mod traits;
pub(crate) mod util;

use std::sync::Arc;

use ca_domain::config::{LlmConfig, ProviderKind};
use ca_domain::error::Result;

pub use anthropic::AnthropicProvider;
pub use mock::ScriptedProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use traits::{ChatRequest, ChatResponse, LlmProvider};

/// Build the configured provider.
pub fn build_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>> {
    Ok(match config.kind {
        ProviderKind::OpenaiCompat => Arc::new(OpenAiCompatProvider::from_config(config)?),
        ProviderKind::Anthropic => Arc::new(AnthropicProvider::from_config(config)?),
    })
}
