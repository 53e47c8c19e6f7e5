//! Completion Service Abstraction
//!
//! The seam between the assistant and whichever language model parses and
//! explains requests.

use anyhow::Result;
use async_trait::async_trait;

pub mod openai;

pub use openai::OpenAiCompletion;

/// A single completion request: fixed instructions plus the user's text.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// System instructions
    pub instructions: String,
    /// Raw user text
    pub input: String,
    /// Ask the service to return a JSON object
    pub json_response: bool,
}

impl CompletionRequest {
    pub fn text(instructions: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            instructions: instructions.into(),
            input: input.into(),
            json_response: false,
        }
    }

    pub fn json(instructions: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            json_response: true,
            ..Self::text(instructions, input)
        }
    }
}

/// A common trait for language-model completion providers.
///
/// The resolver and the explainer only need single-shot completions, so
/// this is the whole surface.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Returns the text content of the first completion choice.
    async fn complete(&self, request: CompletionRequest) -> Result<String>;
}
