//! Plain-language explanation of a request, shown before confirmation.

use std::sync::Arc;
use tracing::warn;

use crate::llm::{CompletionRequest, CompletionService};

const EXPLAIN_PROMPT: &str =
    "You are an AWS IAM expert. Explain what this IAM request will do in simple terms.";

pub struct Explainer {
    completion: Arc<dyn CompletionService>,
}

impl Explainer {
    pub fn new(completion: Arc<dyn CompletionService>) -> Self {
        Self { completion }
    }

    /// Describe `request`. Failures come back as a readable message, never
    /// as an error: the explanation is advisory.
    pub async fn explain(&self, request: &str) -> String {
        match self
            .completion
            .complete(CompletionRequest::text(EXPLAIN_PROMPT, request))
            .await
        {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                warn!(error = %e, "Explanation unavailable");
                format!("Failed to explain request: {:#}", e)
            }
        }
    }
}
