//! Intent Resolver
//!
//! Sends the user's request and a fixed instruction prompt to the
//! completion service and decodes the `{action, params}` object it
//! returns. No retries and no fallback parsing: anything other than a
//! well-formed object naming a supported action with all of its required
//! parameters is a [`NlIamError::Parse`].

use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info};

use crate::actions::{Action, ParameterSet, SUPPORTED_ACTIONS};
use crate::error::NlIamError;
use crate::llm::{CompletionRequest, CompletionService};

/// Canonical request -> response examples embedded in the prompt
const EXAMPLES: &[(&str, &str)] = &[
    (
        "Create a new user named john_doe",
        r#"{"action": "create_user", "params": {"username": "john_doe"}}"#,
    ),
    (
        "Add ReadOnlyAccess policy to john_doe",
        r#"{"action": "add_policy", "params": {"username": "john_doe", "policy_name": "ReadOnlyAccess"}}"#,
    ),
    (
        "Put john_doe in the developers group",
        r#"{"action": "add_user_to_group", "params": {"username": "john_doe", "group_name": "developers"}}"#,
    ),
    (
        "Create access key for john_doe",
        r#"{"action": "create_access_key", "params": {"username": "john_doe"}}"#,
    ),
    ("List all users", r#"{"action": "list_users", "params": {}}"#),
];

/// Shape expected back from the completion service
#[derive(Debug, Deserialize)]
struct RawIntent {
    action: String,
    #[serde(default)]
    params: Option<Map<String, Value>>,
}

/// Build the system prompt enumerating every supported action.
pub fn instruction_prompt() -> String {
    let mut prompt = String::from(
        "You are an AWS IAM expert that helps parse natural language requests into structured commands.\n\
         Return a JSON object with:\n\
         1. \"action\": One of the supported actions\n\
         2. \"params\": A dictionary of string parameters\n\n\
         Supported actions and their required parameters:\n",
    );

    for (action, params) in SUPPORTED_ACTIONS {
        if params.is_empty() {
            prompt.push_str(&format!("- {}\n", action));
        } else {
            prompt.push_str(&format!("- {}: {}\n", action, params.join(", ")));
        }
    }

    prompt.push_str("\nExamples:\n");
    for (request, response) in EXAMPLES {
        prompt.push_str(&format!("- \"{}\" -> {}\n", request, response));
    }

    prompt
}

/// Decode a completion response into an [`Action`].
pub fn decode(response: &str) -> Result<Action, NlIamError> {
    let raw: RawIntent = serde_json::from_str(response.trim()).map_err(|e| {
        NlIamError::Parse(format!("invalid response from completion service: {}", e))
    })?;

    // Only string values become parameters; anything else reads as absent
    let params: ParameterSet = raw
        .params
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(key, value)| match value {
            Value::String(s) => Some((key, s)),
            _ => None,
        })
        .collect();

    Action::from_parts(&raw.action, &params).map_err(|e| match e {
        NlIamError::UnknownAction(name) => {
            NlIamError::Parse(format!("Unsupported action: {}", name))
        }
        other => NlIamError::Parse(other.to_string()),
    })
}

/// Turns request text into a validated [`Action`]
pub struct IntentResolver {
    completion: Arc<dyn CompletionService>,
    prompt: String,
}

impl IntentResolver {
    pub fn new(completion: Arc<dyn CompletionService>) -> Self {
        Self {
            completion,
            prompt: instruction_prompt(),
        }
    }

    pub async fn resolve(&self, request: &str) -> Result<Action, NlIamError> {
        debug!(request_len = request.len(), "Resolving intent");

        let response = self
            .completion
            .complete(CompletionRequest::json(self.prompt.clone(), request))
            .await
            .map_err(|e| NlIamError::Parse(format!("{:#}", e)))?;

        let action = decode(&response)?;
        info!(action = %action, "Resolved request");
        Ok(action)
    }
}
