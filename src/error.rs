//! Error taxonomy for the IAM assistant.

use thiserror::Error;

/// Errors surfaced by the library.
///
/// Identity-service failures never escape the executor as this type; they
/// are folded into [`crate::ActionResult::Failure`].
#[derive(Debug, Error)]
pub enum NlIamError {
    /// Required credentials are not configured
    #[error("Missing configuration: {0}")]
    Configuration(String),

    /// The completion service did not yield a valid action
    #[error("Failed to parse request: {0}")]
    Parse(String),

    /// Action name outside the supported set
    #[error("Unknown action: {0}")]
    UnknownAction(String),

    /// Required parameters absent for an action
    #[error("Missing required parameters: {}", .0.join(", "))]
    MissingParameters(Vec<String>),

    /// No policy matched the supplied name
    #[error("Policy {0} not found")]
    PolicyNotFound(String),

    /// Unrecognized user-facing credential name
    #[error("Unknown config key: {0} (expected aws-access-key, aws-secret-key, aws-region or openai-key)")]
    InvalidCredentialKey(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_parameters_message() {
        let err = NlIamError::MissingParameters(vec![
            "username".to_string(),
            "policy_name".to_string(),
        ]);
        assert_eq!(
            err.to_string(),
            "Missing required parameters: username, policy_name"
        );
    }
}
