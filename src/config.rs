//! Application configuration
//!
//! Built once at process start from the credential store and the CLI
//! settings, then handed by reference to each component constructor.

use crate::credentials::{CredentialKey, CredentialStore};
use crate::error::NlIamError;

/// Default OpenAI model for intent parsing and explanations
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Region offered by the setup wizard
pub const DEFAULT_REGION: &str = "us-east-1";

/// IAM path given to newly created users
pub const DEFAULT_USER_PATH: &str = "/";

/// Non-secret settings supplied on the command line or environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub model: String,
    /// Override for the IAM Query API endpoint
    pub iam_endpoint: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            iam_endpoint: None,
        }
    }
}

/// Fully resolved configuration; every field is present.
#[derive(Clone)]
pub struct AppConfig {
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub aws_region: String,
    pub openai_api_key: String,
    pub model: String,
    pub iam_endpoint: Option<String>,
    pub user_path: String,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("aws_access_key_id", &self.aws_access_key_id)
            .field("aws_secret_access_key", &"<redacted>")
            .field("aws_region", &self.aws_region)
            .field("openai_api_key", &"<redacted>")
            .field("model", &self.model)
            .field("iam_endpoint", &self.iam_endpoint)
            .field("user_path", &self.user_path)
            .finish()
    }
}

impl AppConfig {
    /// Resolve configuration, failing before any external call when a
    /// credential is missing.
    pub fn from_store(store: &CredentialStore, settings: &Settings) -> Result<Self, NlIamError> {
        let creds = store.get_all();
        let missing = creds.missing();
        if !missing.is_empty() {
            let names: Vec<&str> = missing.iter().map(|k| k.env_name()).collect();
            return Err(NlIamError::Configuration(names.join(", ")));
        }

        let value = |key: CredentialKey| creds.get(key).unwrap_or_default().to_string();

        Ok(Self {
            aws_access_key_id: value(CredentialKey::AwsAccessKeyId),
            aws_secret_access_key: value(CredentialKey::AwsSecretAccessKey),
            aws_region: value(CredentialKey::AwsRegion),
            openai_api_key: value(CredentialKey::OpenAiApiKey),
            model: settings.model.clone(),
            iam_endpoint: settings.iam_endpoint.clone(),
            user_path: DEFAULT_USER_PATH.to_string(),
        })
    }
}
