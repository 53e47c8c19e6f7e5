//! Natural-Language IAM Library
//!
//! Turns free-text administrative requests into AWS IAM operations.
//! Intent parsing is delegated to an LLM completion service; this crate
//! owns the action model, the IAM Query API client, the ordered cleanup
//! sequences and the local credential store.

pub mod actions;
pub mod audit;
pub mod config;
pub mod credentials;
pub mod error;
pub mod executor;
pub mod explain;
pub mod iam;
pub mod intent;
pub mod llm;
pub mod render;

pub use actions::{Action, ParameterSet};
pub use config::AppConfig;
pub use credentials::{CredentialKey, CredentialStore, Credentials};
pub use error::NlIamError;
pub use executor::{ActionExecutor, ActionOutput, ActionResult};
pub use explain::Explainer;
pub use iam::{IamClient, IdentityService};
pub use intent::IntentResolver;
pub use llm::{CompletionService, OpenAiCompletion};
