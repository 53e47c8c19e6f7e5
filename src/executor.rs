//! Action Executor
//!
//! Maps each [`Action`] onto identity-service calls. Most actions are a
//! single pass-through call; `delete_user` and `rotate_access_key` run
//! ordered multi-step sequences, and the policy actions first resolve a
//! human policy name to its ARN.
//!
//! Calls are awaited one at a time. Nothing here returns an error for a
//! service failure: the outcome is always an [`ActionResult`].

use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::actions::{Action, ParameterSet};
use crate::audit::{self, AdminAuditReport, KeyAuditReport, MfaAuditReport};
use crate::error::NlIamError;
use crate::iam::{AccessKey, AccessKeyMetadata, Group, IdentityService, ManagedPolicy, User};

/// Action-specific success payload
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum ActionOutput {
    User(User),
    Users(Vec<User>),
    Policies(Vec<ManagedPolicy>),
    Group(Group),
    AccessKey(AccessKey),
    AccessKeys(Vec<AccessKeyMetadata>),
    /// The call succeeded and returned no data
    Completed,
    UserDeleted {
        username: String,
        groups_removed: usize,
        keys_deleted: usize,
        policies_detached: usize,
    },
    /// `warning` is set when an old key could not be deleted
    KeyRotated {
        new_key: AccessKey,
        deleted: Vec<String>,
        warning: Option<String>,
    },
    MfaAudit(MfaAuditReport),
    KeyAudit(KeyAuditReport),
    AdminAudit(AdminAuditReport),
}

/// Outcome of executing one action
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActionResult {
    Success(ActionOutput),
    Failure { message: String },
}

impl ActionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ActionResult::Success(_))
    }
}

pub struct ActionExecutor {
    iam: Arc<dyn IdentityService>,
    user_path: String,
}

impl ActionExecutor {
    pub fn new(iam: Arc<dyn IdentityService>, user_path: impl Into<String>) -> Self {
        Self {
            iam,
            user_path: user_path.into(),
        }
    }

    pub async fn execute(&self, action: &Action) -> ActionResult {
        info!(action = %action, "Executing");

        match self.dispatch(action).await {
            Ok(output) => {
                info!(action = action.name(), "✅ Action completed");
                ActionResult::Success(output)
            }
            Err(e) => {
                let message = format!("{:#}", e);
                warn!(action = action.name(), error = %message, "Action failed");
                ActionResult::Failure { message }
            }
        }
    }

    /// Validate a wire name and parameters, then execute.
    ///
    /// Unknown names and missing parameters are returned as errors before
    /// any identity-service call.
    pub async fn execute_named(
        &self,
        name: &str,
        params: &ParameterSet,
    ) -> Result<ActionResult, NlIamError> {
        let action = Action::from_parts(name, params)?;
        Ok(self.execute(&action).await)
    }

    async fn dispatch(&self, action: &Action) -> Result<ActionOutput> {
        let iam = self.iam.as_ref();

        let output = match action {
            Action::CreateUser { username } => {
                ActionOutput::User(iam.create_user(username, &self.user_path).await?)
            }
            Action::DeleteUser { username } => self.delete_user(username).await?,
            Action::AddPolicy {
                username,
                policy_name,
            } => {
                let arn = self.resolve_policy_arn(policy_name).await?;
                iam.attach_user_policy(username, &arn).await?;
                ActionOutput::Completed
            }
            Action::RemovePolicy {
                username,
                policy_name,
            } => {
                let arn = self.resolve_policy_arn(policy_name).await?;
                iam.detach_user_policy(username, &arn).await?;
                ActionOutput::Completed
            }
            Action::ListUsers => ActionOutput::Users(iam.list_users().await?),
            Action::ListPolicies => ActionOutput::Policies(iam.list_policies().await?),
            Action::CreateGroup { group_name } => {
                ActionOutput::Group(iam.create_group(group_name).await?)
            }
            Action::DeleteGroup { group_name } => {
                iam.delete_group(group_name).await?;
                ActionOutput::Completed
            }
            Action::AddUserToGroup {
                username,
                group_name,
            } => {
                iam.add_user_to_group(username, group_name).await?;
                ActionOutput::Completed
            }
            Action::RemoveUserFromGroup {
                username,
                group_name,
            } => {
                iam.remove_user_from_group(username, group_name).await?;
                ActionOutput::Completed
            }
            Action::CreateAccessKey { username } => {
                ActionOutput::AccessKey(iam.create_access_key(username).await?)
            }
            Action::ListAccessKeys { username } => {
                ActionOutput::AccessKeys(iam.list_access_keys(username).await?)
            }
            Action::RotateAccessKey { username } => self.rotate_access_key(username).await?,
            Action::AuditMfa => ActionOutput::MfaAudit(audit::audit_mfa(iam).await?),
            Action::AuditAccessKeys => {
                ActionOutput::KeyAudit(audit::audit_access_keys(iam).await?)
            }
            Action::AuditAdminUsers => {
                ActionOutput::AdminAudit(audit::audit_admin_users(iam).await?)
            }
        };

        Ok(output)
    }

    /// Groups, then access keys, then attached policies, then the user.
    /// Stops at the first failure; whatever was removed stays removed.
    async fn delete_user(&self, username: &str) -> Result<ActionOutput> {
        let iam = self.iam.as_ref();

        let groups = iam.list_groups_for_user(username).await?;
        for group in &groups {
            iam.remove_user_from_group(username, &group.group_name)
                .await
                .with_context(|| {
                    format!("Failed to remove {} from group {}", username, group.group_name)
                })?;
        }

        let keys = iam.list_access_keys(username).await?;
        for key in &keys {
            iam.delete_access_key(username, &key.access_key_id)
                .await
                .with_context(|| format!("Failed to delete access key {}", key.access_key_id))?;
        }

        let policies = iam.list_attached_user_policies(username).await?;
        for policy in &policies {
            iam.detach_user_policy(username, &policy.policy_arn)
                .await
                .with_context(|| format!("Failed to detach policy {}", policy.policy_name))?;
        }

        iam.delete_user(username)
            .await
            .with_context(|| format!("Failed to delete user {}", username))?;

        info!(
            user = %username,
            groups = groups.len(),
            keys = keys.len(),
            policies = policies.len(),
            "🗑️ User deleted"
        );

        Ok(ActionOutput::UserDeleted {
            username: username.to_string(),
            groups_removed: groups.len(),
            keys_deleted: keys.len(),
            policies_detached: policies.len(),
        })
    }

    /// Create the replacement key before touching the old ones.
    async fn rotate_access_key(&self, username: &str) -> Result<ActionOutput> {
        let iam = self.iam.as_ref();

        let new_key = iam
            .create_access_key(username)
            .await
            .context("Failed to create new access key")?;
        debug!(user = %username, key_id = %new_key.access_key_id, "New access key created");

        let mut deleted = Vec::new();
        let mut warning = None;

        let existing = match iam.list_access_keys(username).await {
            Ok(keys) => keys,
            Err(e) => {
                let message = format!("New key created but old keys could not be listed: {:#}", e);
                warn!(user = %username, "{}", message);
                return Ok(ActionOutput::KeyRotated {
                    new_key,
                    deleted,
                    warning: Some(message),
                });
            }
        };

        for key in existing
            .iter()
            .filter(|k| k.access_key_id != new_key.access_key_id)
        {
            if let Err(e) = iam.delete_access_key(username, &key.access_key_id).await {
                let message = format!(
                    "New key created but old key {} could not be deleted: {:#}",
                    key.access_key_id, e
                );
                warn!(user = %username, "{}", message);
                warning = Some(message);
                break;
            }
            deleted.push(key.access_key_id.clone());
        }

        info!(user = %username, deleted = deleted.len(), "🔑 Access key rotated");
        Ok(ActionOutput::KeyRotated {
            new_key,
            deleted,
            warning,
        })
    }

    /// Case-insensitive name lookup over every policy page; first match wins.
    async fn resolve_policy_arn(&self, policy_name: &str) -> Result<String> {
        let policies = self.iam.list_policies().await?;
        let wanted = policy_name.to_lowercase();

        match policies
            .into_iter()
            .find(|p| p.policy_name.to_lowercase() == wanted)
        {
            Some(policy) => {
                debug!(name = %policy.policy_name, arn = %policy.arn, "Resolved policy");
                Ok(policy.arn)
            }
            None => Err(NlIamError::PolicyNotFound(policy_name.to_string()).into()),
        }
    }
}
