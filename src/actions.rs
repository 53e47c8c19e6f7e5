//! Action Model
//!
//! The closed set of IAM operations the assistant can perform. Each
//! variant carries its own typed parameters, so a constructed [`Action`]
//! can never be missing a required value. Untyped data coming back from
//! the completion service goes through [`Action::from_parts`], which is
//! the single place required parameters are checked.

use std::collections::BTreeMap;

use crate::error::NlIamError;

/// Parameter name -> value, as decoded from the completion service.
pub type ParameterSet = BTreeMap<String, String>;

/// Supported actions and their required parameters, in declaration order.
pub const SUPPORTED_ACTIONS: &[(&str, &[&str])] = &[
    ("create_user", &["username"]),
    ("delete_user", &["username"]),
    ("add_policy", &["username", "policy_name"]),
    ("remove_policy", &["username", "policy_name"]),
    ("list_users", &[]),
    ("list_policies", &[]),
    ("create_group", &["group_name"]),
    ("delete_group", &["group_name"]),
    ("add_user_to_group", &["username", "group_name"]),
    ("remove_user_from_group", &["username", "group_name"]),
    ("create_access_key", &["username"]),
    ("list_access_keys", &["username"]),
    ("rotate_access_key", &["username"]),
    ("audit_mfa", &[]),
    ("audit_access_keys", &[]),
    ("audit_admin_users", &[]),
];

/// An IAM operation with its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    CreateUser { username: String },
    DeleteUser { username: String },
    AddPolicy { username: String, policy_name: String },
    RemovePolicy { username: String, policy_name: String },
    ListUsers,
    ListPolicies,
    CreateGroup { group_name: String },
    DeleteGroup { group_name: String },
    AddUserToGroup { username: String, group_name: String },
    RemoveUserFromGroup { username: String, group_name: String },
    CreateAccessKey { username: String },
    ListAccessKeys { username: String },
    RotateAccessKey { username: String },
    AuditMfa,
    AuditAccessKeys,
    AuditAdminUsers,
}

/// Required parameter names for a wire action name, if it is supported.
pub fn required_params(name: &str) -> Option<&'static [&'static str]> {
    SUPPORTED_ACTIONS
        .iter()
        .find(|(action, _)| *action == name)
        .map(|(_, params)| *params)
}

impl Action {
    /// Build an action from its wire name and an untyped parameter set.
    ///
    /// Fails with [`NlIamError::UnknownAction`] for names outside
    /// [`SUPPORTED_ACTIONS`] and with [`NlIamError::MissingParameters`]
    /// when any required key is absent. Extra keys are ignored.
    pub fn from_parts(name: &str, params: &ParameterSet) -> Result<Self, NlIamError> {
        let required =
            required_params(name).ok_or_else(|| NlIamError::UnknownAction(name.to_string()))?;

        let missing: Vec<String> = required
            .iter()
            .filter(|p| !params.contains_key(**p))
            .map(|p| p.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(NlIamError::MissingParameters(missing));
        }

        // Presence is checked above
        let get = |key: &str| params.get(key).cloned().unwrap_or_default();

        let action = match name {
            "create_user" => Action::CreateUser {
                username: get("username"),
            },
            "delete_user" => Action::DeleteUser {
                username: get("username"),
            },
            "add_policy" => Action::AddPolicy {
                username: get("username"),
                policy_name: get("policy_name"),
            },
            "remove_policy" => Action::RemovePolicy {
                username: get("username"),
                policy_name: get("policy_name"),
            },
            "list_users" => Action::ListUsers,
            "list_policies" => Action::ListPolicies,
            "create_group" => Action::CreateGroup {
                group_name: get("group_name"),
            },
            "delete_group" => Action::DeleteGroup {
                group_name: get("group_name"),
            },
            "add_user_to_group" => Action::AddUserToGroup {
                username: get("username"),
                group_name: get("group_name"),
            },
            "remove_user_from_group" => Action::RemoveUserFromGroup {
                username: get("username"),
                group_name: get("group_name"),
            },
            "create_access_key" => Action::CreateAccessKey {
                username: get("username"),
            },
            "list_access_keys" => Action::ListAccessKeys {
                username: get("username"),
            },
            "rotate_access_key" => Action::RotateAccessKey {
                username: get("username"),
            },
            "audit_mfa" => Action::AuditMfa,
            "audit_access_keys" => Action::AuditAccessKeys,
            "audit_admin_users" => Action::AuditAdminUsers,
            other => return Err(NlIamError::UnknownAction(other.to_string())),
        };

        Ok(action)
    }

    /// Wire name of this action.
    pub fn name(&self) -> &'static str {
        match self {
            Action::CreateUser { .. } => "create_user",
            Action::DeleteUser { .. } => "delete_user",
            Action::AddPolicy { .. } => "add_policy",
            Action::RemovePolicy { .. } => "remove_policy",
            Action::ListUsers => "list_users",
            Action::ListPolicies => "list_policies",
            Action::CreateGroup { .. } => "create_group",
            Action::DeleteGroup { .. } => "delete_group",
            Action::AddUserToGroup { .. } => "add_user_to_group",
            Action::RemoveUserFromGroup { .. } => "remove_user_from_group",
            Action::CreateAccessKey { .. } => "create_access_key",
            Action::ListAccessKeys { .. } => "list_access_keys",
            Action::RotateAccessKey { .. } => "rotate_access_key",
            Action::AuditMfa => "audit_mfa",
            Action::AuditAccessKeys => "audit_access_keys",
            Action::AuditAdminUsers => "audit_admin_users",
        }
    }

    /// Whether executing this action changes account state.
    pub fn is_mutating(&self) -> bool {
        !matches!(
            self,
            Action::ListUsers
                | Action::ListPolicies
                | Action::ListAccessKeys { .. }
                | Action::AuditMfa
                | Action::AuditAccessKeys
                | Action::AuditAdminUsers
        )
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::CreateUser { username }
            | Action::DeleteUser { username }
            | Action::CreateAccessKey { username }
            | Action::ListAccessKeys { username }
            | Action::RotateAccessKey { username } => {
                write!(f, "{} (username={})", self.name(), username)
            }
            Action::AddPolicy { username, policy_name }
            | Action::RemovePolicy { username, policy_name } => write!(
                f,
                "{} (username={}, policy_name={})",
                self.name(),
                username,
                policy_name
            ),
            Action::CreateGroup { group_name } | Action::DeleteGroup { group_name } => {
                write!(f, "{} (group_name={})", self.name(), group_name)
            }
            Action::AddUserToGroup { username, group_name }
            | Action::RemoveUserFromGroup { username, group_name } => write!(
                f,
                "{} (username={}, group_name={})",
                self.name(),
                username,
                group_name
            ),
            _ => write!(f, "{}", self.name()),
        }
    }
}
