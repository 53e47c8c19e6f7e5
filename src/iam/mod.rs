//! AWS IAM Integration
//!
//! [`IdentityService`] lists every identity-service call the assistant
//! makes. [`IamClient`] implements it against the IAM Query API; tests
//! use an in-memory fake.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod client;
pub mod sigv4;
#[cfg(test)]
pub(crate) mod testing;

pub use client::IamClient;

/// IAM user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct User {
    pub user_name: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub arn: String,
    #[serde(default)]
    pub path: String,
    pub create_date: DateTime<Utc>,
}

/// IAM group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Group {
    pub group_name: String,
    #[serde(default)]
    pub group_id: String,
    #[serde(default)]
    pub arn: String,
    #[serde(default)]
    pub path: String,
    pub create_date: DateTime<Utc>,
}

/// IAM role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Role {
    pub role_name: String,
    #[serde(default)]
    pub role_id: String,
    #[serde(default)]
    pub arn: String,
    #[serde(default)]
    pub path: String,
    pub create_date: DateTime<Utc>,
}

/// Managed policy as returned by `ListPolicies` / `GetPolicy`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ManagedPolicy {
    pub policy_name: String,
    pub arn: String,
    #[serde(default)]
    pub policy_id: String,
    #[serde(default)]
    pub path: String,
    pub default_version_id: Option<String>,
    pub attachment_count: Option<u32>,
}

/// Managed policy attached to a user or role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AttachedPolicy {
    pub policy_name: String,
    pub policy_arn: String,
}

/// Newly created access key; the only time the secret is visible
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AccessKey {
    pub user_name: String,
    pub access_key_id: String,
    pub status: String,
    pub secret_access_key: String,
    pub create_date: DateTime<Utc>,
}

/// Access key listing entry (no secret)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AccessKeyMetadata {
    pub user_name: String,
    pub access_key_id: String,
    pub status: String,
    pub create_date: DateTime<Utc>,
}

/// Registered MFA device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MfaDevice {
    pub user_name: String,
    pub serial_number: String,
    pub enable_date: DateTime<Utc>,
}

/// Identity-service operations used by the executor and the audits.
///
/// Implementations return every page of list results. Policy documents
/// are returned decoded (plain JSON text).
#[async_trait]
pub trait IdentityService: Send + Sync {
    async fn create_user(&self, user_name: &str, path: &str) -> Result<User>;
    async fn delete_user(&self, user_name: &str) -> Result<()>;
    async fn list_users(&self) -> Result<Vec<User>>;

    async fn list_policies(&self) -> Result<Vec<ManagedPolicy>>;
    async fn get_policy(&self, policy_arn: &str) -> Result<ManagedPolicy>;
    async fn get_policy_document(&self, policy_arn: &str, version_id: &str) -> Result<String>;

    async fn attach_user_policy(&self, user_name: &str, policy_arn: &str) -> Result<()>;
    async fn detach_user_policy(&self, user_name: &str, policy_arn: &str) -> Result<()>;
    async fn list_attached_user_policies(&self, user_name: &str) -> Result<Vec<AttachedPolicy>>;
    async fn list_user_policies(&self, user_name: &str) -> Result<Vec<String>>;
    async fn get_user_policy(&self, user_name: &str, policy_name: &str) -> Result<String>;

    async fn create_group(&self, group_name: &str) -> Result<Group>;
    async fn delete_group(&self, group_name: &str) -> Result<()>;
    async fn add_user_to_group(&self, user_name: &str, group_name: &str) -> Result<()>;
    async fn remove_user_from_group(&self, user_name: &str, group_name: &str) -> Result<()>;
    async fn list_groups_for_user(&self, user_name: &str) -> Result<Vec<Group>>;

    async fn create_access_key(&self, user_name: &str) -> Result<AccessKey>;
    async fn list_access_keys(&self, user_name: &str) -> Result<Vec<AccessKeyMetadata>>;
    async fn delete_access_key(&self, user_name: &str, access_key_id: &str) -> Result<()>;

    async fn list_mfa_devices(&self, user_name: &str) -> Result<Vec<MfaDevice>>;

    async fn list_roles(&self) -> Result<Vec<Role>>;
    async fn list_attached_role_policies(&self, role_name: &str) -> Result<Vec<AttachedPolicy>>;
    async fn list_role_policies(&self, role_name: &str) -> Result<Vec<String>>;
    async fn get_role_policy(&self, role_name: &str, policy_name: &str) -> Result<String>;
}
