//! Security Audits
//!
//! Read-only sweeps over the account: users without MFA, access keys past
//! their rotation age, and users or roles holding administrator access.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::iam::{AttachedPolicy, IdentityService};

/// Keys strictly older than this many whole days are reported
pub const STALE_KEY_AGE_DAYS: i64 = 90;

/// AWS-managed full-access policy, recognized by ARN suffix
const ADMIN_POLICY_SUFFIX: &str = ":policy/AdministratorAccess";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MfaAuditReport {
    pub total_users: usize,
    pub users_with_mfa: usize,
    pub users_without_mfa: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaleKey {
    pub username: String,
    pub key_id: String,
    pub status: String,
    pub age_days: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyAuditReport {
    pub old_keys: Vec<StaleKey>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdminAuditReport {
    pub admin_users: Vec<String>,
    pub admin_roles: Vec<String>,
}

pub async fn audit_mfa(iam: &dyn IdentityService) -> Result<MfaAuditReport> {
    let users = iam.list_users().await?;
    let mut users_without_mfa = Vec::new();

    for user in &users {
        let devices = iam.list_mfa_devices(&user.user_name).await?;
        if devices.is_empty() {
            users_without_mfa.push(user.user_name.clone());
        }
    }

    let report = MfaAuditReport {
        total_users: users.len(),
        users_with_mfa: users.len() - users_without_mfa.len(),
        users_without_mfa,
    };
    info!(
        total = report.total_users,
        without_mfa = report.users_without_mfa.len(),
        "MFA audit complete"
    );
    Ok(report)
}

pub async fn audit_access_keys(iam: &dyn IdentityService) -> Result<KeyAuditReport> {
    audit_access_keys_at(iam, Utc::now()).await
}

/// Key audit against a fixed clock.
pub async fn audit_access_keys_at(
    iam: &dyn IdentityService,
    now: DateTime<Utc>,
) -> Result<KeyAuditReport> {
    let mut old_keys = Vec::new();

    for user in iam.list_users().await? {
        for key in iam.list_access_keys(&user.user_name).await? {
            let age_days = (now - key.create_date).num_days();
            if age_days > STALE_KEY_AGE_DAYS {
                old_keys.push(StaleKey {
                    username: user.user_name.clone(),
                    key_id: key.access_key_id,
                    status: key.status,
                    age_days,
                });
            }
        }
    }

    info!(stale = old_keys.len(), "Access key audit complete");
    Ok(KeyAuditReport { old_keys })
}

pub async fn audit_admin_users(iam: &dyn IdentityService) -> Result<AdminAuditReport> {
    let mut admin_users = Vec::new();
    for user in iam.list_users().await? {
        let name = user.user_name;
        let attached = iam.list_attached_user_policies(&name).await?;
        let mut admin = managed_grants_admin(iam, &attached).await?;

        if !admin {
            for policy_name in iam.list_user_policies(&name).await? {
                let document = iam.get_user_policy(&name, &policy_name).await?;
                if document_grants_admin(&document)
                    .with_context(|| format!("Inline policy {} of user {}", policy_name, name))?
                {
                    admin = true;
                    break;
                }
            }
        }

        if admin {
            admin_users.push(name);
        }
    }

    let mut admin_roles = Vec::new();
    for role in iam.list_roles().await? {
        let name = role.role_name;
        let attached = iam.list_attached_role_policies(&name).await?;
        let mut admin = managed_grants_admin(iam, &attached).await?;

        if !admin {
            for policy_name in iam.list_role_policies(&name).await? {
                let document = iam.get_role_policy(&name, &policy_name).await?;
                if document_grants_admin(&document)
                    .with_context(|| format!("Inline policy {} of role {}", policy_name, name))?
                {
                    admin = true;
                    break;
                }
            }
        }

        if admin {
            admin_roles.push(name);
        }
    }

    info!(
        users = admin_users.len(),
        roles = admin_roles.len(),
        "Admin audit complete"
    );
    Ok(AdminAuditReport {
        admin_users,
        admin_roles,
    })
}

/// AdministratorAccess by ARN, else any default version granting `*` on `*`.
async fn managed_grants_admin(
    iam: &dyn IdentityService,
    attached: &[AttachedPolicy],
) -> Result<bool> {
    if attached
        .iter()
        .any(|p| p.policy_arn.ends_with(ADMIN_POLICY_SUFFIX))
    {
        return Ok(true);
    }

    for policy in attached {
        let details = iam.get_policy(&policy.policy_arn).await?;
        let Some(version) = details.default_version_id else {
            debug!(arn = %policy.policy_arn, "Policy has no default version");
            continue;
        };
        let document = iam.get_policy_document(&policy.policy_arn, &version).await?;
        if document_grants_admin(&document)
            .with_context(|| format!("Policy {} version {}", policy.policy_arn, version))?
        {
            return Ok(true);
        }
    }

    Ok(false)
}

fn document_grants_admin(document: &str) -> Result<bool> {
    let value: Value = serde_json::from_str(document).context("Policy document is not JSON")?;
    Ok(grants_admin(&value))
}

/// True iff some statement allows every action on every resource.
///
/// `Statement`, `Action` and `Resource` may each be a single value or an
/// array. `NotAction` / `NotResource` statements are not considered.
pub fn grants_admin(document: &Value) -> bool {
    let statements = match document.get("Statement") {
        Some(Value::Array(items)) => items.iter().collect::<Vec<_>>(),
        Some(single @ Value::Object(_)) => vec![single],
        _ => return false,
    };

    statements.into_iter().any(|statement| {
        statement.get("Effect").and_then(Value::as_str) == Some("Allow")
            && contains_any(statement.get("Action"), &["*", "*:*"])
            && contains_any(statement.get("Resource"), &["*"])
    })
}

fn contains_any(field: Option<&Value>, wanted: &[&str]) -> bool {
    match field {
        Some(Value::String(s)) => wanted.contains(&s.as_str()),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .any(|s| wanted.contains(&s)),
        _ => false,
    }
}
