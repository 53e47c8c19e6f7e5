//! Terminal rendering for results, audits and configuration.

use anyhow::{Context, Result};
use std::fmt::Write;

use crate::audit::{AdminAuditReport, KeyAuditReport, MfaAuditReport, STALE_KEY_AGE_DAYS};
use crate::credentials::{mask, CredentialKey, Credentials};
use crate::executor::{ActionOutput, ActionResult};
use crate::iam::AccessKey;

/// Human-readable rendering of an action outcome.
pub fn render_result(result: &ActionResult) -> String {
    match result {
        ActionResult::Success(output) => {
            let body = render_output(output);
            if body.is_empty() {
                "✅ Success!".to_string()
            } else {
                format!("✅ Success!\n{}", body)
            }
        }
        ActionResult::Failure { message } => format!("❌ Error: {}", message),
    }
}

/// Pretty JSON for `--json`.
pub fn render_json(result: &ActionResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("Failed to serialize result")
}

pub fn render_output(output: &ActionOutput) -> String {
    let mut out = String::new();

    match output {
        ActionOutput::User(user) => {
            let _ = write!(out, "Created user {} ({})", user.user_name, user.arn);
        }
        ActionOutput::Users(users) => {
            if users.is_empty() {
                out.push_str("No users found");
            }
            for user in users {
                let _ = writeln!(
                    out,
                    "  • {} (created {})",
                    user.user_name,
                    user.create_date.format("%Y-%m-%d")
                );
            }
        }
        ActionOutput::Policies(policies) => {
            if policies.is_empty() {
                out.push_str("No policies found");
            }
            for policy in policies {
                let _ = writeln!(out, "  • {} ({})", policy.policy_name, policy.arn);
            }
        }
        ActionOutput::Group(group) => {
            let _ = write!(out, "Created group {} ({})", group.group_name, group.arn);
        }
        ActionOutput::AccessKey(key) => render_new_key(&mut out, key),
        ActionOutput::AccessKeys(keys) => {
            if keys.is_empty() {
                out.push_str("No access keys found");
            }
            for key in keys {
                let _ = writeln!(
                    out,
                    "  • {} ({}, created {})",
                    key.access_key_id,
                    key.status,
                    key.create_date.format("%Y-%m-%d")
                );
            }
        }
        ActionOutput::Completed => {}
        ActionOutput::UserDeleted {
            username,
            groups_removed,
            keys_deleted,
            policies_detached,
        } => {
            let _ = write!(
                out,
                "Deleted user {} (removed from {} groups, deleted {} access keys, detached {} policies)",
                username, groups_removed, keys_deleted, policies_detached
            );
        }
        ActionOutput::KeyRotated {
            new_key,
            deleted,
            warning,
        } => {
            render_new_key(&mut out, new_key);
            if !deleted.is_empty() {
                let _ = write!(out, "\nDeleted old keys: {}", deleted.join(", "));
            }
            if let Some(warning) = warning {
                let _ = write!(out, "\n⚠️  {}", warning);
            }
        }
        ActionOutput::MfaAudit(report) => render_mfa_audit(&mut out, report),
        ActionOutput::KeyAudit(report) => render_key_audit(&mut out, report),
        ActionOutput::AdminAudit(report) => render_admin_audit(&mut out, report),
    }

    out.trim_end().to_string()
}

fn render_new_key(out: &mut String, key: &AccessKey) {
    let _ = writeln!(out, "User: {}", key.user_name);
    let _ = writeln!(out, "Access Key ID: {}", key.access_key_id);
    let _ = writeln!(out, "Secret Access Key: {}", key.secret_access_key);
    out.push_str("⚠️  Save the secret now, it cannot be retrieved again.");
}

fn render_mfa_audit(out: &mut String, report: &MfaAuditReport) {
    out.push_str("\n📊 MFA Audit Results:\n");
    let _ = writeln!(out, "Total Users: {}", report.total_users);
    let _ = writeln!(out, "Users with MFA: {}", report.users_with_mfa);
    if report.users_without_mfa.is_empty() {
        out.push_str("\n✅ All users have MFA enabled!");
    } else {
        out.push_str("\n⚠️  Users without MFA:\n");
        for user in &report.users_without_mfa {
            let _ = writeln!(out, "  • {}", user);
        }
    }
}

fn render_key_audit(out: &mut String, report: &KeyAuditReport) {
    out.push_str("\n📊 Access Key Audit:\n");
    if report.old_keys.is_empty() {
        out.push_str("✅ No old keys found");
        return;
    }
    let _ = writeln!(out, "\n⚠️  Keys older than {} days:", STALE_KEY_AGE_DAYS);
    for key in &report.old_keys {
        let _ = writeln!(out, "  • User: {}", key.username);
        let _ = writeln!(out, "    Key ID: {}", key.key_id);
        let _ = writeln!(out, "    Status: {}", key.status);
        let _ = writeln!(out, "    Age: {} days", key.age_days);
    }
}

fn render_admin_audit(out: &mut String, report: &AdminAuditReport) {
    out.push_str("\n📊 Administrator Access Audit:\n");
    if report.admin_users.is_empty() && report.admin_roles.is_empty() {
        out.push_str("✅ No administrators found");
        return;
    }
    if !report.admin_users.is_empty() {
        out.push_str("\n⚠️  Users with admin access:\n");
        for user in &report.admin_users {
            let _ = writeln!(out, "  • {}", user);
        }
    }
    if !report.admin_roles.is_empty() {
        out.push_str("\n⚠️  Roles with admin access:\n");
        for role in &report.admin_roles {
            let _ = writeln!(out, "  • {}", role);
        }
    }
}

/// `config show`: every key, masked, or "Not set".
pub fn render_config(credentials: &Credentials) -> String {
    let mut out = String::from("\n📊 Current Configuration:\n");
    for key in CredentialKey::ALL {
        match credentials.get(key) {
            Some(value) => {
                let _ = writeln!(out, "{}: {}", key.env_name(), mask(value));
            }
            None => {
                let _ = writeln!(out, "{}: Not set", key.env_name());
            }
        }
    }
    out.trim_end().to_string()
}
