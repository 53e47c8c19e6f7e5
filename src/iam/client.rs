//! IAM Query API Client
//!
//! Form-encoded POST requests against the global IAM endpoint, signed
//! with SigV4, XML responses decoded with quick-xml. List operations
//! follow `IsTruncated` / `Marker` until the last page.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::sigv4::{self, SignableRequest, SigningKey};
use super::{
    AccessKey, AccessKeyMetadata, AttachedPolicy, Group, IdentityService, ManagedPolicy,
    MfaDevice, Role, User,
};
use crate::config::AppConfig;

const IAM_API_VERSION: &str = "2010-05-08";
const IAM_SERVICE: &str = "iam";
const CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=utf-8";

/// Global endpoint and signing region for a configured region.
///
/// IAM is a global service: every commercial region signs against
/// `us-east-1`, while the China and GovCloud partitions have their own.
pub fn endpoint_for_region(region: &str) -> (&'static str, &'static str) {
    if region.starts_with("cn-") {
        ("https://iam.cn-north-1.amazonaws.com.cn/", "cn-north-1")
    } else if region.starts_with("us-gov-") {
        ("https://iam.us-gov.amazonaws.com/", "us-gov-west-1")
    } else {
        ("https://iam.amazonaws.com/", "us-east-1")
    }
}

// ============================================================
// API Response Types
// ============================================================

/// `<XResponse><XResult>..</XResult><ResponseMetadata/></XResponse>`
///
/// The root element name is not checked by quick-xml, so one envelope
/// covers every action through aliases on the result element.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(
        rename = "CreateUserResult",
        alias = "ListUsersResult",
        alias = "ListPoliciesResult",
        alias = "GetPolicyResult",
        alias = "GetPolicyVersionResult",
        alias = "ListAttachedUserPoliciesResult",
        alias = "ListAttachedRolePoliciesResult",
        alias = "ListUserPoliciesResult",
        alias = "ListRolePoliciesResult",
        alias = "GetUserPolicyResult",
        alias = "GetRolePolicyResult",
        alias = "CreateGroupResult",
        alias = "ListGroupsForUserResult",
        alias = "CreateAccessKeyResult",
        alias = "ListAccessKeysResult",
        alias = "ListMFADevicesResult",
        alias = "ListRolesResult"
    )]
    result: T,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    #[serde(rename = "Error")]
    error: ApiError,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApiError {
    code: String,
    #[serde(default)]
    message: String,
}

/// `<Items><member>..</member>...</Items>`
#[derive(Debug, Deserialize)]
struct Members<T> {
    #[serde(rename = "member", default = "Vec::new")]
    member: Vec<T>,
}

impl<T> Default for Members<T> {
    fn default() -> Self {
        Self { member: Vec::new() }
    }
}

/// One page of a list operation
trait Paged {
    type Item;
    fn into_page(self) -> (Vec<Self::Item>, Option<String>);
}

macro_rules! paged_result {
    ($name:ident, $field:ident, $tag:literal, $item:ty) => {
        #[derive(Debug, Deserialize)]
        #[serde(rename_all = "PascalCase")]
        struct $name {
            #[serde(rename = $tag, default)]
            $field: Members<$item>,
            #[serde(default)]
            is_truncated: bool,
            marker: Option<String>,
        }

        impl Paged for $name {
            type Item = $item;

            fn into_page(self) -> (Vec<$item>, Option<String>) {
                let next = if self.is_truncated { self.marker } else { None };
                (self.$field.member, next)
            }
        }
    };
}

paged_result!(ListUsersResult, users, "Users", User);
paged_result!(ListPoliciesResult, policies, "Policies", ManagedPolicy);
paged_result!(ListAttachedPoliciesResult, attached_policies, "AttachedPolicies", AttachedPolicy);
paged_result!(ListPolicyNamesResult, policy_names, "PolicyNames", String);
paged_result!(ListGroupsResult, groups, "Groups", Group);
paged_result!(ListAccessKeysResult, access_key_metadata, "AccessKeyMetadata", AccessKeyMetadata);
paged_result!(ListMfaDevicesResult, mfa_devices, "MFADevices", MfaDevice);
paged_result!(ListRolesResult, roles, "Roles", Role);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreateUserResult {
    user: User,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetPolicyResult {
    policy: ManagedPolicy,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetPolicyVersionResult {
    policy_version: PolicyVersion,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PolicyVersion {
    document: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InlinePolicyResult {
    policy_document: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreateGroupResult {
    group: Group,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreateAccessKeyResult {
    access_key: AccessKey,
}

/// Decode a successful response body.
fn parse_result<T: DeserializeOwned>(body: &str) -> Result<T> {
    let envelope: Envelope<T> =
        quick_xml::de::from_str(body).context("Failed to parse IAM XML response")?;
    Ok(envelope.result)
}

/// Turn an error response into a readable message.
fn parse_error(status: reqwest::StatusCode, body: &str) -> String {
    match quick_xml::de::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) if envelope.error.message.is_empty() => envelope.error.code,
        Ok(envelope) => format!("{}: {}", envelope.error.code, envelope.error.message),
        Err(_) => format!("IAM API returned {}: {}", status, body),
    }
}

/// Policy documents come back URL-encoded.
fn decode_document(raw: &str) -> Result<String> {
    Ok(urlencoding::decode(raw.trim())
        .context("Policy document is not valid URL-encoded UTF-8")?
        .into_owned())
}

// ============================================================
// Client Implementation
// ============================================================

/// IAM Query API client
pub struct IamClient {
    http: Client,
    endpoint: Url,
    host: String,
    signing_region: String,
    access_key_id: String,
    secret_access_key: String,
}

impl IamClient {
    /// Create a client for the configured account and region.
    pub fn new(config: &AppConfig) -> Result<Self> {
        let (default_endpoint, signing_region) = endpoint_for_region(&config.aws_region);
        let endpoint = config.iam_endpoint.as_deref().unwrap_or(default_endpoint);
        let endpoint = Url::parse(endpoint)
            .with_context(|| format!("Invalid IAM endpoint: {}", endpoint))?;

        let host = match (endpoint.host_str(), endpoint.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => bail!("IAM endpoint has no host: {}", endpoint),
        };

        let http = Client::builder()
            .user_agent(concat!("nl-iam/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        debug!(endpoint = %endpoint, region = %signing_region, "IAM client initialized");

        Ok(Self {
            http,
            endpoint,
            host,
            signing_region: signing_region.to_string(),
            access_key_id: config.aws_access_key_id.clone(),
            secret_access_key: config.aws_secret_access_key.clone(),
        })
    }

    /// Send one signed Query API request and return the raw XML body.
    async fn send(&self, action: &str, params: &[(&str, &str)]) -> Result<String> {
        let mut form: Vec<(&str, &str)> = vec![("Action", action), ("Version", IAM_API_VERSION)];
        form.extend_from_slice(params);
        let body = sigv4::canonical_query(&form);

        let signed = sigv4::sign(
            &SignableRequest {
                method: "POST",
                host: &self.host,
                path: self.endpoint.path(),
                query: "",
                content_type: CONTENT_TYPE,
                payload: body.as_bytes(),
            },
            &SigningKey {
                access_key_id: &self.access_key_id,
                secret_access_key: &self.secret_access_key,
                region: &self.signing_region,
                service: IAM_SERVICE,
            },
            Utc::now(),
        );

        debug!(action = %action, "Calling IAM");

        let response = self
            .http
            .post(self.endpoint.clone())
            .header("content-type", CONTENT_TYPE)
            .header("x-amz-date", &signed.x_amz_date)
            .header("authorization", &signed.authorization)
            .body(body)
            .send()
            .await
            .with_context(|| format!("Failed to call IAM {}", action))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .with_context(|| format!("Failed to read IAM {} response", action))?;

        if !status.is_success() {
            bail!("{}", parse_error(status, &text));
        }

        Ok(text)
    }

    async fn call<T: DeserializeOwned>(&self, action: &str, params: &[(&str, &str)]) -> Result<T> {
        let body = self.send(action, params).await?;
        parse_result(&body).with_context(|| format!("Unexpected IAM {} response", action))
    }

    /// Collect every page of a list operation.
    async fn list_all<R>(&self, action: &str, params: &[(&str, &str)]) -> Result<Vec<R::Item>>
    where
        R: DeserializeOwned + Paged,
    {
        let mut items = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let mut page_params: Vec<(&str, &str)> = params.to_vec();
            if let Some(m) = marker.as_deref() {
                page_params.push(("Marker", m));
            }

            let page: R = self.call(action, &page_params).await?;
            let (batch, next) = page.into_page();
            items.extend(batch);

            match next {
                Some(m) => marker = Some(m),
                None => break,
            }
        }

        debug!(action = %action, count = items.len(), "Listed");
        Ok(items)
    }
}

#[async_trait]
impl IdentityService for IamClient {
    async fn create_user(&self, user_name: &str, path: &str) -> Result<User> {
        let result: CreateUserResult = self
            .call("CreateUser", &[("UserName", user_name), ("Path", path)])
            .await?;
        Ok(result.user)
    }

    async fn delete_user(&self, user_name: &str) -> Result<()> {
        self.send("DeleteUser", &[("UserName", user_name)]).await?;
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        self.list_all::<ListUsersResult>("ListUsers", &[]).await
    }

    async fn list_policies(&self) -> Result<Vec<ManagedPolicy>> {
        self.list_all::<ListPoliciesResult>("ListPolicies", &[("Scope", "All")])
            .await
    }

    async fn get_policy(&self, policy_arn: &str) -> Result<ManagedPolicy> {
        let result: GetPolicyResult = self.call("GetPolicy", &[("PolicyArn", policy_arn)]).await?;
        Ok(result.policy)
    }

    async fn get_policy_document(&self, policy_arn: &str, version_id: &str) -> Result<String> {
        let result: GetPolicyVersionResult = self
            .call(
                "GetPolicyVersion",
                &[("PolicyArn", policy_arn), ("VersionId", version_id)],
            )
            .await?;
        decode_document(&result.policy_version.document)
    }

    async fn attach_user_policy(&self, user_name: &str, policy_arn: &str) -> Result<()> {
        self.send(
            "AttachUserPolicy",
            &[("UserName", user_name), ("PolicyArn", policy_arn)],
        )
        .await?;
        Ok(())
    }

    async fn detach_user_policy(&self, user_name: &str, policy_arn: &str) -> Result<()> {
        self.send(
            "DetachUserPolicy",
            &[("UserName", user_name), ("PolicyArn", policy_arn)],
        )
        .await?;
        Ok(())
    }

    async fn list_attached_user_policies(&self, user_name: &str) -> Result<Vec<AttachedPolicy>> {
        self.list_all::<ListAttachedPoliciesResult>(
            "ListAttachedUserPolicies",
            &[("UserName", user_name)],
        )
        .await
    }

    async fn list_user_policies(&self, user_name: &str) -> Result<Vec<String>> {
        self.list_all::<ListPolicyNamesResult>("ListUserPolicies", &[("UserName", user_name)])
            .await
    }

    async fn get_user_policy(&self, user_name: &str, policy_name: &str) -> Result<String> {
        let result: InlinePolicyResult = self
            .call(
                "GetUserPolicy",
                &[("UserName", user_name), ("PolicyName", policy_name)],
            )
            .await?;
        decode_document(&result.policy_document)
    }

    async fn create_group(&self, group_name: &str) -> Result<Group> {
        let result: CreateGroupResult =
            self.call("CreateGroup", &[("GroupName", group_name)]).await?;
        Ok(result.group)
    }

    async fn delete_group(&self, group_name: &str) -> Result<()> {
        self.send("DeleteGroup", &[("GroupName", group_name)]).await?;
        Ok(())
    }

    async fn add_user_to_group(&self, user_name: &str, group_name: &str) -> Result<()> {
        self.send(
            "AddUserToGroup",
            &[("UserName", user_name), ("GroupName", group_name)],
        )
        .await?;
        Ok(())
    }

    async fn remove_user_from_group(&self, user_name: &str, group_name: &str) -> Result<()> {
        self.send(
            "RemoveUserFromGroup",
            &[("UserName", user_name), ("GroupName", group_name)],
        )
        .await?;
        Ok(())
    }

    async fn list_groups_for_user(&self, user_name: &str) -> Result<Vec<Group>> {
        self.list_all::<ListGroupsResult>("ListGroupsForUser", &[("UserName", user_name)])
            .await
    }

    async fn create_access_key(&self, user_name: &str) -> Result<AccessKey> {
        let result: CreateAccessKeyResult = self
            .call("CreateAccessKey", &[("UserName", user_name)])
            .await?;
        Ok(result.access_key)
    }

    async fn list_access_keys(&self, user_name: &str) -> Result<Vec<AccessKeyMetadata>> {
        self.list_all::<ListAccessKeysResult>("ListAccessKeys", &[("UserName", user_name)])
            .await
    }

    async fn delete_access_key(&self, user_name: &str, access_key_id: &str) -> Result<()> {
        self.send(
            "DeleteAccessKey",
            &[("UserName", user_name), ("AccessKeyId", access_key_id)],
        )
        .await?;
        Ok(())
    }

    async fn list_mfa_devices(&self, user_name: &str) -> Result<Vec<MfaDevice>> {
        self.list_all::<ListMfaDevicesResult>("ListMFADevices", &[("UserName", user_name)])
            .await
    }

    async fn list_roles(&self) -> Result<Vec<Role>> {
        self.list_all::<ListRolesResult>("ListRoles", &[]).await
    }

    async fn list_attached_role_policies(&self, role_name: &str) -> Result<Vec<AttachedPolicy>> {
        self.list_all::<ListAttachedPoliciesResult>(
            "ListAttachedRolePolicies",
            &[("RoleName", role_name)],
        )
        .await
    }

    async fn list_role_policies(&self, role_name: &str) -> Result<Vec<String>> {
        self.list_all::<ListPolicyNamesResult>("ListRolePolicies", &[("RoleName", role_name)])
            .await
    }

    async fn get_role_policy(&self, role_name: &str, policy_name: &str) -> Result<String> {
        let result: InlinePolicyResult = self
            .call(
                "GetRolePolicy",
                &[("RoleName", role_name), ("PolicyName", policy_name)],
            )
            .await?;
        decode_document(&result.policy_document)
    }
}
