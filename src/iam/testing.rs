//! In-memory identity service for tests.
//!
//! Behaves like IAM for the calls the assistant makes: entities that do
//! not exist yield `NoSuchEntity`, deleting a user that still has
//! memberships, keys or attached policies yields `DeleteConflict`. Every
//! call is appended to an ordered log (`DeleteUser(bob)`,
//! `AttachUserPolicy(bob, arn:...)`), and any operation can be scripted to
//! fail on its n-th invocation.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use super::{
    AccessKey, AccessKeyMetadata, AttachedPolicy, Group, IdentityService, ManagedPolicy,
    MfaDevice, Role, User,
};

const ACCOUNT: &str = "123456789012";

/// Timestamp used for every entity created without an explicit date
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

#[derive(Debug, Clone)]
struct FakeUser {
    user: User,
    groups: Vec<String>,
    keys: Vec<AccessKeyMetadata>,
    attached: Vec<AttachedPolicy>,
    inline: BTreeMap<String, String>,
    mfa: Vec<MfaDevice>,
}

#[derive(Debug, Clone)]
struct FakeRole {
    role: Role,
    attached: Vec<AttachedPolicy>,
    inline: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
struct State {
    users: BTreeMap<String, FakeUser>,
    roles: BTreeMap<String, FakeRole>,
    groups: BTreeMap<String, Group>,
    policies: Vec<ManagedPolicy>,
    /// policy ARN -> default version document
    documents: HashMap<String, String>,
    calls: Vec<String>,
    invocations: HashMap<String, usize>,
    /// (operation, 1-based invocation that fails)
    failures: Vec<(String, usize)>,
    key_seq: u32,
}

impl State {
    /// Log the call and apply any scripted failure for it.
    fn record(&mut self, op: &str, call: String) -> Result<()> {
        self.calls.push(call);
        let count = self.invocations.entry(op.to_string()).or_insert(0);
        *count += 1;
        let nth = *count;
        if self.failures.iter().any(|(o, n)| o == op && *n == nth) {
            bail!("ServiceFailure: scripted failure of {} #{}", op, nth);
        }
        Ok(())
    }

    fn user_mut(&mut self, user_name: &str) -> Result<&mut FakeUser> {
        match self.users.get_mut(user_name) {
            Some(u) => Ok(u),
            None => bail!(
                "NoSuchEntity: The user with name {} cannot be found.",
                user_name
            ),
        }
    }

    fn role(&self, role_name: &str) -> Result<&FakeRole> {
        match self.roles.get(role_name) {
            Some(r) => Ok(r),
            None => bail!(
                "NoSuchEntity: The role with name {} cannot be found.",
                role_name
            ),
        }
    }

    fn policy_by_arn(&self, arn: &str) -> Result<ManagedPolicy> {
        match self.policies.iter().find(|p| p.arn == arn) {
            Some(p) => Ok(p.clone()),
            None => bail!("NoSuchEntity: Policy {} does not exist or is not attachable.", arn),
        }
    }

    fn attached_for(&self, arn: &str) -> AttachedPolicy {
        let name = self
            .policies
            .iter()
            .find(|p| p.arn == arn)
            .map(|p| p.policy_name.clone())
            .unwrap_or_else(|| arn.rsplit('/').next().unwrap_or(arn).to_string());
        AttachedPolicy {
            policy_name: name,
            policy_arn: arn.to_string(),
        }
    }
}

fn new_user(name: &str, created: DateTime<Utc>) -> FakeUser {
    FakeUser {
        user: User {
            user_name: name.to_string(),
            user_id: format!("AIDA{}", name.to_uppercase()),
            arn: format!("arn:aws:iam::{}:user/{}", ACCOUNT, name),
            path: "/".to_string(),
            create_date: created,
        },
        groups: Vec::new(),
        keys: Vec::new(),
        attached: Vec::new(),
        inline: BTreeMap::new(),
        mfa: Vec::new(),
    }
}

fn new_group(name: &str) -> Group {
    Group {
        group_name: name.to_string(),
        group_id: format!("AGPA{}", name.to_uppercase()),
        arn: format!("arn:aws:iam::{}:group/{}", ACCOUNT, name),
        path: "/".to_string(),
        create_date: epoch(),
    }
}

/// AWS-managed policy ARN for `name`
pub fn aws_policy_arn(name: &str) -> String {
    format!("arn:aws:iam::aws:policy/{}", name)
}

#[derive(Debug, Default)]
pub struct FakeIdentityService {
    state: Mutex<State>,
}

impl FakeIdentityService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(self, name: &str) -> Self {
        self.with_user_created(name, epoch())
    }

    pub fn with_user_created(self, name: &str, created: DateTime<Utc>) -> Self {
        self.state
            .lock()
            .unwrap()
            .users
            .insert(name.to_string(), new_user(name, created));
        self
    }

    /// Register a managed policy; it gets version `v1`.
    pub fn with_policy(self, name: &str, arn: &str) -> Self {
        self.state.lock().unwrap().policies.push(ManagedPolicy {
            policy_name: name.to_string(),
            arn: arn.to_string(),
            policy_id: format!("ANPA{}", name.to_uppercase()),
            path: "/".to_string(),
            default_version_id: Some("v1".to_string()),
            attachment_count: Some(0),
        });
        self
    }

    pub fn with_policy_document(self, arn: &str, document: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .documents
            .insert(arn.to_string(), document.to_string());
        self
    }

    pub fn with_group_membership(self, user: &str, group: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state
                .groups
                .entry(group.to_string())
                .or_insert_with(|| new_group(group));
            state.users.get_mut(user).unwrap().groups.push(group.to_string());
        }
        self
    }

    pub fn with_access_key(self, user: &str, key_id: &str, created: DateTime<Utc>) -> Self {
        self.state
            .lock()
            .unwrap()
            .users
            .get_mut(user)
            .unwrap()
            .keys
            .push(AccessKeyMetadata {
                user_name: user.to_string(),
                access_key_id: key_id.to_string(),
                status: "Active".to_string(),
                create_date: created,
            });
        self
    }

    pub fn with_attached_policy(self, user: &str, arn: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let attached = state.attached_for(arn);
            state.users.get_mut(user).unwrap().attached.push(attached);
        }
        self
    }

    pub fn with_inline_policy(self, user: &str, name: &str, document: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .users
            .get_mut(user)
            .unwrap()
            .inline
            .insert(name.to_string(), document.to_string());
        self
    }

    pub fn with_mfa(self, user: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .users
            .get_mut(user)
            .unwrap()
            .mfa
            .push(MfaDevice {
                user_name: user.to_string(),
                serial_number: format!("arn:aws:iam::{}:mfa/{}", ACCOUNT, user),
                enable_date: epoch(),
            });
        self
    }

    pub fn with_role(self, name: &str) -> Self {
        self.state.lock().unwrap().roles.insert(
            name.to_string(),
            FakeRole {
                role: Role {
                    role_name: name.to_string(),
                    role_id: format!("AROA{}", name.to_uppercase()),
                    arn: format!("arn:aws:iam::{}:role/{}", ACCOUNT, name),
                    path: "/".to_string(),
                    create_date: epoch(),
                },
                attached: Vec::new(),
                inline: BTreeMap::new(),
            },
        );
        self
    }

    pub fn with_role_attached_policy(self, role: &str, arn: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let attached = state.attached_for(arn);
            state.roles.get_mut(role).unwrap().attached.push(attached);
        }
        self
    }

    pub fn with_role_inline_policy(self, role: &str, name: &str, document: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .roles
            .get_mut(role)
            .unwrap()
            .inline
            .insert(name.to_string(), document.to_string());
        self
    }

    /// Make the `nth` (1-based) call of `op` fail, e.g. `("DeleteAccessKey", 2)`.
    pub fn fail_on(self, op: &str, nth: usize) -> Self {
        self.state
            .lock()
            .unwrap()
            .failures
            .push((op.to_string(), nth));
        self
    }

    /// Every call so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Calls that change state (everything except List* / Get*)
    pub fn mutating_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| !c.starts_with("List") && !c.starts_with("Get"))
            .collect()
    }

    pub fn clear_calls(&self) {
        let mut state = self.state.lock().unwrap();
        state.calls.clear();
        state.invocations.clear();
        state.failures.clear();
    }

    pub fn has_user(&self, name: &str) -> bool {
        self.state.lock().unwrap().users.contains_key(name)
    }

    pub fn key_ids(&self, user: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .users
            .get(user)
            .map(|u| u.keys.iter().map(|k| k.access_key_id.clone()).collect())
            .unwrap_or_default()
    }

    pub fn attached_arns(&self, user: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .users
            .get(user)
            .map(|u| u.attached.iter().map(|p| p.policy_arn.clone()).collect())
            .unwrap_or_default()
    }

    pub fn groups_of(&self, user: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .users
            .get(user)
            .map(|u| u.groups.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl IdentityService for FakeIdentityService {
    async fn create_user(&self, user_name: &str, path: &str) -> Result<User> {
        let mut state = self.state.lock().unwrap();
        state.record("CreateUser", format!("CreateUser({}, {})", user_name, path))?;
        if state.users.contains_key(user_name) {
            bail!("EntityAlreadyExists: User with name {} already exists.", user_name);
        }
        let mut user = new_user(user_name, epoch());
        user.user.path = path.to_string();
        let created = user.user.clone();
        state.users.insert(user_name.to_string(), user);
        Ok(created)
    }

    async fn delete_user(&self, user_name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.record("DeleteUser", format!("DeleteUser({})", user_name))?;
        let user = state.user_mut(user_name)?;
        if !user.groups.is_empty() || !user.keys.is_empty() || !user.attached.is_empty() {
            bail!("DeleteConflict: Cannot delete entity, must remove referenced objects first.");
        }
        state.users.remove(user_name);
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let mut state = self.state.lock().unwrap();
        state.record("ListUsers", "ListUsers".to_string())?;
        Ok(state.users.values().map(|u| u.user.clone()).collect())
    }

    async fn list_policies(&self) -> Result<Vec<ManagedPolicy>> {
        let mut state = self.state.lock().unwrap();
        state.record("ListPolicies", "ListPolicies".to_string())?;
        Ok(state.policies.clone())
    }

    async fn get_policy(&self, policy_arn: &str) -> Result<ManagedPolicy> {
        let mut state = self.state.lock().unwrap();
        state.record("GetPolicy", format!("GetPolicy({})", policy_arn))?;
        state.policy_by_arn(policy_arn)
    }

    async fn get_policy_document(&self, policy_arn: &str, version_id: &str) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.record(
            "GetPolicyVersion",
            format!("GetPolicyVersion({}, {})", policy_arn, version_id),
        )?;
        match state.documents.get(policy_arn) {
            Some(doc) => Ok(doc.clone()),
            None => bail!(
                "NoSuchEntity: Policy version {} of {} not found.",
                version_id,
                policy_arn
            ),
        }
    }

    async fn attach_user_policy(&self, user_name: &str, policy_arn: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.record(
            "AttachUserPolicy",
            format!("AttachUserPolicy({}, {})", user_name, policy_arn),
        )?;
        let attached = state.attached_for(policy_arn);
        let user = state.user_mut(user_name)?;
        if !user.attached.iter().any(|p| p.policy_arn == policy_arn) {
            user.attached.push(attached);
        }
        Ok(())
    }

    async fn detach_user_policy(&self, user_name: &str, policy_arn: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.record(
            "DetachUserPolicy",
            format!("DetachUserPolicy({}, {})", user_name, policy_arn),
        )?;
        let user = state.user_mut(user_name)?;
        let before = user.attached.len();
        user.attached.retain(|p| p.policy_arn != policy_arn);
        if user.attached.len() == before {
            bail!("NoSuchEntity: Policy {} was not found.", policy_arn);
        }
        Ok(())
    }

    async fn list_attached_user_policies(&self, user_name: &str) -> Result<Vec<AttachedPolicy>> {
        let mut state = self.state.lock().unwrap();
        state.record(
            "ListAttachedUserPolicies",
            format!("ListAttachedUserPolicies({})", user_name),
        )?;
        Ok(state.user_mut(user_name)?.attached.clone())
    }

    async fn list_user_policies(&self, user_name: &str) -> Result<Vec<String>> {
        let mut state = self.state.lock().unwrap();
        state.record("ListUserPolicies", format!("ListUserPolicies({})", user_name))?;
        Ok(state.user_mut(user_name)?.inline.keys().cloned().collect())
    }

    async fn get_user_policy(&self, user_name: &str, policy_name: &str) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.record(
            "GetUserPolicy",
            format!("GetUserPolicy({}, {})", user_name, policy_name),
        )?;
        match state.user_mut(user_name)?.inline.get(policy_name) {
            Some(doc) => Ok(doc.clone()),
            None => bail!("NoSuchEntity: The user policy {} cannot be found.", policy_name),
        }
    }

    async fn create_group(&self, group_name: &str) -> Result<Group> {
        let mut state = self.state.lock().unwrap();
        state.record("CreateGroup", format!("CreateGroup({})", group_name))?;
        if state.groups.contains_key(group_name) {
            bail!("EntityAlreadyExists: Group with name {} already exists.", group_name);
        }
        let group = new_group(group_name);
        state.groups.insert(group_name.to_string(), group.clone());
        Ok(group)
    }

    async fn delete_group(&self, group_name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.record("DeleteGroup", format!("DeleteGroup({})", group_name))?;
        if state.groups.remove(group_name).is_none() {
            bail!("NoSuchEntity: The group with name {} cannot be found.", group_name);
        }
        Ok(())
    }

    async fn add_user_to_group(&self, user_name: &str, group_name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.record(
            "AddUserToGroup",
            format!("AddUserToGroup({}, {})", user_name, group_name),
        )?;
        if !state.groups.contains_key(group_name) {
            bail!("NoSuchEntity: The group with name {} cannot be found.", group_name);
        }
        let user = state.user_mut(user_name)?;
        if !user.groups.iter().any(|g| g == group_name) {
            user.groups.push(group_name.to_string());
        }
        Ok(())
    }

    async fn remove_user_from_group(&self, user_name: &str, group_name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.record(
            "RemoveUserFromGroup",
            format!("RemoveUserFromGroup({}, {})", user_name, group_name),
        )?;
        let user = state.user_mut(user_name)?;
        let before = user.groups.len();
        user.groups.retain(|g| g != group_name);
        if user.groups.len() == before {
            bail!("NoSuchEntity: User {} is not in group {}.", user_name, group_name);
        }
        Ok(())
    }

    async fn list_groups_for_user(&self, user_name: &str) -> Result<Vec<Group>> {
        let mut state = self.state.lock().unwrap();
        state.record("ListGroupsForUser", format!("ListGroupsForUser({})", user_name))?;
        let names = state.user_mut(user_name)?.groups.clone();
        Ok(names
            .iter()
            .map(|n| state.groups.get(n).cloned().unwrap_or_else(|| new_group(n)))
            .collect())
    }

    async fn create_access_key(&self, user_name: &str) -> Result<AccessKey> {
        let mut state = self.state.lock().unwrap();
        state.record("CreateAccessKey", format!("CreateAccessKey({})", user_name))?;
        state.key_seq += 1;
        let seq = state.key_seq;
        let key = AccessKey {
            user_name: user_name.to_string(),
            access_key_id: format!("AKIANEW{:08}", seq),
            status: "Active".to_string(),
            secret_access_key: format!("fake-secret-{}", seq),
            create_date: Utc::now(),
        };
        state.user_mut(user_name)?.keys.push(AccessKeyMetadata {
            user_name: key.user_name.clone(),
            access_key_id: key.access_key_id.clone(),
            status: key.status.clone(),
            create_date: key.create_date,
        });
        Ok(key)
    }

    async fn list_access_keys(&self, user_name: &str) -> Result<Vec<AccessKeyMetadata>> {
        let mut state = self.state.lock().unwrap();
        state.record("ListAccessKeys", format!("ListAccessKeys({})", user_name))?;
        Ok(state.user_mut(user_name)?.keys.clone())
    }

    async fn delete_access_key(&self, user_name: &str, access_key_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.record(
            "DeleteAccessKey",
            format!("DeleteAccessKey({}, {})", user_name, access_key_id),
        )?;
        let user = state.user_mut(user_name)?;
        let before = user.keys.len();
        user.keys.retain(|k| k.access_key_id != access_key_id);
        if user.keys.len() == before {
            bail!("NoSuchEntity: The Access Key with id {} cannot be found.", access_key_id);
        }
        Ok(())
    }

    async fn list_mfa_devices(&self, user_name: &str) -> Result<Vec<MfaDevice>> {
        let mut state = self.state.lock().unwrap();
        state.record("ListMFADevices", format!("ListMFADevices({})", user_name))?;
        Ok(state.user_mut(user_name)?.mfa.clone())
    }

    async fn list_roles(&self) -> Result<Vec<Role>> {
        let mut state = self.state.lock().unwrap();
        state.record("ListRoles", "ListRoles".to_string())?;
        Ok(state.roles.values().map(|r| r.role.clone()).collect())
    }

    async fn list_attached_role_policies(&self, role_name: &str) -> Result<Vec<AttachedPolicy>> {
        let mut state = self.state.lock().unwrap();
        state.record(
            "ListAttachedRolePolicies",
            format!("ListAttachedRolePolicies({})", role_name),
        )?;
        Ok(state.role(role_name)?.attached.clone())
    }

    async fn list_role_policies(&self, role_name: &str) -> Result<Vec<String>> {
        let mut state = self.state.lock().unwrap();
        state.record("ListRolePolicies", format!("ListRolePolicies({})", role_name))?;
        Ok(state.role(role_name)?.inline.keys().cloned().collect())
    }

    async fn get_role_policy(&self, role_name: &str, policy_name: &str) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.record(
            "GetRolePolicy",
            format!("GetRolePolicy({}, {})", role_name, policy_name),
        )?;
        match state.role(role_name)?.inline.get(policy_name) {
            Some(doc) => Ok(doc.clone()),
            None => bail!("NoSuchEntity: The role policy {} cannot be found.", policy_name),
        }
    }
}
