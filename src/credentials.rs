//! Local Credential Store
//!
//! Keeps the four secrets the assistant needs in a `KEY=VALUE` file in the
//! user's home directory (`~/.env` by default). Values exported in the
//! process environment take precedence over the file, the same way a
//! dotenv loader without override behaves.
//!
//! No encryption and no locking: access control is whatever the
//! filesystem permissions provide (the file is created `0600` on unix).

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

use crate::error::NlIamError;

/// Name of the credentials file inside the home directory
pub const CREDENTIALS_FILE_NAME: &str = ".env";

/// Leading comment written to a fresh credentials file
const FILE_HEADER: &str = "# AWS and OpenAI Credentials";

/// The credentials the assistant understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CredentialKey {
    AwsAccessKeyId,
    AwsSecretAccessKey,
    AwsRegion,
    OpenAiApiKey,
}

impl CredentialKey {
    pub const ALL: [CredentialKey; 4] = [
        CredentialKey::AwsAccessKeyId,
        CredentialKey::AwsSecretAccessKey,
        CredentialKey::AwsRegion,
        CredentialKey::OpenAiApiKey,
    ];

    /// Variable name used in the file and the process environment
    pub fn env_name(&self) -> &'static str {
        match self {
            CredentialKey::AwsAccessKeyId => "AWS_ACCESS_KEY_ID",
            CredentialKey::AwsSecretAccessKey => "AWS_SECRET_ACCESS_KEY",
            CredentialKey::AwsRegion => "AWS_DEFAULT_REGION",
            CredentialKey::OpenAiApiKey => "OPENAI_API_KEY",
        }
    }

    /// Name accepted by `config set`
    pub fn cli_name(&self) -> &'static str {
        match self {
            CredentialKey::AwsAccessKeyId => "aws-access-key",
            CredentialKey::AwsSecretAccessKey => "aws-secret-key",
            CredentialKey::AwsRegion => "aws-region",
            CredentialKey::OpenAiApiKey => "openai-key",
        }
    }
}

impl std::fmt::Display for CredentialKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.env_name())
    }
}

impl FromStr for CredentialKey {
    type Err = NlIamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CredentialKey::ALL
            .into_iter()
            .find(|k| k.cli_name() == s || k.env_name() == s)
            .ok_or_else(|| NlIamError::InvalidCredentialKey(s.to_string()))
    }
}

/// Snapshot of all four credentials; `None` means not configured.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
    pub aws_region: Option<String>,
    pub openai_api_key: Option<String>,
}

impl Credentials {
    pub fn get(&self, key: CredentialKey) -> Option<&str> {
        match key {
            CredentialKey::AwsAccessKeyId => self.aws_access_key_id.as_deref(),
            CredentialKey::AwsSecretAccessKey => self.aws_secret_access_key.as_deref(),
            CredentialKey::AwsRegion => self.aws_region.as_deref(),
            CredentialKey::OpenAiApiKey => self.openai_api_key.as_deref(),
        }
    }

    /// Keys without a value, in [`CredentialKey::ALL`] order
    pub fn missing(&self) -> Vec<CredentialKey> {
        CredentialKey::ALL
            .into_iter()
            .filter(|k| self.get(*k).is_none())
            .collect()
    }

}

/// File-backed credential store
pub struct CredentialStore {
    path: PathBuf,
    values: HashMap<String, String>,
    read_env: bool,
}

impl CredentialStore {
    /// Default location: `$HOME/.env`
    pub fn default_path() -> Result<PathBuf> {
        let home = home::home_dir().context("Could not determine home directory")?;
        Ok(home.join(CREDENTIALS_FILE_NAME))
    }

    /// Open (creating if needed) the credentials file at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        ensure_file(&path)?;

        let values = load_file(&path)?;
        debug!(path = %path.display(), entries = values.len(), "Loaded credentials file");

        Ok(Self {
            path,
            values,
            read_env: true,
        })
    }

    /// Ignore the process environment and only consult the file.
    pub fn without_env(mut self) -> Self {
        self.read_env = false;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current value for `key`; empty strings count as unset.
    pub fn get(&self, key: CredentialKey) -> Option<String> {
        let from_env = if self.read_env {
            std::env::var(key.env_name()).ok()
        } else {
            None
        };

        from_env
            .or_else(|| self.values.get(key.env_name()).cloned())
            .filter(|v| !v.is_empty())
    }

    /// Persist `value` for `key`, then update the in-memory view.
    ///
    /// Values are written single-quoted so dotenvy reads them back
    /// verbatim; line breaks cannot be represented and are rejected.
    pub fn set(&mut self, key: CredentialKey, value: &str) -> Result<()> {
        let name = key.env_name();
        if value.contains(['\n', '\r']) {
            bail!("{} cannot contain line breaks", name);
        }

        let existing = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;

        let updated = upsert_line(&existing, name, value);
        fs::write(&self.path, updated)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;

        self.values.insert(name.to_string(), value.to_string());
        info!(key = %name, length = value.len(), "Credential saved");
        Ok(())
    }

    pub fn get_all(&self) -> Credentials {
        Credentials {
            aws_access_key_id: self.get(CredentialKey::AwsAccessKeyId),
            aws_secret_access_key: self.get(CredentialKey::AwsSecretAccessKey),
            aws_region: self.get(CredentialKey::AwsRegion),
            openai_api_key: self.get(CredentialKey::OpenAiApiKey),
        }
    }

    pub fn missing(&self) -> Vec<CredentialKey> {
        self.get_all().missing()
    }
}

/// Create the file (and parent directories) with the header comment.
fn ensure_file(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }

    fs::write(path, format!("{}\n", FILE_HEADER))
        .with_context(|| format!("Failed to create {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .with_context(|| format!("Failed to restrict permissions on {}", path.display()))?;
    }

    info!(path = %path.display(), "Created credentials file");
    Ok(())
}

fn load_file(path: &Path) -> Result<HashMap<String, String>> {
    let iter = dotenvy::from_path_iter(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let mut values = HashMap::new();
    for item in iter {
        let (key, value) =
            item.with_context(|| format!("Malformed line in {}", path.display()))?;
        values.insert(key, value);
    }
    Ok(values)
}

/// Replace the `name=` line in `contents`, or append one.
fn upsert_line(contents: &str, name: &str, value: &str) -> String {
    let new_line = format!("{}={}", name, quote(value));
    let mut replaced = false;

    let mut lines: Vec<String> = contents
        .lines()
        .map(|line| {
            if !replaced && line_key(line) == Some(name) {
                replaced = true;
                new_line.clone()
            } else {
                line.to_string()
            }
        })
        .collect();

    if !replaced {
        lines.push(new_line);
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Strong-quote a value: `it's` becomes `'it'\''s'`.
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// Key of a `KEY=VALUE` line, tolerating `export ` and spaces.
fn line_key(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    if trimmed.starts_with('#') {
        return None;
    }
    let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
    trimmed.split_once('=').map(|(k, _)| k.trim())
}

/// Mask a secret for display: first and last four characters survive.
pub fn mask(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}{}{}", head, "*".repeat(chars.len() - 8), tail)
    } else {
        "****".to_string()
    }
}
