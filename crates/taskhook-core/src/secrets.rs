//! Secret stores backed by the process environment or mounted files.
//!
//! Secret references in tenant metadata are usually full resource paths such
//! as `projects/acme/secrets/acct-123-webhook/versions/latest`. Both stores
//! reduce such a path to its secret name (`acct-123-webhook`) before lookup;
//! plain names are used as-is.

use std::{
    collections::HashMap,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use tracing::debug;

use crate::stores::{SecretStore, StoreError};

/// Extracts the secret name from a resource-path style reference.
pub fn secret_name(secret_ref: &str) -> &str {
    let trimmed = secret_ref.trim().trim_matches('/');
    let segments: Vec<&str> = trimmed.split('/').collect();

    match segments.iter().position(|segment| *segment == "secrets") {
        Some(index) if index + 1 < segments.len() => segments[index + 1],
        _ => segments.last().copied().unwrap_or(trimmed),
    }
}

/// Secret store reading values from environment variables.
///
/// A reference maps to an explicit variable name when one is registered,
/// otherwise to its secret name upper-cased with every non-alphanumeric
/// character replaced by `_` (`acct-123-webhook` → `ACCT_123_WEBHOOK`).
#[derive(Debug, Default)]
pub struct EnvSecretStore {
    mappings: HashMap<String, String>,
}

impl EnvSecretStore {
    /// Creates a store with explicit reference → variable name mappings.
    pub fn new(mappings: HashMap<String, String>) -> Self {
        Self { mappings }
    }

    /// Environment variable consulted for `secret_ref`.
    pub fn env_var_name(&self, secret_ref: &str) -> String {
        if let Some(mapped) = self.mappings.get(secret_ref) {
            return mapped.clone();
        }

        secret_name(secret_ref)
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect()
    }
}

#[async_trait]
impl SecretStore for EnvSecretStore {
    async fn resolve(&self, secret_ref: &str) -> Result<Vec<u8>, StoreError> {
        let env_var = self.env_var_name(secret_ref);

        match std::env::var_os(&env_var) {
            Some(value) if !value.is_empty() => {
                debug!(env_var = %env_var, "Secret loaded from environment variable");
                Ok(value.into_encoded_bytes())
            },
            _ => Err(StoreError::NotFound(secret_ref.to_string())),
        }
    }
}

/// Secret store reading values from files in a directory.
///
/// Reads are blocking filesystem calls and run on the blocking thread pool so
/// they never stall the async runtime.
#[derive(Debug, Clone)]
pub struct FileSecretStore {
    root: PathBuf,
}

impl FileSecretStore {
    /// Creates a store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory secrets are read from.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File consulted for `secret_ref`.
    pub fn path_for(&self, secret_ref: &str) -> PathBuf {
        self.root.join(secret_name(secret_ref))
    }
}

#[async_trait]
impl SecretStore for FileSecretStore {
    async fn resolve(&self, secret_ref: &str) -> Result<Vec<u8>, StoreError> {
        let name = secret_name(secret_ref);
        if name.is_empty() || name == "." || name == ".." {
            return Err(StoreError::Invalid(format!("unusable secret reference {secret_ref:?}")));
        }

        let path = self.path_for(secret_ref);
        let secret_ref = secret_ref.to_string();

        tokio::task::spawn_blocking(move || match std::fs::read(&path) {
            Ok(mut bytes) => {
                while bytes.last().is_some_and(|b| *b == b'\n' || *b == b'\r') {
                    bytes.pop();
                }
                Ok(bytes)
            },
            Err(err) if err.kind() == ErrorKind::NotFound => Err(StoreError::NotFound(secret_ref)),
            Err(err) => Err(StoreError::Unavailable(format!("reading {}: {err}", path.display()))),
        })
        .await
        .map_err(|err| StoreError::Unavailable(format!("secret read task failed: {err}")))?
    }
}
