//! API credentials and the optional `.env` overlay.
//!
//! Credentials are normally stored in the settings record. An operator may
//! instead keep them in a private `.env` file (`WPE_API_USERNAME`,
//! `WPE_API_PASSWORD`), which then takes precedence at read time.

use std::fs;
use std::path::Path;

use anyhow::Context;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// `.env` key holding the API username.
pub const USERNAME_KEY: &str = "WPE_API_USERNAME";
/// `.env` key holding the API password.
pub const PASSWORD_KEY: &str = "WPE_API_PASSWORD";

/// Username/password pair for HTTP Basic authentication.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiCredentials {
    /// API username.
    pub username: String,
    /// API password.
    pub password: String,
}

impl std::fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("username_set", &!self.username.is_empty())
            .field("password", &"[REDACTED]")
            .finish()
    }
}

impl ApiCredentials {
    /// Build credentials from a username and password.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Whether both halves are non-empty.
    pub fn is_complete(&self) -> bool {
        !self.username.trim().is_empty() && !self.password.trim().is_empty()
    }

    /// Value for the `Authorization` header.
    pub fn basic_auth_header(&self) -> String {
        let token = STANDARD.encode(format!("{}:{}", self.username, self.password));
        format!("Basic {token}")
    }
}

/// Load credentials from a `.env` file, if it exists.
///
/// Returns `Ok(None)` when the file is absent or does not define both keys.
///
/// # Errors
///
/// Returns an error if the file permissions are too broad or parsing fails.
pub fn load_env_credentials(path: &Path) -> anyhow::Result<Option<ApiCredentials>> {
    if !path.exists() {
        return Ok(None);
    }

    validate_private_permissions(path)?;

    let mut username = None;
    let mut password = None;
    let iter = dotenvy::from_path_iter(path)
        .with_context(|| format!("failed to read credentials at {}", path.display()))?;

    for item in iter {
        let (key, value) = item.with_context(|| {
            format!(
                "failed to parse key-value entry in credentials file {}",
                path.display()
            )
        })?;
        match key.as_str() {
            USERNAME_KEY => username = Some(value),
            PASSWORD_KEY => password = Some(value),
            _ => {}
        }
    }

    let credentials = match (username, password) {
        (Some(u), Some(p)) => ApiCredentials::new(u, p),
        _ => return Ok(None),
    };
    Ok(credentials.is_complete().then_some(credentials))
}

/// Restrict a file to owner read/write when supported.
///
/// # Errors
///
/// Returns an error if permissions cannot be updated.
pub fn enforce_private_file_permissions(path: &Path) -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let perms = fs::Permissions::from_mode(0o600);
        fs::set_permissions(path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }
    #[cfg(not(unix))]
    let _ = path;

    Ok(())
}

#[cfg(unix)]
fn validate_private_permissions(path: &Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = fs::metadata(path)
        .with_context(|| format!("failed to inspect credentials file {}", path.display()))?;
    let mode = metadata.permissions().mode() & 0o777;

    if mode & 0o077 != 0 {
        return Err(anyhow::anyhow!(
            "credentials file {} must be 0600, found {:o}",
            path.display(),
            mode
        ));
    }

    Ok(())
}

#[cfg(not(unix))]
fn validate_private_permissions(_path: &Path) -> anyhow::Result<()> {
    Ok(())
}
