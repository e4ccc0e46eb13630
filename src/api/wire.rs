//! JSON shapes exchanged with the remote API.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::settings::Environment;

/// A deployable site unit on the hosting platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Install {
    /// Stable identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Hosting environment, `unknown` when absent or null.
    #[serde(default, deserialize_with = "null_as_unknown")]
    pub environment: Environment,
}

/// One page of the install listing.
///
/// The API answers either with an envelope or with a bare array; the bare
/// form is a complete listing in a single page.
#[derive(Debug, Clone)]
pub enum InstallPage {
    /// `{ "results": [...], "count": N }`.
    Enveloped {
        /// Installs on this page.
        results: Vec<Install>,
        /// Server-reported total across all pages.
        count: u64,
    },
    /// `[...]`.
    Bare(Vec<Install>),
}

impl<'de> Deserialize<'de> for InstallPage {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error;

        match Value::deserialize(deserializer)? {
            Value::Array(items) => parse_installs(items).map(Self::Bare).map_err(D::Error::custom),
            Value::Object(mut map) => {
                let results = match map.remove("results") {
                    Some(Value::Array(items)) => parse_installs(items).map_err(D::Error::custom)?,
                    Some(other) => {
                        return Err(D::Error::custom(format!(
                            "`results` must be an array, got {}",
                            json_kind(&other)
                        )))
                    }
                    None => return Err(D::Error::missing_field("results")),
                };
                let count = match map.remove("count") {
                    None | Some(Value::Null) => 0,
                    Some(value) => u64::deserialize(value)
                        .map_err(|e| D::Error::custom(format!("`count`: {e}")))?,
                };
                Ok(Self::Enveloped { results, count })
            }
            other => Err(D::Error::custom(format!(
                "expected an install array or a `results` envelope, got {}",
                json_kind(&other)
            ))),
        }
    }
}

fn parse_installs(items: Vec<Value>) -> Result<Vec<Install>, String> {
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            Install::deserialize(item).map_err(|e| format!("install at index {index}: {e}"))
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn null_as_unknown<'de, D>(deserializer: D) -> Result<Environment, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Environment>::deserialize(deserializer)?.unwrap_or(Environment::Unknown))
}

impl InstallPage {
    /// Split into `(installs, reported_total, is_complete_listing)`.
    pub fn into_parts(self) -> (Vec<Install>, u64, bool) {
        match self {
            Self::Enveloped { results, count } => (results, count, false),
            Self::Bare(installs) => {
                let total = u64::try_from(installs.len()).unwrap_or(u64::MAX);
                (installs, total, true)
            }
        }
    }
}

/// A backup known to the remote API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteBackup {
    /// Remote backup identifier.
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Remote status such as `requested` or `completed`.
    #[serde(default)]
    pub status: Option<String>,
    /// Free-text description given at creation.
    #[serde(default)]
    pub description: Option<String>,
    /// Creation timestamp as reported by the API.
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Backup listing, enveloped or bare.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BackupList {
    /// `{ "results": [...] }`.
    Enveloped {
        /// Backups.
        results: Vec<RemoteBackup>,
    },
    /// `[...]`.
    Bare(Vec<RemoteBackup>),
}

impl BackupList {
    /// Flatten into a vector.
    pub fn into_vec(self) -> Vec<RemoteBackup> {
        match self {
            Self::Enveloped { results } | Self::Bare(results) => results,
        }
    }
}

/// Body of `POST /installs/{id}/backups`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateBackupRequest {
    /// Addresses notified when the backup completes. Required by the API.
    pub notification_emails: Vec<String>,
    /// Optional description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl CreateBackupRequest {
    /// Request notifying a single address; blank descriptions are omitted.
    pub fn new(notification_email: &str, description: Option<&str>) -> Self {
        Self {
            notification_emails: vec![notification_email.to_owned()],
            description: description
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_owned),
        }
    }
}

/// Remote id and status from a successful creation response, when present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupAck {
    /// Remote backup id (`id` or `backup_id`).
    pub backup_id: Option<String>,
    /// Remote status.
    pub status: Option<String>,
}

/// Best-effort parse of a creation response body.
pub fn parse_backup_ack(body: &str) -> BackupAck {
    let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) else {
        return BackupAck::default();
    };
    BackupAck {
        backup_id: map
            .get("id")
            .or_else(|| map.get("backup_id"))
            .and_then(scalar_to_string),
        status: map.get("status").and_then(scalar_to_string),
    }
}

/// Extract a human-readable error from an error response body.
///
/// Checks `message`, then `error`, then `detail`, then `errors[].message`
/// joined by `", "`. Anything else falls back to the raw body.
pub fn extract_error_message(body: &str) -> String {
    let raw = body.trim();
    let Ok(Value::Object(map)) = serde_json::from_str::<Value>(raw) else {
        return fallback_body(raw);
    };

    for key in ["message", "error", "detail"] {
        if let Some(text) = map.get(key).and_then(scalar_to_string) {
            return text;
        }
    }

    if let Some(Value::Array(errors)) = map.get("errors") {
        let joined = errors
            .iter()
            .filter_map(|e| e.get("message").and_then(scalar_to_string))
            .collect::<Vec<_>>()
            .join(", ");
        if !joined.is_empty() {
            return joined;
        }
    }

    fallback_body(raw)
}

fn fallback_body(raw: &str) -> String {
    if raw.is_empty() {
        "empty response body".to_owned()
    } else {
        super::sanitize_body(raw)
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}
