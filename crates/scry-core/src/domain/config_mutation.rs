//! The configuration artifact written by the model selector.
//!
//! The file is owned by an external writer; this side only reads it and
//! keeps the last-applied model in memory.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Raw artifact shape. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigArtifact {
    #[serde(default)]
    model_name: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    operation_id: Option<serde_json::Value>,
}

/// Why an artifact read produced nothing actionable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutationError {
    #[error("configuration artifact is empty")]
    Empty,

    #[error("configuration artifact is not valid JSON: {0}")]
    Malformed(String),

    #[error("configuration artifact has no model_name")]
    MissingModel,
}

/// A requested model change, as read from the artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMutation {
    pub model_name: String,
    pub status: Option<String>,
    /// Opaque correlation token for the operations ledger.
    pub operation_id: Option<String>,
    /// Digest of `model_name` + `status`.
    pub content_hash: String,
}

impl ConfigMutation {
    /// Parse artifact contents.
    pub fn parse(contents: &str) -> Result<Self, MutationError> {
        if contents.trim().is_empty() {
            return Err(MutationError::Empty);
        }

        let artifact: ConfigArtifact =
            serde_json::from_str(contents).map_err(|e| MutationError::Malformed(e.to_string()))?;

        let model_name = artifact
            .model_name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .ok_or(MutationError::MissingModel)?;

        let content_hash = content_hash(&model_name, artifact.status.as_deref());

        Ok(Self {
            model_name,
            status: artifact.status,
            operation_id: artifact.operation_id.and_then(operation_id_string),
            content_hash,
        })
    }

    /// Whether applying this mutation would change the loaded model.
    #[must_use]
    pub fn differs_from(&self, last_applied: Option<&str>) -> bool {
        last_applied != Some(self.model_name.as_str())
    }
}

/// Read only the operation id, tolerating an artifact that no longer has a
/// usable model name.
#[must_use]
pub fn read_operation_id(contents: &str) -> Option<String> {
    serde_json::from_str::<ConfigArtifact>(contents)
        .ok()
        .and_then(|a| a.operation_id)
        .and_then(operation_id_string)
}

/// Hex SHA-256 over the JSON encoding of `{model_name, status}`.
#[must_use]
pub fn content_hash(model_name: &str, status: Option<&str>) -> String {
    let canonical = serde_json::json!({
        "model_name": model_name,
        "status": status,
    });
    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

fn operation_id_string(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
