//! Manifest descriptor (`manifest.json`) handling.
//!
//! The manifest is treated as an opaque JSON object: only `version` is
//! required, because the update descriptor advertises it. Every other key is
//! carried through untouched. Validating the rest of the document is the
//! host's job.

use std::path::Path;

use serde_json::{Map, Value};
use tokio::fs;

use crate::config::MANIFEST_FILE;
use crate::error::{CrxError, Result};

/// A parsed manifest descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    version: String,
    fields: Map<String, Value>,
}

impl Manifest {
    /// Parse a manifest from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`CrxError::TreeLoad`] if the text is not a JSON object or has
    /// no string `version`.
    pub fn parse(content: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(content)
            .map_err(|e| CrxError::tree_load("Failed to parse manifest.json", e))?;

        let Value::Object(fields) = value else {
            return Err(CrxError::TreeLoad(
                "manifest.json must contain a JSON object".to_string(),
            ));
        };

        let version = fields
            .get("version")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                CrxError::TreeLoad("manifest.json has no string \"version\" field".to_string())
            })?
            .to_string();

        Ok(Self { version, fields })
    }

    /// Asynchronously load `manifest.json` from a tree root.
    ///
    /// # Errors
    ///
    /// Returns [`CrxError::TreeLoad`] if the file is missing, unreadable or malformed.
    pub async fn load(root: &Path) -> Result<Self> {
        let path = root.join(MANIFEST_FILE);
        let content = fs::read_to_string(&path)
            .await
            .map_err(|e| CrxError::tree_load(path.display(), e))?;

        Self::parse(&content)
    }

    /// The manifest's `version` field.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// The manifest's `name` field, if present and a string.
    pub fn name(&self) -> Option<&str> {
        self.fields.get("name").and_then(Value::as_str)
    }

    /// Look up an arbitrary top-level field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Compact JSON encoding with top-level keys in sorted order.
    ///
    /// # Errors
    ///
    /// Returns [`CrxError::Archive`] if serialization fails.
    pub fn to_canonical_bytes(&self) -> Result<Vec<u8>> {
        let sorted: std::collections::BTreeMap<&String, &Value> = self.fields.iter().collect();
        serde_json::to_vec(&sorted).map_err(|e| CrxError::archive("Failed to encode manifest", e))
    }

    /// Write the canonical encoding to `manifest.json` under `root`.
    ///
    /// # Errors
    ///
    /// Returns [`CrxError::Archive`] if the file cannot be written.
    pub async fn write_into(&self, root: &Path) -> Result<()> {
        let path = root.join(MANIFEST_FILE);
        let bytes = self.to_canonical_bytes()?;
        fs::write(&path, bytes)
            .await
            .map_err(|e| CrxError::archive(path.display(), e))
    }
}
