//! Packaging configuration.
//!
//! Settings come from code (builder-style setters) or from the environment:
//!
//! | Variable | Field |
//! |---|---|
//! | `CRX_SCRATCH_DIR` | [`PackConfig::scratch_root`] |
//! | `CRX_KEY_FILE` | [`PackConfig::key_file_name`] |
//! | `CRX_CODEBASE` | [`PackConfig::codebase`] |
//! | `CRX_APP_ID` | [`PackConfig::app_id`] |
//! | `CRX_OPENSSL` | [`PackConfig::openssl`] |

use std::path::PathBuf;

use crx_schema::AppId;

use crate::error::{CrxError, Result};

/// Name of the manifest descriptor inside the packaged tree.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Conventional name of the private key file that must never be packaged.
pub const DEFAULT_KEY_FILE: &str = "key.pem";

/// Settings shared by every stage of a packaging run.
#[derive(Debug, Clone)]
pub struct PackConfig {
    /// Directory under which per-run scratch workspaces are created.
    pub scratch_root: PathBuf,
    /// File name excluded from the archive wherever it appears in the tree.
    /// `key.pem` is excluded regardless.
    pub key_file_name: String,
    /// Further file names to keep out of the archive.
    pub extra_excludes: Vec<String>,
    /// URL the update descriptor points hosts at.
    pub codebase: Option<String>,
    /// Identity to advertise instead of the one derived from the key.
    pub app_id: Option<AppId>,
    /// `openssl` executable used for out-of-process key derivation.
    pub openssl: PathBuf,
}

impl Default for PackConfig {
    fn default() -> Self {
        Self {
            scratch_root: default_scratch_root(),
            key_file_name: DEFAULT_KEY_FILE.to_string(),
            extra_excludes: Vec::new(),
            codebase: None,
            app_id: None,
            openssl: PathBuf::from("openssl"),
        }
    }
}

impl PackConfig {
    /// Load configuration from environment variables, falling back to defaults.
    ///
    /// # Errors
    ///
    /// Returns [`CrxError::Configuration`] if `CRX_APP_ID` is set but invalid.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup. Empty values count as unset.
    ///
    /// # Errors
    ///
    /// Returns [`CrxError::Configuration`] if `CRX_APP_ID` is present but invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let app_id = get("CRX_APP_ID")
            .map(|id| AppId::parse(id.trim()))
            .transpose()
            .map_err(|e| CrxError::Configuration(format!("CRX_APP_ID: {e}")))?;

        Ok(Self {
            scratch_root: get("CRX_SCRATCH_DIR").map_or(defaults.scratch_root, PathBuf::from),
            key_file_name: get("CRX_KEY_FILE").unwrap_or(defaults.key_file_name),
            extra_excludes: defaults.extra_excludes,
            codebase: get("CRX_CODEBASE"),
            app_id,
            openssl: get("CRX_OPENSSL").map_or(defaults.openssl, PathBuf::from),
        })
    }

    /// Set the scratch root.
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = root.into();
        self
    }

    /// Set the excluded key file name.
    pub fn with_key_file_name(mut self, name: impl Into<String>) -> Self {
        self.key_file_name = name.into();
        self
    }

    /// Keep another file name out of the archive, in addition to the key file.
    pub fn with_excluded(mut self, name: impl Into<String>) -> Self {
        self.extra_excludes.push(name.into());
        self
    }

    /// Every file name the archive must skip.
    pub fn excluded_names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.key_file_name.as_str())
            .chain(self.extra_excludes.iter().map(String::as_str))
    }

    /// Set the update codebase URL.
    pub fn with_codebase(mut self, url: impl Into<String>) -> Self {
        self.codebase = Some(url.into());
        self
    }

    /// Override the advertised identity.
    pub fn with_app_id(mut self, id: AppId) -> Self {
        self.app_id = Some(id);
        self
    }

    /// Set the `openssl` executable.
    pub fn with_openssl(mut self, program: impl Into<PathBuf>) -> Self {
        self.openssl = program.into();
        self
    }
}

/// Default scratch root: `$TMPDIR/crx`.
pub fn default_scratch_root() -> PathBuf {
    std::env::temp_dir().join("crx")
}
