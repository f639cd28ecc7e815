//! Error type for every stage of the packaging pipeline.
//!
//! Each variant corresponds to the stage that produced it, so callers can tell
//! a missing source tree apart from a failed key derivation without parsing
//! messages. Nothing here is retried: a run either completes or returns the
//! first error it hit.

use crx_schema::FormatError;
use thiserror::Error;

/// Error raised by the packaging pipeline and its components.
#[derive(Debug, Error)]
pub enum CrxError {
    /// The source directory or its manifest could not be loaded.
    #[error("Failed to load source tree: {0}")]
    TreeLoad(String),

    /// A file became unreadable during archival or the zip writer failed.
    #[error("Failed to archive contents: {0}")]
    Archive(String),

    /// The key facility failed to start, exited non-zero or produced no output.
    #[error("Failed to derive public key: {0}")]
    KeyDerivation(String),

    /// The private key could not be used to sign or verify.
    #[error("Signing failed: {0}")]
    Signing(String),

    /// Assembly was attempted without a public key, signature or contents.
    #[error("Cannot assemble container: {0}")]
    AssemblyPrecondition(String),

    /// A required setting (such as the update codebase URL) is absent or invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A container could not be read back.
    #[error("Invalid container: {0}")]
    Format(#[from] FormatError),

    /// Writing an output file failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CrxError {
    /// Wrap a tree-loading failure with the path or step it concerns.
    pub fn tree_load(ctx: impl std::fmt::Display, err: impl std::fmt::Display) -> Self {
        Self::TreeLoad(format!("{ctx}: {err}"))
    }

    /// Wrap an archival failure with the path or step it concerns.
    pub fn archive(ctx: impl std::fmt::Display, err: impl std::fmt::Display) -> Self {
        Self::Archive(format!("{ctx}: {err}"))
    }
}

impl From<openssl::error::ErrorStack> for CrxError {
    fn from(err: openssl::error::ErrorStack) -> Self {
        Self::Signing(err.to_string())
    }
}

/// Convenience alias used throughout `crx-core`.
pub type Result<T> = std::result::Result<T, CrxError>;
