//! Wire format and identity types for CRX packages.
//!
//! This crate performs no I/O: it lays out and slices container bytes and
//! derives package identities from public keys. Building the segments
//! (archiving, signing) lives in `crx-core`.

pub mod format;
pub mod identity;

// Re-exports
pub use format::{Container, CrxHeader, FORMAT_VERSION, FormatError, HEADER_LEN, MAGIC, assemble};
pub use identity::{APP_ID_LEN, AppId};
