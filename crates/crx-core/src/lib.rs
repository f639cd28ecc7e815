//! Core library for crx: builds signed CRX2 packages from a directory.
//!
//! The pipeline copies a source tree into a scratch workspace, archives it,
//! signs the archive and lays out the container. The wire format itself lives
//! in `crx-schema`.

pub mod archive;
pub mod config;
pub mod error;
pub mod keys;
pub mod manifest;
pub mod pipeline;
pub mod update;
pub mod workspace;

pub use archive::{Archiver, ContentsBlob};
pub use config::PackConfig;
pub use error::{CrxError, Result};
pub use keys::{InProcess, KeyFacility, OpensslCli, PublicKey, Signature};
pub use manifest::Manifest;
pub use pipeline::{Assembled, PackageSource, Packager, Unloaded};
pub use workspace::Workspace;

pub use crx_schema::{AppId, Container};
