//! Packaging Pipeline Typestate Pattern
//!
//! Models a packaging run as a series of explicit state transitions:
//!
//! ```text
//! Unloaded --[load()]--> Loaded --[archive()]--> Archived --[sign()]--> Signed --[assemble()]--> Assembled
//! ```
//!
//! Each stage consumes the previous one and carries its output forward, so it
//! is impossible to sign before archiving or to assemble without a signature.
//! A failed transition returns the error and drops the run; there is no way to
//! resume from a partial state. Start again from [`Unloaded`].
//!
//! # Usage
//!
//! ```ignore
//! use crx_core::pipeline::{PackageSource, Unloaded};
//!
//! let assembled = Unloaded::new(PackageSource::Directory(src), config)
//!     .load().await?
//!     .archive().await?
//!     .sign(&OpensslCli::default(), &private_key).await?
//!     .assemble()?;
//! assembled.write_to(&out).await?;
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crx_schema::{AppId, Container, CrxHeader, HEADER_LEN};
use tokio::fs;

use crate::archive::{ContentsBlob, archive_tree};
use crate::config::PackConfig;
use crate::error::{CrxError, Result};
use crate::keys::{self, KeyFacility, OpensslCli, PublicKey, Signature};
use crate::manifest::Manifest;
use crate::update::UpdateDescriptor;
use crate::workspace::Workspace;

/// Where a run gets its file tree from.
#[derive(Debug)]
pub enum PackageSource {
    /// Copy this directory into a fresh scratch workspace.
    Directory(PathBuf),
    /// Reuse a workspace that is already prepared; no copy is made.
    Prepared(Workspace),
}

/// Pipeline stage names, used in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Nothing read yet.
    Unloaded,
    /// Tree copied and manifest read.
    Loaded,
    /// Contents archived.
    Archived,
    /// Public key derived and contents signed.
    Signed,
    /// Container assembled.
    Assembled,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unloaded => "unloaded",
            Self::Loaded => "loaded",
            Self::Archived => "archived",
            Self::Signed => "signed",
            Self::Assembled => "assembled",
        };
        f.write_str(name)
    }
}

/// State 1: a run that has not read anything yet.
///
/// # Transitions
///
/// - [`load()`](Self::load) -> [`Loaded`]
#[derive(Debug)]
pub struct Unloaded {
    source: PackageSource,
    config: PackConfig,
}

/// State 2: the tree sits in a workspace and its manifest has been parsed.
///
/// # Transitions
///
/// - [`archive()`](Self::archive) -> [`Archived`]
#[derive(Debug)]
pub struct Loaded {
    config: PackConfig,
    workspace: Workspace,
    manifest: Manifest,
}

/// State 3: the tree has been archived into a contents blob.
///
/// # Transitions
///
/// - [`sign()`](Self::sign) -> [`Signed`]
#[derive(Debug)]
pub struct Archived {
    config: PackConfig,
    workspace: Workspace,
    manifest: Manifest,
    contents: ContentsBlob,
}

/// State 4: public key and signature are known.
///
/// # Transitions
///
/// - [`assemble()`](Self::assemble) -> [`Assembled`]
#[derive(Debug)]
pub struct Signed {
    config: PackConfig,
    workspace: Workspace,
    manifest: Manifest,
    contents: ContentsBlob,
    public_key: PublicKey,
    signature: Signature,
}

/// Terminal state: the finished container and everything derived along the way.
#[derive(Debug)]
pub struct Assembled {
    config: PackConfig,
    workspace: Workspace,
    manifest: Manifest,
    app_id: AppId,
    header: CrxHeader,
    container: Vec<u8>,
}

impl Unloaded {
    /// Start a run over `source`.
    pub fn new(source: PackageSource, config: PackConfig) -> Self {
        Self { source, config }
    }

    /// Obtain the tree and its manifest.
    ///
    /// A [`PackageSource::Prepared`] workspace is used as-is, so loading an
    /// already loaded tree only re-reads the manifest.
    ///
    /// # Errors
    ///
    /// Returns [`CrxError::TreeLoad`] if the source is missing or unreadable or
    /// the manifest is absent or malformed.
    pub async fn load(self) -> Result<Loaded> {
        let workspace = match self.source {
            PackageSource::Directory(path) => {
                Workspace::prepare(&path, &self.config.scratch_root).await?
            }
            PackageSource::Prepared(workspace) => {
                tracing::debug!(
                    "Workspace {} already prepared; skipping copy",
                    workspace.path().display()
                );
                workspace
            }
        };

        let manifest = Manifest::load(workspace.path()).await?;
        tracing::info!(
            stage = %Stage::Loaded,
            version = manifest.version(),
            "Loaded {}",
            workspace.path().display()
        );

        Ok(Loaded {
            config: self.config,
            workspace,
            manifest,
        })
    }
}

impl Loaded {
    /// The scratch workspace holding the tree.
    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// The parsed manifest.
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Write the canonical manifest into the tree, then archive it.
    ///
    /// # Errors
    ///
    /// Returns [`CrxError::Archive`] if the manifest cannot be written or any
    /// file cannot be archived.
    pub async fn archive(self) -> Result<Archived> {
        self.manifest.write_into(self.workspace.path()).await?;
        let contents = archive_tree(self.workspace.path(), self.config.excluded_names()).await?;
        tracing::info!(
            stage = %Stage::Archived,
            bytes = contents.len(),
            "Archived contents"
        );

        Ok(Archived {
            config: self.config,
            workspace: self.workspace,
            manifest: self.manifest,
            contents,
        })
    }
}

impl Archived {
    /// The archived contents.
    pub fn contents(&self) -> &ContentsBlob {
        &self.contents
    }

    /// Derive the public key through `facility`, then sign the contents.
    ///
    /// # Errors
    ///
    /// Returns [`CrxError::KeyDerivation`] if the facility fails and
    /// [`CrxError::Signing`] if the key cannot sign.
    pub async fn sign(self, facility: &dyn KeyFacility, private_key: &[u8]) -> Result<Signed> {
        let public_key = facility.derive_public_key(private_key).await?;
        let signature = keys::sign(self.contents.as_bytes(), private_key)?;
        tracing::info!(
            stage = %Stage::Signed,
            key_len = public_key.as_bytes().len(),
            sig_len = signature.as_bytes().len(),
            "Signed contents"
        );

        Ok(Signed {
            config: self.config,
            workspace: self.workspace,
            manifest: self.manifest,
            contents: self.contents,
            public_key,
            signature,
        })
    }
}

impl Signed {
    /// The derived public key.
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// The contents signature.
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// The signed contents.
    pub fn contents(&self) -> &ContentsBlob {
        &self.contents
    }

    /// Lay out the container.
    ///
    /// # Errors
    ///
    /// Returns [`CrxError::AssemblyPrecondition`] if any segment is empty or
    /// too large for the header.
    pub fn assemble(self) -> Result<Assembled> {
        let precondition = |e: crx_schema::FormatError| CrxError::AssemblyPrecondition(e.to_string());

        let container = Container::new(
            self.public_key.as_bytes(),
            self.signature.as_bytes(),
            self.contents.as_bytes(),
        )
        .map_err(precondition)?;
        let app_id = AppId::from_public_key(self.public_key.as_bytes()).map_err(precondition)?;
        let header = container.header();
        let bytes = container.to_vec();

        tracing::info!(
            stage = %Stage::Assembled,
            app_id = %app_id,
            bytes = bytes.len(),
            "Assembled container"
        );

        Ok(Assembled {
            config: self.config,
            workspace: self.workspace,
            manifest: self.manifest,
            app_id,
            header,
            container: bytes,
        })
    }
}

impl Assembled {
    /// The serialized container.
    pub fn container(&self) -> &[u8] {
        &self.container
    }

    /// Consume the run and keep only the container bytes.
    pub fn into_container(self) -> Vec<u8> {
        self.container
    }

    /// Identity derived from the public key.
    pub fn app_id(&self) -> &AppId {
        &self.app_id
    }

    /// Public key segment.
    pub fn public_key(&self) -> &[u8] {
        &self.container[HEADER_LEN..HEADER_LEN + self.header.key_len as usize]
    }

    /// Signature segment.
    pub fn signature(&self) -> &[u8] {
        let start = HEADER_LEN + self.header.key_len as usize;
        &self.container[start..self.header.contents_offset()]
    }

    /// Contents segment.
    pub fn contents(&self) -> &[u8] {
        &self.container[self.header.contents_offset()..]
    }

    /// The manifest that was packaged.
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// The scratch workspace used by this run.
    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Give up the run, keeping the workspace for explicit cleanup.
    pub fn into_workspace(self) -> Workspace {
        self.workspace
    }

    /// Write the container to `path`, replacing it atomically.
    ///
    /// # Errors
    ///
    /// Returns [`CrxError::Io`] if the file cannot be written or renamed.
    pub async fn write_to(&self, path: &Path) -> Result<()> {
        write_atomic(path, &self.container).await?;
        tracing::info!("Wrote {} ({} bytes)", path.display(), self.container.len());
        Ok(())
    }

    /// Render the update descriptor for this package.
    ///
    /// Uses the configured app id override when present, the derived one otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`CrxError::Configuration`] if no codebase URL is configured.
    pub fn update_xml(&self) -> Result<String> {
        let app_id = self.config.app_id.as_ref().unwrap_or(&self.app_id);
        let descriptor = UpdateDescriptor::new(
            app_id,
            self.config.codebase.as_deref(),
            self.manifest.version(),
        )?;
        Ok(descriptor.render())
    }

    /// Render the update descriptor and write it to `path`.
    ///
    /// # Errors
    ///
    /// See [`Assembled::update_xml`]; also fails with [`CrxError::Io`] on write errors.
    pub async fn write_update_xml(&self, path: &Path) -> Result<()> {
        let xml = self.update_xml()?;
        write_atomic(path, xml.as_bytes()).await?;
        tracing::info!("Wrote update descriptor {}", path.display());
        Ok(())
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }
    let tmp = temp_path(path);

    let written = match fs::write(&tmp, bytes).await {
        Ok(()) => fs::rename(&tmp, path).await,
        Err(e) => Err(e),
    };
    if written.is_err() {
        let _ = fs::remove_file(&tmp).await;
    }
    written.map_err(CrxError::from)
}

// Per-call suffix so concurrent writers to one target never share a temp file.
fn temp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(format!(".{:08x}.tmp", rand::random::<u32>()));
    PathBuf::from(tmp)
}

/// Runs every stage in order with a fixed configuration and key facility.
#[derive(Clone)]
pub struct Packager {
    config: PackConfig,
    facility: Arc<dyn KeyFacility>,
}

impl fmt::Debug for Packager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Packager {
    /// Create a packager that derives public keys with the configured `openssl`.
    pub fn new(config: PackConfig) -> Self {
        let facility = Arc::new(OpensslCli::new(config.openssl.clone()));
        Self { config, facility }
    }

    /// Replace the key facility.
    pub fn with_facility(mut self, facility: impl KeyFacility + 'static) -> Self {
        self.facility = Arc::new(facility);
        self
    }

    /// The configuration every run uses.
    pub fn config(&self) -> &PackConfig {
        &self.config
    }

    /// Package `source` end to end.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by any stage, unchanged.
    pub async fn run(&self, source: PackageSource, private_key: &[u8]) -> Result<Assembled> {
        Unloaded::new(source, self.config.clone())
            .load()
            .await?
            .archive()
            .await?
            .sign(self.facility.as_ref(), private_key)
            .await?
            .assemble()
    }
}
