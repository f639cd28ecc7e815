//! Per-run scratch workspaces.
//!
//! The pipeline writes the canonical manifest into the tree it packages, so it
//! never touches the caller's source directory. Each run copies the source into
//! `<scratch_root>/crx-<random>`, which keeps concurrent runs in one process
//! apart without any locking.
//!
//! Workspaces are not removed on drop. Call [`Workspace::cleanup`] (or
//! [`purge_scratch`] for everything under a root) when the run is finished.

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::error::{CrxError, Result};

/// Prefix shared by every scratch directory this crate creates.
pub const SCRATCH_PREFIX: &str = "crx-";

/// A scratch copy of a source tree owned by a single packaging run.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Copy `source` into a freshly named directory under `scratch_root`.
    ///
    /// # Errors
    ///
    /// Returns [`CrxError::TreeLoad`] if the source is missing or not a
    /// directory, or if the copy fails.
    pub async fn prepare(source: &Path, scratch_root: &Path) -> Result<Self> {
        let metadata = fs::metadata(source)
            .await
            .map_err(|e| CrxError::tree_load(source.display(), e))?;
        if !metadata.is_dir() {
            return Err(CrxError::TreeLoad(format!(
                "{} is not a directory",
                source.display()
            )));
        }

        let root = scratch_root.join(format!("{SCRATCH_PREFIX}{:016x}", rand::random::<u64>()));
        fs::create_dir_all(&root)
            .await
            .map_err(|e| CrxError::tree_load(root.display(), e))?;

        let (src, dest) = (source.to_path_buf(), root.clone());
        tokio::task::spawn_blocking(move || copy_tree(&src, &dest))
            .await
            .map_err(|e| CrxError::tree_load("Copy task failed", e))??;

        tracing::debug!(
            "Copied {} into scratch workspace {}",
            source.display(),
            root.display()
        );
        Ok(Self { root })
    }

    /// Use an already prepared directory as the workspace without copying.
    pub fn adopt(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root of the workspace tree.
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Recursively remove the workspace.
    ///
    /// # Errors
    ///
    /// Returns [`CrxError::Io`] if removal fails.
    pub async fn cleanup(self) -> Result<()> {
        tracing::debug!("Removing scratch workspace {}", self.root.display());
        fs::remove_dir_all(&self.root).await?;
        Ok(())
    }
}

fn copy_tree(source: &Path, dest: &Path) -> Result<()> {
    let options = fs_extra::dir::CopyOptions::new().content_only(true);
    fs_extra::dir::copy(source, dest, &options)
        .map_err(|e| CrxError::tree_load(format!("Failed to copy {}", source.display()), e))?;
    Ok(())
}

/// Remove every scratch workspace under `scratch_root`.
///
/// Returns the number of directories removed. A missing root counts as clean.
///
/// # Errors
///
/// Returns [`CrxError::Io`] if the root cannot be listed or a workspace cannot
/// be removed.
pub async fn purge_scratch(scratch_root: &Path) -> Result<usize> {
    let mut entries = match fs::read_dir(scratch_root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await? {
        let is_scratch = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with(SCRATCH_PREFIX));
        if is_scratch && entry.file_type().await?.is_dir() {
            fs::remove_dir_all(entry.path()).await?;
            removed += 1;
        }
    }
    Ok(removed)
}
