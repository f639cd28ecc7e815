//! Deterministic zip archival of a file tree.
//!
//! Files are visited in lexicographic order at every directory level, and
//! every entry gets the same timestamp and permissions, so an unchanged tree
//! always produces byte-identical contents (and therefore a reproducible
//! signature).
//!
//! Excluded names match at any depth, not only at the root: a `key.pem` in a
//! subdirectory is private key material just the same. `key.pem` is always
//! excluded; [`Archiver::exclude`] adds names on top of it.
//!
//! The zip writer streams each file straight into a single owned buffer; the
//! blob is only handed out once the central directory has been written.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use crate::config::DEFAULT_KEY_FILE;
use crate::error::{CrxError, Result};

/// Finished zip archive of a packaged tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentsBlob(Vec<u8>);

impl ContentsBlob {
    /// Wrap already archived bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// The archive bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Archive size in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the archive is empty (never true for a finished archive).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consume the blob and return the bytes.
    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }
}

impl AsRef<[u8]> for ContentsBlob {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A file selected for archival.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// `/`-separated path relative to the tree root; used as the entry name.
    pub name: String,
    /// Absolute location on disk.
    pub path: PathBuf,
}

/// Builds a [`ContentsBlob`] from a directory.
#[derive(Debug, Clone)]
pub struct Archiver {
    root: PathBuf,
    exclude: BTreeSet<String>,
}

impl Archiver {
    /// Archive the tree rooted at `root`, excluding `key.pem`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            exclude: BTreeSet::from([DEFAULT_KEY_FILE.to_string()]),
        }
    }

    /// Also exclude files with this name. Earlier exclusions stay in force.
    pub fn exclude(mut self, file_name: impl Into<String>) -> Self {
        self.exclude.insert(file_name.into());
        self
    }

    /// Enumerate the regular files that will be archived, in archive order.
    ///
    /// # Errors
    ///
    /// Returns [`CrxError::Archive`] if the tree cannot be walked.
    pub fn collect(&self) -> Result<Vec<ArchiveEntry>> {
        let mut entries = Vec::new();

        for entry in WalkDir::new(&self.root)
            .follow_links(true)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| CrxError::archive(self.root.display(), e))?;
            if !entry.file_type().is_file() {
                continue;
            }
            if entry
                .file_name()
                .to_str()
                .is_some_and(|name| self.exclude.contains(name))
            {
                tracing::debug!("Excluding {} from archive", entry.path().display());
                continue;
            }

            let rel_path = entry.path().strip_prefix(&self.root).map_err(|_| {
                CrxError::Archive(format!(
                    "{} is outside {}",
                    entry.path().display(),
                    self.root.display()
                ))
            })?;

            entries.push(ArchiveEntry {
                name: entry_name(rel_path)?,
                path: entry.path().to_path_buf(),
            });
        }

        Ok(entries)
    }

    /// Archive the tree synchronously.
    ///
    /// # Errors
    ///
    /// Returns [`CrxError::Archive`] if any file cannot be read or the zip
    /// writer fails. No partial blob is returned.
    pub fn build(&self) -> Result<ContentsBlob> {
        let entries = self.collect()?;
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(DateTime::default())
            .unix_permissions(0o644);

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for entry in &entries {
            zip.start_file(entry.name.as_str(), options)
                .map_err(|e| CrxError::archive(&entry.name, e))?;

            let mut file =
                File::open(&entry.path).map_err(|e| CrxError::archive(entry.path.display(), e))?;
            io::copy(&mut file, &mut zip)
                .map_err(|e| CrxError::archive(entry.path.display(), e))?;
        }

        let buffer = zip
            .finish()
            .map_err(|e| CrxError::archive("Failed to finalize archive", e))?
            .into_inner();

        tracing::debug!(
            "Archived {} files from {} ({} bytes)",
            entries.len(),
            self.root.display(),
            buffer.len()
        );
        Ok(ContentsBlob(buffer))
    }
}

/// Archive `root` on the blocking pool, skipping `key.pem` and every name in `exclude`.
///
/// # Errors
///
/// See [`Archiver::build`].
pub async fn archive_tree<I, S>(root: &Path, exclude: I) -> Result<ContentsBlob>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let archiver = exclude
        .into_iter()
        .fold(Archiver::new(root), |archiver, name| archiver.exclude(name));
    tokio::task::spawn_blocking(move || archiver.build())
        .await
        .map_err(|e| CrxError::archive("Archive task failed", e))?
}

/// List entry names of an archive in the order they were written.
///
/// # Errors
///
/// Returns [`CrxError::Archive`] if the bytes are not a readable zip archive.
pub fn list_entries(contents: &[u8]) -> Result<Vec<String>> {
    let mut archive = ZipArchive::new(Cursor::new(contents))
        .map_err(|e| CrxError::archive("Failed to open archive", e))?;

    (0..archive.len())
        .map(|i| {
            archive
                .by_index(i)
                .map(|file| file.name().to_string())
                .map_err(|e| CrxError::archive("Failed to read archive entry", e))
        })
        .collect()
}

fn entry_name(rel_path: &Path) -> Result<String> {
    let parts = rel_path
        .components()
        .map(|c| {
            c.as_os_str().to_str().ok_or_else(|| {
                CrxError::Archive(format!("Non UTF-8 path: {}", rel_path.display()))
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(parts.join("/"))
}
