//! crx - build and inspect signed CRX2 packages
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
//!
//! # Overview
//!
//! `crx pack` copies an extension directory into a scratch workspace, zips it,
//! signs the archive with an RSA key and writes a CRX2 container. The other
//! subcommands manage keys, check finished packages and clear scratch space.
//!
//! # Environment
//!
//! | Variable | Used by |
//! |---|---|
//! | `CRX_KEY` | `pack`, `id` |
//! | `CRX_CODEBASE` | `pack` |
//! | `CRX_APP_ID` | `pack` |
//! | `CRX_OPENSSL` | `pack` |
//! | `CRX_SCRATCH_DIR` | `pack`, `clean` |
//! | `CRX_KEY_FILE` | `pack` |
//! | `RUST_LOG` | log filter |

pub mod cmd;
pub mod ui;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "crx")]
#[command(author, version, about = "crx - build signed CRX2 packages")]
pub struct Cli {
    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Package a directory into a signed .crx file
    Pack(PackArgs),
    /// Generate a new RSA signing key
    Keygen {
        /// Where to write the PEM key
        #[arg(short, long, default_value = "key.pem")]
        output: PathBuf,
        /// Key size in bits
        #[arg(long, default_value_t = 2048)]
        bits: u32,
        /// Overwrite an existing key file
        #[arg(long, short = 'f')]
        force: bool,
    },
    /// Print the package ID a key produces
    Id {
        /// PEM or DER private key
        #[arg(short, long, env = "CRX_KEY")]
        key: PathBuf,
        /// Also print the base64 public key for the manifest `key` field
        #[arg(long)]
        manifest_key: bool,
    },
    /// Check the signature of a .crx file
    Verify {
        /// Path to the package
        crx: PathBuf,
        /// List archive entries
        #[arg(long, short = 'l')]
        list: bool,
    },
    /// Remove leftover scratch workspaces
    Clean {
        /// Scratch root to purge (defaults to $TMPDIR/crx)
        #[arg(long, env = "CRX_SCRATCH_DIR")]
        scratch_dir: Option<PathBuf>,
    },
}

#[derive(Debug, Args)]
pub struct PackArgs {
    /// Extension directory containing manifest.json
    pub source: PathBuf,
    /// PEM or DER private key used for signing
    #[arg(short, long, env = "CRX_KEY")]
    pub key: PathBuf,
    /// Output path (defaults to <SOURCE>.crx next to the source)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// URL the package will be served from, used in update.xml
    #[arg(long, env = "CRX_CODEBASE")]
    pub codebase: Option<String>,
    /// Also write an update descriptor to this path
    #[arg(long)]
    pub update_xml: Option<PathBuf>,
    /// Advertise this ID in update.xml instead of the derived one
    #[arg(long, env = "CRX_APP_ID")]
    pub app_id: Option<String>,
    /// Leave the scratch workspace in place after packaging
    #[arg(long)]
    pub keep_scratch: bool,
    /// Scratch root for the working copy
    #[arg(long, env = "CRX_SCRATCH_DIR")]
    pub scratch_dir: Option<PathBuf>,
    /// openssl executable used to derive the public key
    #[arg(long, env = "CRX_OPENSSL", conflicts_with = "in_process")]
    pub openssl: Option<PathBuf>,
    /// Derive the public key in-process instead of running openssl
    #[arg(long)]
    pub in_process: bool,
}

/// Default output path for a source directory: `<dir>.crx` beside it.
///
/// ```
/// use std::path::Path;
/// use crx_cli::default_output;
///
/// assert_eq!(default_output(Path::new("/src/my-ext")), Path::new("/src/my-ext.crx"));
/// assert_eq!(default_output(Path::new("/src/my.ext")), Path::new("/src/my.ext.crx"));
/// ```
pub fn default_output(source: &std::path::Path) -> PathBuf {
    let mut name = source.file_name().unwrap_or_default().to_os_string();
    name.push(".crx");
    source.with_file_name(name)
}
