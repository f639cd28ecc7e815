//! Id command

use std::path::Path;

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use crx_core::keys::KeyFacility;
use crx_core::{AppId, InProcess};

/// Print the package ID for a private key, and optionally its manifest `key` value.
pub async fn id(key: &Path, manifest_key: bool) -> Result<()> {
    let private_key = tokio::fs::read(key)
        .await
        .with_context(|| format!("Failed to read key {}", key.display()))?;

    let public_key = InProcess.derive_public_key(&private_key).await?;
    let id = AppId::from_public_key(public_key.as_bytes())?;

    println!("{id}");
    if manifest_key {
        println!("{}", STANDARD.encode(public_key.as_bytes()));
    }
    Ok(())
}
