//! Keygen command

use std::path::Path;

use anyhow::{Context, Result, bail};
use crx_core::keys::{self, KeyFacility};
use crx_core::{AppId, InProcess};

use crate::ui::Output;

/// Write a new PKCS#1 PEM RSA key to `path`.
pub async fn keygen(path: &Path, bits: u32, force: bool, output: Output) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }

    output.info(&format!("Generating {bits}-bit RSA key..."));
    let pem = tokio::task::spawn_blocking(move || keys::generate_private_key(bits))
        .await
        .context("Key generation task failed")??;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, &pem)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    restrict_permissions(path).await?;

    let public_key = InProcess.derive_public_key(&pem).await?;
    let id = AppId::from_public_key(public_key.as_bytes())?;
    output.success(&format!("Wrote {} (id {id})", path.display()));
    Ok(())
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    Ok(())
}

#[cfg(not(unix))]
#[allow(clippy::unused_async)]
async fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}
