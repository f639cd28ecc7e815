//! Verify command

use std::path::Path;

use anyhow::{Context, Result, bail};
use crx_core::archive::list_entries;
use crx_core::keys;
use crx_core::{AppId, Container};

use crate::ui::Output;

/// Check that a package's signature matches its contents.
pub async fn verify(path: &Path, list: bool, output: Output) -> Result<()> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let container = Container::parse(&bytes)
        .with_context(|| format!("{} is not a CRX2 package", path.display()))?;

    let valid = keys::verify(
        container.public_key(),
        container.signature(),
        container.contents(),
    )?;
    if !valid {
        bail!("Signature of {} does not match its contents", path.display());
    }

    let id = AppId::from_public_key(container.public_key())?;
    output.success(&format!(
        "Signature valid ({} byte key, {} byte signature, {} byte archive)",
        container.public_key().len(),
        container.signature().len(),
        container.contents().len()
    ));
    println!("{id}");

    if list {
        for name in list_entries(container.contents())? {
            println!("  {name}");
        }
    }
    Ok(())
}
