//! Clean command

use std::path::PathBuf;

use anyhow::{Context, Result};
use crx_core::PackConfig;
use crx_core::workspace::purge_scratch;

use crate::ui::Output;

/// Remove every scratch workspace under the scratch root.
pub async fn clean(scratch_dir: Option<PathBuf>, output: Output) -> Result<()> {
    let root = match scratch_dir {
        Some(dir) => dir,
        None => PackConfig::from_env()?.scratch_root,
    };

    let removed = purge_scratch(&root)
        .await
        .with_context(|| format!("Failed to clean {}", root.display()))?;

    if removed == 0 {
        output.success("Nothing to clean.");
    } else {
        output.success(&format!(
            "Removed {removed} scratch workspace(s) from {}",
            root.display()
        ));
    }
    Ok(())
}
