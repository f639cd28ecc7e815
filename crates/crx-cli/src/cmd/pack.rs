//! Pack command

use anyhow::{Context, Result, bail};
use crx_core::pipeline::{PackageSource, Packager};
use crx_core::{AppId, InProcess, PackConfig};

use crate::PackArgs;
use crate::ui::Output;

/// Build a signed package from `args.source`.
pub async fn pack(args: &PackArgs, output: Output) -> Result<()> {
    let private_key = tokio::fs::read(&args.key)
        .await
        .with_context(|| format!("Failed to read key {}", args.key.display()))?;

    let config = configure(args, output)?;
    let has_codebase = config
        .codebase
        .as_deref()
        .is_some_and(|url| !url.trim().is_empty());
    if args.update_xml.is_some() && !has_codebase {
        bail!("--update-xml needs a codebase URL (--codebase or CRX_CODEBASE)");
    }
    let packager = if args.in_process {
        Packager::new(config).with_facility(InProcess)
    } else {
        Packager::new(config)
    };

    output.info(&format!("Packaging {}", args.source.display()));
    let assembled = packager
        .run(PackageSource::Directory(args.source.clone()), &private_key)
        .await
        .with_context(|| format!("Failed to package {}", args.source.display()))?;

    let target = match &args.output {
        Some(path) => path.clone(),
        None => {
            let source = args
                .source
                .canonicalize()
                .with_context(|| format!("Failed to resolve {}", args.source.display()))?;
            crate::default_output(&source)
        }
    };

    let written = match (assembled.write_to(&target).await, &args.update_xml) {
        (Ok(()), Some(path)) => assembled.write_update_xml(path).await,
        (result, _) => result,
    };

    let app_id = assembled.app_id().clone();
    let workspace = assembled.into_workspace();
    if args.keep_scratch {
        output.info(&format!("Scratch workspace kept at {}", workspace.path().display()));
    } else {
        workspace
            .cleanup()
            .await
            .context("Failed to remove scratch workspace")?;
    }
    written.with_context(|| format!("Failed to write {}", target.display()))?;

    output.success(&format!("Wrote {} (id {app_id})", target.display()));
    if let Some(path) = &args.update_xml {
        output.success(&format!("Wrote {}", path.display()));
    }
    Ok(())
}

fn configure(args: &PackArgs, output: Output) -> Result<PackConfig> {
    let mut config = PackConfig::from_env()?;

    if let Some(dir) = &args.scratch_dir {
        config = config.with_scratch_root(dir);
    }
    if let Some(url) = &args.codebase {
        config = config.with_codebase(url.clone());
    }
    if let Some(raw) = &args.app_id {
        let id = AppId::parse(raw).with_context(|| format!("Invalid --app-id {raw}"))?;
        config = config.with_app_id(id);
    }
    if let Some(program) = &args.openssl {
        config = config.with_openssl(program);
    }

    // A key stored inside the tree must stay out of the archive whatever it is called.
    if let (Ok(key), Ok(source)) = (args.key.canonicalize(), args.source.canonicalize()) {
        let name = key.file_name().and_then(|n| n.to_str());
        if let Some(name) = name.filter(|n| key.starts_with(&source) && *n != config.key_file_name) {
            output.warning(&format!(
                "Signing key {} is inside the source tree; excluding it",
                key.display()
            ));
            config = config.with_excluded(name);
        }
    }

    Ok(config)
}
