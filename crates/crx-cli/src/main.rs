//! crx - signed CRX2 package builder

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crx_cli::ui::Output;
use crx_cli::{Cli, Commands, cmd};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output = Output::quiet(cli.quiet);

    let result = match cli.command {
        Commands::Pack(args) => cmd::pack::pack(&args, output).await,
        Commands::Keygen {
            output: path,
            bits,
            force,
        } => cmd::keygen::keygen(&path, bits, force, output).await,
        Commands::Id { key, manifest_key } => cmd::id::id(&key, manifest_key).await,
        Commands::Verify { crx, list } => cmd::verify::verify(&crx, list, output).await,
        Commands::Clean { scratch_dir } => cmd::clean::clean(scratch_dir, output).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output.error(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}
