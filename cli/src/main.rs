//! `mds-sync` entry point.
//!
//! Synchronizes a per-AAGUID metadata tree against the FIDO MDS blob, the
//! community combined-AAGUID map, and the c-MDS feed. Re-runs against
//! identical sources write nothing.

use std::path::PathBuf;

use clap::Parser;
use mds_sync_cli::{Endpoints, RunOptions, run};
use mds_sync_core::RetryPolicy;

#[derive(Debug, Parser)]
#[command(name = "mds-sync", about = "Update FIDO MDS metadata files", version)]
struct Cli {
    /// Show planned changes without writing files.
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Directory to write output files into.
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Path to a local JWT file to parse instead of downloading the MDS
    /// blob. The secondary sources are still fetched live.
    #[arg(short, long)]
    sample_jwt: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let options = RunOptions {
        dry_run: cli.dry_run,
        output_dir: cli.output_dir,
        sample_jwt: cli.sample_jwt,
        retry: RetryPolicy::default(),
    };

    if let Err(err) = run(&options, &Endpoints::default()).await {
        tracing::error!("sync failed: {err:#}");
        return Err(err);
    }
    Ok(())
}
