//! Run orchestration for the `mds-sync` binary.
//!
//! The run is fully sequential: fetch (or read) the MDS blob, decode the
//! JWT, extract per-AAGUID items, fetch the two secondary sources (each
//! degradable to absent), merge under the precedence policy, then
//! materialize the tree plus the summary and index files.

use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use mds_sync_core::materialize::{MaterializeStats, SyncContext};
use mds_sync_core::merge::merge_sources;
use mds_sync_core::sources::ExternalMap;
use mds_sync_core::{Fetcher, RetryPolicy, decode_claims, extract_aaguids};

/// Primary MDS endpoint. Fetch failure here is fatal to the run.
pub const MDS_URL: &str = "https://mds3.fidoalliance.org/";

/// Community combined-AAGUID map (secondary, degradable).
pub const COMBINED_AAGUID_URL: &str = "https://raw.githubusercontent.com/passkeydeveloper/passkey-authenticator-aaguids/refs/heads/main/combined_aaguid.json";

/// c-MDS feed (secondary, degradable).
pub const C_MDS_URL: &str =
    "https://raw.githubusercontent.com/passkeydeveloper/c-mds/refs/heads/main/c_mds.json";

/// Static headers sent only with the c-MDS request.
pub const C_MDS_HEADERS: &[(&str, &str)] = &[
    ("User-Agent", "mds-sync/0.1"),
    ("Accept", "application/json"),
];

/// Source URLs for one run. Injectable so tests can point at a local server.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub mds: String,
    pub combined: String,
    pub c_mds: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            mds: MDS_URL.to_string(),
            combined: COMBINED_AAGUID_URL.to_string(),
            c_mds: C_MDS_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub dry_run: bool,
    pub output_dir: PathBuf,
    pub sample_jwt: Option<PathBuf>,
    pub retry: RetryPolicy,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            output_dir: PathBuf::from("."),
            sample_jwt: None,
            retry: RetryPolicy::default(),
        }
    }
}

/// Execute one sync run. Fatal errors (primary fetch, JWT decode, local
/// I/O) propagate; secondary-source failures degrade that source to absent.
pub async fn run(options: &RunOptions, endpoints: &Endpoints) -> anyhow::Result<MaterializeStats> {
    let fetcher =
        Fetcher::new(options.retry.clone()).context("failed to build HTTP client")?;

    let jwt_blob = match &options.sample_jwt {
        Some(path) => {
            let blob = fs::read_to_string(path)
                .with_context(|| format!("failed to read sample JWT from {}", path.display()))?;
            tracing::info!("loaded sample JWT from {}", path.display());
            blob
        }
        None => {
            let blob = fetcher
                .fetch(&endpoints.mds, &[])
                .await
                .with_context(|| format!("failed to download MDS from {}", endpoints.mds))?;
            tracing::info!("downloaded MDS from {}", endpoints.mds);
            blob
        }
    };

    let claims = decode_claims(&jwt_blob)?;
    let mds = extract_aaguids(&claims);
    tracing::info!("found {} AAGUIDs in MDS", mds.len());

    let combined = fetch_external(&fetcher, &endpoints.combined, &[]).await;
    if let Some(map) = &combined {
        tracing::info!("loaded combined map with {} entries", map.len());
    }
    let cmds = fetch_external(&fetcher, &endpoints.c_mds, C_MDS_HEADERS).await;
    if let Some(map) = &cmds {
        tracing::info!("loaded c-MDS feed with {} entries", map.len());
    }

    let records = merge_sources(mds, combined.as_ref(), cmds.as_ref());

    let ctx = SyncContext::new(options.output_dir.clone(), options.dry_run);
    let stats = ctx.materialize(&records)?;
    ctx.write_summary(&stats, Utc::now())?;
    ctx.write_index(&records)?;

    tracing::info!(
        "created {} new and saw {} existing AAGUID directories ({} total)",
        stats.created,
        stats.updated,
        stats.total
    );
    Ok(stats)
}

/// Fetch and decode a secondary source. Any failure degrades the source to
/// absent for the remainder of the run.
async fn fetch_external(
    fetcher: &Fetcher,
    url: &str,
    headers: &[(&str, &str)],
) -> Option<ExternalMap> {
    match fetcher.fetch(url, headers).await {
        Ok(text) => {
            let map = ExternalMap::parse(&text);
            if map.is_none() {
                tracing::warn!("secondary source {url} undecodable; treating as absent");
            }
            map
        }
        Err(err) => {
            tracing::warn!("secondary source {url} unreachable ({err}); treating as absent");
            None
        }
    }
}
