//! Core library for the FIDO MDS AAGUID sync tool.
//!
//! Synchronizes a per-AAGUID directory tree against three sources: the signed
//! FIDO Metadata Service (MDS) JWT blob, the community combined-AAGUID map,
//! and the c-MDS feed. The pipeline is strictly sequential:
//!
//! 1. [`fetch`] retrieves the raw payloads with bounded retry.
//! 2. [`jwt`] and [`sources`] decode them into normalized in-memory maps.
//! 3. [`extract`] groups MDS metadata statements by AAGUID.
//! 4. [`merge`] applies the fixed name/icon precedence policy and computes
//!    the union of AAGUIDs across all sources.
//! 5. [`materialize`] applies the minimal set of filesystem writes/deletes,
//!    comparing content before every write so re-runs are idempotent.

pub mod error;
pub mod extract;
pub mod fetch;
pub mod jwt;
pub mod materialize;
pub mod merge;
pub mod sources;

pub use error::SyncError;
pub use extract::{MetadataItem, extract_aaguids};
pub use fetch::{FetchError, Fetcher, RetryPolicy};
pub use jwt::decode_claims;
pub use materialize::{MaterializeStats, SyncContext};
pub use merge::{AaguidRecord, merge_sources, resolve_icon, resolve_name};
pub use sources::ExternalMap;
