//! Materialization of resolved records into the on-disk tree.
//!
//! Every file is governed by the same content-equality rule: read the
//! existing content if present, compute the new content, write only when
//! they differ. Unchanged AAGUIDs therefore produce zero filesystem writes
//! on a re-run. A read failure counts as "no prior content" (the write
//! proceeds as if creating fresh); a delete failure is logged and ignored.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::error::SyncError;
use crate::merge::AaguidRecord;

/// Cap on the before/after previews logged for dry-run name changes.
const NAME_PREVIEW_MAX: usize = 140;

const SUMMARY_FILE: &str = "mds_summary.json";
const INDEX_FILE: &str = "aaguids.json";

/// Run-scoped context: output base path plus the dry-run flag. In dry-run
/// mode every comparison still happens and each intended action is logged,
/// but nothing on disk is touched.
#[derive(Debug, Clone)]
pub struct SyncContext {
    base: PathBuf,
    dry_run: bool,
}

/// Counters for one materialization pass.
///
/// `updated` counts directories that already existed before this run, even
/// when nothing inside them changed; `created` counts the rest. `writes` and
/// `removals` count actual mutations to per-AAGUID files (always zero in
/// dry-run). The tree-level summary and index are not counted: the summary
/// carries the run timestamp and therefore rewrites on every live run,
/// which would mask the per-AAGUID idempotence these counters report.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MaterializeStats {
    pub total: usize,
    pub created: usize,
    pub updated: usize,
    pub writes: usize,
    pub removals: usize,
}

#[derive(Serialize)]
struct Summary<'a> {
    total_aaguids: usize,
    created_directories: usize,
    updated_directories: usize,
    last_updated: &'a str,
}

#[derive(Serialize)]
struct IndexEntry<'a> {
    aaguid: &'a str,
    name: &'a str,
}

impl SyncContext {
    pub fn new(base: impl Into<PathBuf>, dry_run: bool) -> Self {
        Self {
            base: base.into(),
            dry_run,
        }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Materialize every record under `<base>/<aaguid>/`.
    pub fn materialize(&self, records: &[AaguidRecord]) -> Result<MaterializeStats, SyncError> {
        if !self.dry_run {
            fs::create_dir_all(&self.base)?;
        }

        let mut stats = MaterializeStats::default();
        for record in records {
            self.materialize_record(record, &mut stats)?;
            tracing::info!("processed AAGUID {} -> {}", record.aaguid, record.name);
        }
        stats.total = records.len();
        Ok(stats)
    }

    fn materialize_record(
        &self,
        record: &AaguidRecord,
        stats: &mut MaterializeStats,
    ) -> Result<(), SyncError> {
        let dir = self.base.join(&record.aaguid);
        if dir.exists() {
            stats.updated += 1;
        } else {
            stats.created += 1;
        }
        if !self.dry_run {
            fs::create_dir_all(&dir)?;
        }

        self.write_if_changed(&dir.join("name.txt"), &record.name, true, stats)?;

        let metadata = sorted_pretty(&serde_json::to_value(&record.items)?);
        self.write_if_changed(&dir.join("metadata.json"), &metadata, false, stats)?;

        match &record.icon {
            Some(icon) => self.write_if_changed(&dir.join("icon.txt"), icon, false, stats)?,
            None => self.remove_if_present(&dir.join("icon.txt"), stats),
        }

        match &record.c_mds_entry {
            Some(entry) => {
                let content = sorted_pretty(entry);
                self.write_if_changed(&dir.join("c_mds.json"), &content, false, stats)?;
            }
            None => self.remove_if_present(&dir.join("c_mds.json"), stats),
        }

        match &record.icon_light {
            Some(value) => self.write_if_changed(&dir.join("icon_light.txt"), value, false, stats)?,
            None => self.remove_if_present(&dir.join("icon_light.txt"), stats),
        }
        match &record.icon_dark {
            Some(value) => self.write_if_changed(&dir.join("icon_dark.txt"), value, false, stats)?,
            None => self.remove_if_present(&dir.join("icon_dark.txt"), stats),
        }

        Ok(())
    }

    /// Write the tree-level summary object, under the same equality rule.
    /// Not reflected in any [`MaterializeStats`]: the timestamp field makes
    /// this file rewrite on every live run.
    pub fn write_summary(
        &self,
        stats: &MaterializeStats,
        last_updated: DateTime<Utc>,
    ) -> Result<(), SyncError> {
        let timestamp = last_updated.to_rfc3339();
        let summary = Summary {
            total_aaguids: stats.total,
            created_directories: stats.created,
            updated_directories: stats.updated,
            last_updated: &timestamp,
        };
        let content = sorted_pretty(&serde_json::to_value(&summary)?);
        let mut scratch = MaterializeStats::default();
        self.write_if_changed(&self.base.join(SUMMARY_FILE), &content, false, &mut scratch)?;
        Ok(())
    }

    /// Write the compact `{aaguid, name}` index, sorted by lowercase AAGUID.
    pub fn write_index(&self, records: &[AaguidRecord]) -> Result<(), SyncError> {
        let mut entries: Vec<IndexEntry> = records
            .iter()
            .map(|record| IndexEntry {
                aaguid: &record.aaguid,
                name: &record.name,
            })
            .collect();
        entries.sort_by_key(|entry| entry.aaguid.to_lowercase());

        let content = sorted_pretty(&serde_json::to_value(&entries)?);
        let mut scratch = MaterializeStats::default();
        self.write_if_changed(&self.base.join(INDEX_FILE), &content, false, &mut scratch)?;
        Ok(())
    }

    /// The content-equality write rule. Returns without touching disk when
    /// the existing content already equals `new_content`.
    fn write_if_changed(
        &self,
        path: &Path,
        new_content: &str,
        preview: bool,
        stats: &mut MaterializeStats,
    ) -> Result<(), SyncError> {
        let old = match fs::read_to_string(path) {
            Ok(existing) => Some(existing),
            Err(err) if err.kind() == ErrorKind::NotFound => None,
            Err(err) => {
                tracing::warn!(
                    "could not read {} for comparison ({err}); treating as missing",
                    path.display()
                );
                None
            }
        };

        if old.as_deref() == Some(new_content) {
            return Ok(());
        }

        if self.dry_run {
            if preview {
                tracing::info!(
                    "[dry-run] would update {}: {:?} -> {:?}",
                    path.display(),
                    old.as_deref().map(truncate_preview),
                    truncate_preview(new_content)
                );
            } else {
                tracing::info!(
                    "[dry-run] would write {} ({} bytes)",
                    path.display(),
                    new_content.len()
                );
            }
            return Ok(());
        }

        fs::write(path, new_content)?;
        stats.writes += 1;
        Ok(())
    }

    /// Best-effort stale-file cleanup: failures log and continue.
    fn remove_if_present(&self, path: &Path, stats: &mut MaterializeStats) {
        if !path.exists() {
            return;
        }
        if self.dry_run {
            tracing::info!("[dry-run] would remove stale {}", path.display());
            return;
        }
        match fs::remove_file(path) {
            Ok(()) => {
                stats.removals += 1;
                tracing::info!("removed stale {}", path.display());
            }
            Err(err) => {
                tracing::warn!("failed to remove stale {}: {err}", path.display());
            }
        }
    }
}

/// Truncate a logged preview at a char boundary.
fn truncate_preview(s: &str) -> String {
    s.chars().take(NAME_PREVIEW_MAX).collect()
}

/// Deterministic serialization: pretty-printed with object keys sorted
/// (serde_json's default map is ordered by key), for stable diffs.
fn sorted_pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|err| {
        // Value -> text cannot fail for tree-shaped data; keep the run alive
        // if it somehow does.
        tracing::warn!("could not serialize value: {err}");
        String::new()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::MetadataItem;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    fn record(aaguid: &str, name: &str) -> AaguidRecord {
        AaguidRecord {
            aaguid: aaguid.to_string(),
            name: name.to_string(),
            icon: None,
            items: vec![MetadataItem::placeholder(name.to_string(), json!(""))],
            c_mds_entry: None,
            icon_light: None,
            icon_dark: None,
        }
    }

    #[test]
    fn writes_expected_files() {
        let tmp = TempDir::new().unwrap();
        let ctx = SyncContext::new(tmp.path(), false);
        let mut rec = record("aaaa", "Some Key");
        rec.icon = Some("data:icon".to_string());
        rec.c_mds_entry = Some(json!({"friendlyName": "Some Key"}));
        rec.icon_light = Some("L".to_string());

        let stats = ctx.materialize(std::slice::from_ref(&rec)).unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.created, 1);
        assert_eq!(stats.updated, 0);

        let dir = tmp.path().join("aaaa");
        assert_eq!(fs::read_to_string(dir.join("name.txt")).unwrap(), "Some Key");
        assert_eq!(fs::read_to_string(dir.join("icon.txt")).unwrap(), "data:icon");
        assert_eq!(
            fs::read_to_string(dir.join("icon_light.txt")).unwrap(),
            "L"
        );
        assert!(!dir.join("icon_dark.txt").exists());

        let metadata: Value =
            serde_json::from_str(&fs::read_to_string(dir.join("metadata.json")).unwrap()).unwrap();
        assert_eq!(metadata[0]["name"], "Some Key");
        assert!(metadata[0].get("metadataStatement").is_some());

        let c_mds: Value =
            serde_json::from_str(&fs::read_to_string(dir.join("c_mds.json")).unwrap()).unwrap();
        assert_eq!(c_mds["friendlyName"], "Some Key");
    }

    #[test]
    fn second_run_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let ctx = SyncContext::new(tmp.path(), false);
        let mut rec = record("aaaa", "Some Key");
        rec.icon = Some("data:icon".to_string());
        rec.c_mds_entry = Some(json!({"x": 1}));

        let first = ctx.materialize(std::slice::from_ref(&rec)).unwrap();
        assert!(first.writes > 0);

        let second = ctx.materialize(std::slice::from_ref(&rec)).unwrap();
        assert_eq!(second.writes, 0);
        assert_eq!(second.removals, 0);
        // the directory pre-existed, so it counts as updated
        assert_eq!(second.created, 0);
        assert_eq!(second.updated, 1);
    }

    #[test]
    fn updated_counts_preexisting_directories_even_without_changes() {
        let tmp = TempDir::new().unwrap();
        let ctx = SyncContext::new(tmp.path(), false);
        let records = vec![record("aaaa", "A"), record("bbbb", "B")];

        let first = ctx.materialize(&records).unwrap();
        assert_eq!((first.created, first.updated), (2, 0));

        let second = ctx.materialize(&records).unwrap();
        assert_eq!((second.created, second.updated), (0, 2));
    }

    #[test]
    fn stale_files_are_deleted() {
        let tmp = TempDir::new().unwrap();
        let ctx = SyncContext::new(tmp.path(), false);

        let mut rec = record("aaaa", "A");
        rec.icon = Some("data:icon".to_string());
        rec.c_mds_entry = Some(json!({"x": 1}));
        rec.icon_dark = Some("D".to_string());
        ctx.materialize(std::slice::from_ref(&rec)).unwrap();

        let dir = tmp.path().join("aaaa");
        assert!(dir.join("icon.txt").exists());
        assert!(dir.join("c_mds.json").exists());
        assert!(dir.join("icon_dark.txt").exists());

        // sources dropped their fields this run
        let stats = ctx
            .materialize(std::slice::from_ref(&record("aaaa", "A")))
            .unwrap();
        assert_eq!(stats.removals, 3);
        assert!(!dir.join("icon.txt").exists());
        assert!(!dir.join("c_mds.json").exists());
        assert!(!dir.join("icon_dark.txt").exists());
        assert!(dir.join("name.txt").exists());
    }

    #[test]
    fn changed_name_rewrites_only_that_file() {
        let tmp = TempDir::new().unwrap();
        let ctx = SyncContext::new(tmp.path(), false);
        let rec = record("aaaa", "Old Name");
        ctx.materialize(std::slice::from_ref(&rec)).unwrap();

        // same items, so metadata.json is untouched and only name.txt rewrites
        let mut renamed = rec.clone();
        renamed.name = "New Name".to_string();

        let stats = ctx.materialize(std::slice::from_ref(&renamed)).unwrap();
        assert_eq!(stats.writes, 1);
        assert_eq!(
            fs::read_to_string(tmp.path().join("aaaa/name.txt")).unwrap(),
            "New Name"
        );
    }

    #[test]
    fn dry_run_touches_nothing() {
        let tmp = TempDir::new().unwrap();
        let ctx = SyncContext::new(tmp.path().join("out"), true);
        let mut rec = record("aaaa", "A");
        rec.icon = Some("data:icon".to_string());

        let stats = ctx.materialize(std::slice::from_ref(&rec)).unwrap();
        assert_eq!(stats.writes, 0);
        assert_eq!(stats.created, 1);
        assert!(!tmp.path().join("out").exists());

        ctx.write_summary(&stats, Utc::now()).unwrap();
        ctx.write_index(std::slice::from_ref(&rec)).unwrap();
        assert!(!tmp.path().join("out").exists());
    }

    #[test]
    fn dry_run_still_reports_stale_deletes() {
        let tmp = TempDir::new().unwrap();
        let live = SyncContext::new(tmp.path(), false);
        let mut rec = record("aaaa", "A");
        rec.icon = Some("data:icon".to_string());
        live.materialize(std::slice::from_ref(&rec)).unwrap();

        let dry = SyncContext::new(tmp.path(), true);
        let stats = dry
            .materialize(std::slice::from_ref(&record("aaaa", "A")))
            .unwrap();
        assert_eq!(stats.removals, 0);
        // file survives a dry run
        assert!(tmp.path().join("aaaa/icon.txt").exists());
    }

    #[test]
    fn summary_rewrite_is_not_counted() {
        let tmp = TempDir::new().unwrap();
        let ctx = SyncContext::new(tmp.path(), false);
        let records = vec![record("aaaa", "A")];

        let stats = ctx.materialize(&records).unwrap();
        ctx.write_summary(&stats, Utc::now()).unwrap();

        // the per-AAGUID counters stay at zero on the re-run even though a
        // later timestamp rewrites the summary file itself
        let again = ctx.materialize(&records).unwrap();
        assert_eq!(again.writes, 0);

        let later = Utc::now() + chrono::Duration::seconds(1);
        ctx.write_summary(&again, later).unwrap();
        let summary: Value =
            serde_json::from_str(&fs::read_to_string(tmp.path().join(SUMMARY_FILE)).unwrap())
                .unwrap();
        assert_eq!(summary["last_updated"], later.to_rfc3339());
    }

    #[test]
    fn previews_are_capped() {
        let long: String = "x".repeat(500);
        assert_eq!(truncate_preview(&long).len(), NAME_PREVIEW_MAX);
        assert_eq!(truncate_preview("short"), "short");
    }

    #[test]
    fn summary_and_index_are_stable() {
        let tmp = TempDir::new().unwrap();
        let ctx = SyncContext::new(tmp.path(), false);
        let records = vec![record("BBBB-1", "Second"), record("aaaa-2", "First")];
        let stats = ctx.materialize(&records).unwrap();

        let now = Utc::now();
        ctx.write_summary(&stats, now).unwrap();
        ctx.write_index(&records).unwrap();

        let summary: Value =
            serde_json::from_str(&fs::read_to_string(tmp.path().join(SUMMARY_FILE)).unwrap())
                .unwrap();
        assert_eq!(summary["total_aaguids"], 2);
        assert_eq!(summary["created_directories"], 2);
        assert_eq!(summary["updated_directories"], 0);
        assert_eq!(summary["last_updated"], now.to_rfc3339());

        let index: Value =
            serde_json::from_str(&fs::read_to_string(tmp.path().join(INDEX_FILE)).unwrap())
                .unwrap();
        // sorted by lowercase AAGUID: "aaaa-2" < "bbbb-1"
        assert_eq!(index[0]["aaguid"], "aaaa-2");
        assert_eq!(index[0]["name"], "First");
        assert_eq!(index[1]["aaguid"], "BBBB-1");

        // identical inputs produce byte-identical files on a re-write pass
        let before = fs::read_to_string(tmp.path().join(INDEX_FILE)).unwrap();
        ctx.write_index(&records).unwrap();
        assert_eq!(fs::read_to_string(tmp.path().join(INDEX_FILE)).unwrap(), before);
    }
}
