//! Three-source precedence policy.
//!
//! [`resolve_name`] and [`resolve_icon`] are pure: they see the MDS-derived
//! items plus the (optional) combined-map and c-MDS entries for one AAGUID
//! and nothing else, so the whole policy is unit-testable without any
//! filesystem or network dependency. [`merge_sources`] computes the union of
//! AAGUIDs across all sources and synthesizes placeholder items for AAGUIDs
//! absent from MDS.

use std::collections::HashSet;

use serde_json::Value;

use crate::extract::MetadataItem;
use crate::sources::{ExternalMap, canonical_aaguid};

/// Preferred c-MDS `friendlyNames` locales, highest first. Anything else
/// falls back to the lexicographically smallest remaining locale key so the
/// choice is deterministic.
const FRIENDLY_LOCALES: [&str; 3] = ["en-US", "en", "en-GB"];

/// Fully resolved view of one AAGUID, ready to materialize.
#[derive(Debug, Clone, PartialEq)]
pub struct AaguidRecord {
    pub aaguid: String,
    pub name: String,
    pub icon: Option<String>,
    pub items: Vec<MetadataItem>,
    pub c_mds_entry: Option<Value>,
    pub icon_light: Option<String>,
    pub icon_dark: Option<String>,
}

/// Collapse every run of whitespace (including newlines and tabs) to a
/// single space and trim the ends, so no materialized file ever contains an
/// embedded newline from a name field.
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn nonempty_str(value: &Value) -> Option<&str> {
    value.as_str().filter(|s| !s.trim().is_empty())
}

/// Display name for one AAGUID. Precedence, highest first: combined-map
/// `name`; c-MDS friendly name; MDS-derived name; `"Unknown"`.
pub fn resolve_name(
    items: &[MetadataItem],
    combined: Option<&Value>,
    cmds: Option<&Value>,
) -> String {
    let chosen = combined
        .and_then(|entry| entry.get("name"))
        .and_then(nonempty_str)
        .or_else(|| cmds.and_then(friendly_name))
        .or_else(|| {
            items
                .first()
                .map(|item| item.name.as_str())
                .filter(|s| !s.trim().is_empty())
        })
        .unwrap_or("Unknown");
    normalize_whitespace(chosen)
}

/// c-MDS name: `friendlyNames` locale map first (preferred locales, then the
/// smallest remaining key), then the plain `friendlyName`/`name` fields.
fn friendly_name(entry: &Value) -> Option<&str> {
    if let Some(locales) = entry.get("friendlyNames").and_then(Value::as_object) {
        for locale in FRIENDLY_LOCALES {
            if let Some(name) = locales.get(locale).and_then(nonempty_str) {
                return Some(name);
            }
        }
        // serde_json maps iterate in sorted key order, so the first string
        // value is the lexicographically smallest locale.
        if let Some(name) = locales.values().find_map(nonempty_str) {
            return Some(name);
        }
    }
    entry
        .get("friendlyName")
        .and_then(nonempty_str)
        .or_else(|| entry.get("name").and_then(nonempty_str))
}

/// Icon for one AAGUID: the c-MDS `icon` if present and truthy, else the
/// first metadata-statement field whose key case-insensitively equals
/// `icon`, scanning items in list order.
pub fn resolve_icon(items: &[MetadataItem], cmds: Option<&Value>) -> Option<String> {
    if let Some(icon) = cmds
        .and_then(|entry| entry.get("icon"))
        .filter(|v| is_truthy(v))
    {
        return Some(icon_value_to_string(icon));
    }

    for item in items {
        let Some(statement) = item.metadata_statement.as_object() else {
            continue;
        };
        for (key, value) in statement {
            if key.eq_ignore_ascii_case("icon") {
                return Some(icon_value_to_string(value));
            }
        }
    }
    None
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::Number(_) => true,
    }
}

/// Normalize an icon field value: lists contribute their first element,
/// mappings serialize to compact JSON, other scalars stringify.
fn icon_value_to_string(value: &Value) -> String {
    match value {
        Value::Array(items) if !items.is_empty() => match &items[0] {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        },
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Merge the three sources into one record per AAGUID.
///
/// MDS records come first, in MDS order. AAGUIDs present only in a secondary
/// source follow with a single synthetic empty-statement item, keyed by the
/// canonical hyphenated AAGUID. Hyphenated and unhyphenated lowercase forms
/// are treated as the same key throughout.
pub fn merge_sources(
    mds: Vec<(String, Vec<MetadataItem>)>,
    combined: Option<&ExternalMap>,
    cmds: Option<&ExternalMap>,
) -> Vec<AaguidRecord> {
    let mut seen: HashSet<String> = HashSet::new();
    for (aaguid, _) in &mds {
        let lower = aaguid.to_lowercase();
        seen.insert(lower.replace('-', ""));
        seen.insert(lower);
    }

    let mut records: Vec<AaguidRecord> = mds
        .into_iter()
        .map(|(aaguid, items)| {
            let combined_entry = combined.and_then(|m| m.get(&aaguid));
            let cmds_entry = cmds.and_then(|m| m.get(&aaguid));
            build_record(aaguid, items, combined_entry, cmds_entry)
        })
        .collect();

    for (from_combined, map) in [(true, combined), (false, cmds)] {
        let Some(map) = map else {
            continue;
        };
        for (key, entry) in map.iter() {
            if seen.contains(key.as_str()) {
                continue;
            }
            let aaguid = canonical_aaguid(key, Some(entry));
            let bare = aaguid.replace('-', "");
            if seen.contains(&aaguid) || seen.contains(&bare) {
                continue;
            }
            seen.insert(bare);
            seen.insert(aaguid.clone());

            let mut combined_entry = combined.and_then(|m| m.get(&aaguid));
            let mut cmds_entry = cmds.and_then(|m| m.get(&aaguid));
            // The canonical id is not a key of the source map when the
            // entry's identifier field disagrees with its key; keep the
            // entry in hand rather than dropping its fields.
            if from_combined {
                combined_entry = combined_entry.or(Some(entry));
            } else {
                cmds_entry = cmds_entry.or(Some(entry));
            }
            let name = resolve_name(&[], combined_entry, cmds_entry);
            let description = entry
                .get("description")
                .cloned()
                .unwrap_or_else(|| Value::String(String::new()));
            let placeholder = MetadataItem::placeholder(name, description);
            records.push(build_record(
                aaguid,
                vec![placeholder],
                combined_entry,
                cmds_entry,
            ));
        }
    }

    records
}

fn build_record(
    aaguid: String,
    items: Vec<MetadataItem>,
    combined_entry: Option<&Value>,
    cmds_entry: Option<&Value>,
) -> AaguidRecord {
    let name = resolve_name(&items, combined_entry, cmds_entry);
    let icon = resolve_icon(&items, cmds_entry);
    let icon_light = combined_entry
        .and_then(|entry| entry.get("icon_light"))
        .and_then(nonempty_str)
        .map(str::to_string);
    let icon_dark = combined_entry
        .and_then(|entry| entry.get("icon_dark"))
        .and_then(nonempty_str)
        .map(str::to_string);
    AaguidRecord {
        aaguid,
        name,
        icon,
        items,
        c_mds_entry: cmds_entry.cloned(),
        icon_light,
        icon_dark,
    }
}
