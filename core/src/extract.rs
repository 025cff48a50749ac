//! Grouping of MDS metadata statements by AAGUID.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One MDS entry's view of an AAGUID.
///
/// An AAGUID may own several of these (multiple MDS entries can share an
/// AAGUID); list order follows MDS entry order and duplicates are preserved
/// verbatim, never merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataItem {
    pub name: String,
    pub description: Value,
    #[serde(rename = "metadataStatement")]
    pub metadata_statement: Value,
    pub mds_entry: Value,
}

impl MetadataItem {
    /// Synthetic item for an AAGUID known only to a secondary source.
    pub fn placeholder(name: String, description: Value) -> Self {
        Self {
            name,
            description,
            metadata_statement: Value::Object(Map::new()),
            mds_entry: Value::Object(Map::new()),
        }
    }
}

/// Walk the MDS claims' `entries` list and group metadata statements by
/// AAGUID. Entries without a `metadataStatement.aaguid` are skipped. The
/// outer list preserves first-seen AAGUID order.
pub fn extract_aaguids(claims: &Value) -> Vec<(String, Vec<MetadataItem>)> {
    let mut grouped: Vec<(String, Vec<MetadataItem>)> = Vec::new();
    let mut index: std::collections::HashMap<String, usize> = std::collections::HashMap::new();

    let entries = claims
        .get("entries")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    for entry in entries {
        let statement = entry.get("metadataStatement").cloned().unwrap_or(Value::Null);
        let Some(aaguid) = statement
            .get("aaguid")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
        else {
            continue;
        };
        let aaguid = aaguid.to_string();

        let description = statement
            .get("description")
            .cloned()
            .unwrap_or_else(|| Value::String("Unknown".to_string()));
        let item = MetadataItem {
            name: derive_name(&description),
            description,
            metadata_statement: statement,
            mds_entry: entry.clone(),
        };

        match index.get(&aaguid) {
            Some(&slot) => grouped[slot].1.push(item),
            None => {
                index.insert(aaguid.clone(), grouped.len());
                grouped.push((aaguid, vec![item]));
            }
        }
    }

    grouped
}

/// Display name from an MDS `description`: strings pass through; per-locale
/// maps prefer `en`, then `english`, else the whole map is stringified.
fn derive_name(description: &Value) -> String {
    match description {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .get("en")
            .or_else(|| map.get("english"))
            .map(value_to_display)
            .unwrap_or_else(|| description.to_string()),
        other => other.to_string(),
    }
}

fn value_to_display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn groups_by_aaguid_preserving_order() {
        let claims = json!({"entries": [
            {"metadataStatement": {"aaguid": "aaa", "description": "First"}},
            {"metadataStatement": {"aaguid": "bbb", "description": "Second"}},
            {"metadataStatement": {"aaguid": "aaa", "description": "First again"}},
        ]});
        let grouped = extract_aaguids(&claims);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].0, "aaa");
        assert_eq!(grouped[0].1.len(), 2);
        assert_eq!(grouped[0].1[0].name, "First");
        assert_eq!(grouped[0].1[1].name, "First again");
        assert_eq!(grouped[1].0, "bbb");
    }

    #[test]
    fn skips_entries_without_aaguid() {
        let claims = json!({"entries": [
            {"metadataStatement": {"description": "no aaguid"}},
            {"attestationCertificateKeyIdentifiers": ["u2f-style"]},
            {"metadataStatement": {"aaguid": "ccc", "description": "kept"}},
        ]});
        let grouped = extract_aaguids(&claims);
        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped[0].0, "ccc");
    }

    #[test]
    fn empty_aaguid_is_skipped() {
        // an empty identifier would otherwise materialize at the tree root
        let claims = json!({"entries": [
            {"metadataStatement": {"aaguid": "", "description": "empty id"}},
            {"metadataStatement": {"aaguid": "aaa", "description": "kept"}},
        ]});
        let grouped = extract_aaguids(&claims);
        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped[0].0, "aaa");
    }

    #[test]
    fn locale_map_prefers_en_then_english() {
        let en = json!({"entries": [{"metadataStatement": {
            "aaguid": "a", "description": {"en": "English", "de": "Deutsch"}}}]});
        assert_eq!(extract_aaguids(&en)[0].1[0].name, "English");

        let english = json!({"entries": [{"metadataStatement": {
            "aaguid": "a", "description": {"english": "Fallback", "de": "Deutsch"}}}]});
        assert_eq!(extract_aaguids(&english)[0].1[0].name, "Fallback");

        let neither = json!({"entries": [{"metadataStatement": {
            "aaguid": "a", "description": {"de": "Deutsch"}}}]});
        assert_eq!(extract_aaguids(&neither)[0].1[0].name, r#"{"de":"Deutsch"}"#);
    }

    #[test]
    fn missing_description_becomes_unknown() {
        let claims = json!({"entries": [{"metadataStatement": {"aaguid": "a"}}]});
        let grouped = extract_aaguids(&claims);
        assert_eq!(grouped[0].1[0].name, "Unknown");
        assert_eq!(grouped[0].1[0].description, json!("Unknown"));
    }

    #[test]
    fn item_retains_full_statement_and_entry() {
        let claims = json!({"entries": [{
            "statusReports": [{"status": "FIDO_CERTIFIED"}],
            "metadataStatement": {"aaguid": "a", "description": "D", "icon": "data:x"}
        }]});
        let item = &extract_aaguids(&claims)[0].1[0];
        assert_eq!(item.metadata_statement["icon"], "data:x");
        assert_eq!(item.mds_entry["statusReports"][0]["status"], "FIDO_CERTIFIED");
    }

    #[test]
    fn serializes_with_wire_field_names() {
        let item = MetadataItem::placeholder("N".to_string(), json!(""));
        let value = serde_json::to_value(&item).unwrap();
        assert!(value.get("metadataStatement").is_some());
        assert!(value.get("mds_entry").is_some());
    }
}
