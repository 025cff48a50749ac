//! Decoding of the secondary JSON feeds.
//!
//! Both the combined-AAGUID map and the c-MDS feed arrive in one of two
//! shapes: an object keyed by AAGUID-like strings, or an array of objects
//! each carrying its own identifier field. [`ExternalMap::parse`] normalizes
//! either shape into a single lookup table keyed by both the hyphenated and
//! the unhyphenated lowercase form of every AAGUID, so downstream code never
//! needs to know which form a given source used.

use std::collections::BTreeMap;

use serde_json::Value;

/// Identifier fields probed, in order, when a feed entry carries its own
/// AAGUID rather than being keyed by one.
const ID_FIELDS: [&str; 4] = ["aaguid", "AAGUID", "id", "idHex"];

/// Normalized view of one secondary source.
#[derive(Debug, Default, Clone)]
pub struct ExternalMap {
    entries: BTreeMap<String, Value>,
}

impl ExternalMap {
    /// Parse raw feed text. Returns `None` (after a log line) on any decode
    /// failure; a secondary source that cannot be decoded is treated as
    /// absent for the rest of the run.
    pub fn parse(text: &str) -> Option<Self> {
        let parsed: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!("could not parse external AAGUID JSON: {err}");
                return None;
            }
        };

        let mut map = Self::default();
        match parsed {
            Value::Object(obj) => {
                for (key, value) in obj {
                    map.add_key(&key, value);
                }
            }
            Value::Array(items) => {
                for item in items {
                    let Some(key) = identifier_field(&item).map(str::to_string) else {
                        continue;
                    };
                    map.add_key(&key, item);
                }
            }
            other => {
                tracing::warn!(
                    "external AAGUID JSON has unsupported top-level shape: {}",
                    type_name(&other)
                );
                return None;
            }
        }
        Some(map)
    }

    /// Insert `value` under both normalized key forms.
    fn add_key(&mut self, key: &str, value: Value) {
        if key.is_empty() {
            return;
        }
        let hyphenated = key.to_lowercase();
        let bare = hyphenated.replace('-', "");
        if bare != hyphenated {
            self.entries.insert(bare, value.clone());
        }
        self.entries.insert(hyphenated, value);
    }

    /// Look up an AAGUID in either key form.
    pub fn get(&self, aaguid: &str) -> Option<&Value> {
        let lower = aaguid.to_lowercase();
        if let Some(value) = self.entries.get(&lower) {
            return Some(value);
        }
        self.entries.get(&lower.replace('-', ""))
    }

    /// All normalized keys and their entries. A single source entry appears
    /// under both of its key forms; callers computing a union must
    /// deduplicate via [`canonical_aaguid`].
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The entry's own identifier field, if any.
pub fn identifier_field(entry: &Value) -> Option<&str> {
    let obj = entry.as_object()?;
    ID_FIELDS
        .iter()
        .find_map(|field| obj.get(*field).and_then(Value::as_str))
        .filter(|s| !s.is_empty())
}

/// Reconstruct the canonical lowercase hyphenated AAGUID for a normalized
/// map key: prefer the entry's explicit identifier field, else re-insert
/// hyphens into a bare 32-hex key, else keep the key unmodified.
pub fn canonical_aaguid(key: &str, entry: Option<&Value>) -> String {
    if let Some(id) = entry.and_then(identifier_field) {
        return id.to_lowercase();
    }
    let key = key.to_lowercase();
    if key.len() == 32 && key.bytes().all(|b| b.is_ascii_hexdigit()) {
        format!(
            "{}-{}-{}-{}-{}",
            &key[0..8],
            &key[8..12],
            &key[12..16],
            &key[16..20],
            &key[20..32]
        )
    } else {
        key
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
