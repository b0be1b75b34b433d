///! County cache data types and the on-disk document layout

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use rrchirp_common::{strip_county_suffix, UsState};

/// One cached (state, county) → county id mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountyCacheEntry {
    pub state: UsState,
    /// Normalized county name (see [`normalize_county_name`])
    pub county: String,
    pub id: u32,
    /// Cross-checked against the geocoder and found consistent
    pub verified: bool,
    /// Geocoder disagreed with the upstream site; still usable
    pub conflicted: bool,
}

impl CountyCacheEntry {
    /// A freshly discovered, not yet verified entry
    pub fn discovered(state: UsState, county: &str, id: u32) -> Self {
        Self {
            state,
            county: normalize_county_name(county),
            id,
            verified: false,
            conflicted: false,
        }
    }
}

/// Result of cross-checking an entry with an independent source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationOutcome {
    Confirmed,
    Disagreed,
    /// Source unreachable or had no answer; entry stays unverified
    Unavailable,
}

/// Stored value for one county inside a state section
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub(crate) struct StoredEntry {
    pub id: u32,
    #[serde(default)]
    pub verified: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub conflicted: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Older cache files stored the bare id (string or number) per county
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum StoredValue {
    Entry(StoredEntry),
    Number(u32),
    Text(String),
}

impl StoredValue {
    pub fn into_entry(self) -> Option<StoredEntry> {
        match self {
            StoredValue::Entry(entry) => Some(entry),
            StoredValue::Number(id) => Some(StoredEntry { id, verified: false, conflicted: false }),
            StoredValue::Text(text) => text.trim().parse().ok().map(|id| StoredEntry {
                id,
                verified: false,
                conflicted: false,
            }),
        }
    }
}

/// Whole cache file: state code → normalized county → entry
pub(crate) type CacheDocument = BTreeMap<String, BTreeMap<String, StoredEntry>>;
pub(crate) type LegacyCacheDocument = BTreeMap<String, BTreeMap<String, StoredValue>>;

/// Normalize a county name into a cache key.
///
/// Case folded, county-type suffix removed, hyphens and slashes become
/// spaces, other punctuation is dropped and whitespace collapsed, so
/// "St. Louis County" and "st louis" produce the same key.
pub fn normalize_county_name(name: &str) -> String {
    let stripped = strip_county_suffix(name);
    let cleaned: String = stripped
        .chars()
        .filter_map(|c| match c {
            '-' | '/' | '_' => Some(' '),
            c if c.is_ascii_punctuation() => None,
            c => Some(c),
        })
        .collect();
    cleaned
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_collides_variants() {
        assert_eq!(normalize_county_name("St. Louis"), "st louis");
        assert_eq!(normalize_county_name("st louis"), "st louis");
        assert_eq!(normalize_county_name("  ST.  LOUIS   County "), "st louis");
        assert_eq!(normalize_county_name("Miami-Dade"), "miami dade");
        assert_eq!(normalize_county_name("Prince George's"), "prince georges");
    }

    #[test]
    fn test_legacy_values() {
        let doc: LegacyCacheDocument = serde_json::from_str(
            r#"{"MT": {"sanders": "1638", "lake": 1639, "flathead": {"id": 1640, "verified": true}}}"#,
        )
        .unwrap();
        let mt = &doc["MT"];
        assert_eq!(mt["sanders"].clone_id(), Some(1638));
        assert_eq!(mt["lake"].clone_id(), Some(1639));
        assert_eq!(mt["flathead"].clone_id(), Some(1640));
    }

    impl StoredValue {
        fn clone_id(&self) -> Option<u32> {
            match self {
                StoredValue::Entry(e) => Some(e.id),
                StoredValue::Number(n) => Some(*n),
                StoredValue::Text(t) => t.parse().ok(),
            }
        }
    }
}
