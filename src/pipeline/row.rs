//! The row type every pipeline stage reads and rewrites: an ordered map from
//! field name to value, with underscore-prefixed keys reserved for
//! pipeline-owned metadata (source URL, extraction time, validation score,
//! content hash, ...).

use std::collections::BTreeMap;

use serde_json::{Map, Value};

pub const META_SOURCE_URL: &str = "_source_url";
pub const META_EXTRACTED_AT: &str = "_extracted_at";
pub const META_VALIDATION_SCORE: &str = "_validation_score";
pub const META_CONTENT_HASH: &str = "_content_hash";

/// Exporter output keeps these metadata keys; every other underscore-prefixed
/// key is stripped before handing rows to an exporter.
pub const EXPORT_METADATA_ALLOWLIST: &[&str] =
    &[META_SOURCE_URL, META_EXTRACTED_AT, META_VALIDATION_SCORE];

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Row(pub Map<String, Value>);

impl Row {
    #[must_use]
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn is_metadata_key(key: &str) -> bool {
        key.starts_with('_')
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn content_fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter().filter(|(k, _)| !Self::is_metadata_key(k))
    }

    pub fn metadata_fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter().filter(|(k, _)| Self::is_metadata_key(k))
    }

    /// Deterministic MD5 hex digest over the JSON rendering of non-metadata
    /// fields with keys sorted lexicographically. Equal content (ignoring
    /// metadata) always yields an equal hash.
    #[must_use]
    pub fn content_hash(&self) -> String {
        let sorted: BTreeMap<&String, &Value> = self.content_fields().collect();
        let rendered = serde_json::to_string(&sorted).unwrap_or_default();
        format!("{:x}", md5::compute(rendered.as_bytes()))
    }

    /// Strips underscore-prefixed keys not on [`EXPORT_METADATA_ALLOWLIST`],
    /// producing the view exporters actually write.
    #[must_use]
    pub fn for_export(&self) -> Map<String, Value> {
        self.0
            .iter()
            .filter(|(k, _)| !Self::is_metadata_key(k) || EXPORT_METADATA_ALLOWLIST.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl From<Map<String, Value>> for Row {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(pairs: &[(&str, Value)]) -> Row {
        let mut row = Row::new();
        for (k, v) in pairs {
            row.insert(*k, v.clone());
        }
        row
    }

    #[test]
    fn content_hash_ignores_metadata() {
        let a = row(&[("title", json!("Widget")), ("_source_url", json!("https://a"))]);
        let b = row(&[("title", json!("Widget")), ("_source_url", json!("https://b"))]);
        assert_eq!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn content_hash_is_key_order_independent() {
        let a = row(&[("a", json!(1)), ("b", json!(2))]);
        let b = row(&[("b", json!(2)), ("a", json!(1))]);
        assert_eq!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn export_view_keeps_only_allowlisted_metadata() {
        let row = row(&[
            ("title", json!("Widget")),
            ("_source_url", json!("https://a")),
            ("_validation_errors", json!(["bad email"])),
        ]);
        let exported = row.for_export();
        assert!(exported.contains_key("_source_url"));
        assert!(!exported.contains_key("_validation_errors"));
        assert!(exported.contains_key("title"));
    }
}
