use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Metadata keys with dedicated fields on [`Document`]. They never appear in
/// [`Document::metadata`].
pub const RESERVED_KEYS: [&str; 4] = ["title", "date", "tags", "public"];

/// Metadata key under which tags are persisted alongside the generic metadata rows.
pub const TAGS_KEY: &str = "tags";

/// A generic metadata value. Scalars are kept as text; sequences become lists.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    String(String),
    List(Vec<String>),
}

impl MetaValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetaValue::String(s) => Some(s),
            MetaValue::List(_) => None,
        }
    }
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        MetaValue::String(value.to_string())
    }
}

impl From<Vec<String>> for MetaValue {
    fn from(value: Vec<String>) -> Self {
        MetaValue::List(value)
    }
}

/// One parsed content file. `path` is the identity: rooted, forward-slash separated, relative to
/// the content root (`/notes/a.md`).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Document {
    pub path: String,
    /// Modification time in whole seconds since the Unix epoch, as observed when extracted.
    pub mtime: i64,
    pub public: bool,
    pub title: String,
    pub date: Option<DateTime<Utc>>,
    pub tags: BTreeSet<String>,
    pub metadata: BTreeMap<String, MetaValue>,
    pub outlinks: BTreeSet<String>,
    /// Derived from other documents' outlinks; never authored.
    pub inlinks: BTreeSet<String>,
    pub attachments: BTreeSet<String>,
    /// Raw body. Empty on list-style reads.
    pub content: String,
}

impl Document {
    pub fn new<P: Into<String>>(path: P) -> Self {
        let path = path.into();
        Document {
            title: path.clone(),
            path,
            ..Default::default()
        }
    }

    /// `served(doc)`: whether this document may be persisted and returned under the given mode.
    pub fn is_served(&self, only_public: bool) -> bool {
        !only_public || self.public
    }

    /// Copy without the body, for list-style reads and content-free persistence.
    pub fn without_content(&self) -> Document {
        Document {
            content: String::new(),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn served_predicate() {
        let mut doc = Document::new("/a.md");
        assert!(doc.is_served(false));
        assert!(!doc.is_served(true));
        doc.public = true;
        assert!(doc.is_served(true));
    }

    #[test]
    fn meta_value_serializes_untagged() {
        let mut metadata = BTreeMap::new();
        metadata.insert("author".to_string(), MetaValue::from("ana"));
        metadata.insert(
            "aliases".to_string(),
            MetaValue::from(vec!["x".to_string(), "y".to_string()]),
        );
        let json = serde_json::to_string(&metadata).unwrap();
        assert_eq!(json, r#"{"aliases":["x","y"],"author":"ana"}"#);
    }
}
