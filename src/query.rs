//! Query descriptions handed to [`crate::db::DbConnection`].
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{collections::BTreeMap, fmt::Write};

/// One ad-hoc result row, keyed by column name.
pub type Row = BTreeMap<String, serde_json::Value>;

/// A positional `?` parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Binding {
    Null,
    Int(i64),
    Real(f64),
    Text(String),
}

impl From<&str> for Binding {
    fn from(value: &str) -> Self {
        Binding::Text(value.to_string())
    }
}

impl From<String> for Binding {
    fn from(value: String) -> Self {
        Binding::Text(value)
    }
}

impl From<i64> for Binding {
    fn from(value: i64) -> Self {
        Binding::Int(value)
    }
}

impl From<f64> for Binding {
    fn from(value: f64) -> Self {
        Binding::Real(value)
    }
}

impl From<bool> for Binding {
    fn from(value: bool) -> Self {
        Binding::Int(value as i64)
    }
}

impl<T: Into<Binding>> From<Option<T>> for Binding {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Binding::Null)
    }
}

/// Stable cache key for a query and its parameters: hex-encoded SHA-256.
pub fn cache_key(sql: &str, bindings: &[Binding]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(sql.as_bytes());
    for binding in bindings {
        hasher.update([0u8]);
        match binding {
            Binding::Null => hasher.update(b"n"),
            Binding::Int(i) => {
                hasher.update(b"i");
                hasher.update(i.to_le_bytes());
            }
            Binding::Real(f) => {
                hasher.update(b"r");
                hasher.update(f.to_bits().to_le_bytes());
            }
            Binding::Text(s) => {
                hasher.update(b"t");
                hasher.update(s.as_bytes());
            }
        }
    }
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OrderColumn {
    #[default]
    Path,
    Mtime,
    Date,
    Title,
}

impl OrderColumn {
    fn as_sql(&self) -> &'static str {
        match self {
            OrderColumn::Path => "path",
            OrderColumn::Mtime => "mtime",
            OrderColumn::Date => "date",
            OrderColumn::Title => "title",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Which child tables to aggregate into listed documents. Each one costs a correlated subquery,
/// so hot listing paths should ask only for what they render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Inclusions {
    pub metadata: bool,
    pub outlinks: bool,
    pub attachments: bool,
}

impl Inclusions {
    pub fn all() -> Self {
        Inclusions {
            metadata: true,
            outlinks: true,
            attachments: true,
        }
    }

    pub fn none() -> Self {
        Inclusions::default()
    }
}

/// A filtered document listing.
///
/// `filter` is an SQL fragment appended to `SELECT ... FROM documents AS d`, so it may contain
/// joins as well as a `WHERE` clause, with `?` placeholders matched positionally by `bindings`.
/// It is trusted input from the rendering layer, not from end users.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DocumentQuery {
    pub filter: String,
    pub bindings: Vec<Binding>,
    pub include: Inclusions,
    pub order_by: OrderColumn,
    pub direction: SortDirection,
    pub limit: Option<u32>,
}

impl DocumentQuery {
    pub fn new() -> Self {
        DocumentQuery::default()
    }

    pub fn filter<S: Into<String>>(mut self, filter: S, bindings: Vec<Binding>) -> Self {
        self.filter = filter.into();
        self.bindings = bindings;
        self
    }

    /// Documents carrying `tag`.
    pub fn tagged(tag: &str) -> Self {
        DocumentQuery::new().filter(
            "JOIN metadata AS m ON m.\"from\" = d.path WHERE m.key = 'tags' AND m.value = ?",
            vec![Binding::from(tag)],
        )
    }

    pub fn include(mut self, include: Inclusions) -> Self {
        self.include = include;
        self
    }

    pub fn order_by(mut self, column: OrderColumn, direction: SortDirection) -> Self {
        self.order_by = column;
        self.direction = direction;
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn to_sql(&self) -> String {
        let mut sql = String::from(
            "WITH targets AS (SELECT DISTINCT d.path, d.mtime, d.date, d.title, d.public \
             FROM documents AS d",
        );
        if !self.filter.trim().is_empty() {
            sql.push(' ');
            sql.push_str(self.filter.trim());
        }
        sql.push_str(") SELECT t.path, t.mtime, t.date, t.title, t.public");
        if self.include.metadata {
            sql.push_str(
                ", (SELECT group_concat(m.key || char(31) || m.ord || char(31) || m.list || char(31) || m.value, \
                 char(30)) \
                 FROM metadata AS m WHERE m.\"from\" = t.path) AS metadata_agg",
            );
        }
        if self.include.outlinks {
            sql.push_str(
                ", (SELECT group_concat(o.\"to\", char(30)) \
                 FROM outlinks AS o WHERE o.\"from\" = t.path) AS outlinks_agg",
            );
        }
        if self.include.attachments {
            sql.push_str(
                ", (SELECT group_concat(a.file, char(30)) \
                 FROM attachments AS a WHERE a.\"from\" = t.path) AS attachments_agg",
            );
        }
        let _ = write!(
            sql,
            " FROM targets AS t ORDER BY t.{} {}",
            self.order_by.as_sql(),
            self.direction.as_sql()
        );
        if self.order_by != OrderColumn::Path {
            sql.push_str(", t.path ASC");
        }
        if let Some(limit) = self.limit {
            let _ = write!(sql, " LIMIT {limit}");
        }
        sql
    }
}
