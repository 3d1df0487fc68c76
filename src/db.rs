//! SQLite persistence: the durable source of truth for served documents.
//!
//! Tables:
//!
//! | table         | key                     | notes                                         |
//! |---------------|-------------------------|-----------------------------------------------|
//! | `documents`   | `path`                  | `mtime`, `date` (UTC text), `title`, `public` |
//! | `outlinks`    | `("from", "to")`        | cascades from `documents`                     |
//! | `attachments` | `("from", file)`        | cascades from `documents`                     |
//! | `metadata`    | `("from", key, ord)`    | cascades from `documents`; tags use key `tags` |
//!
//! `metadata` rows carry their position (`ord`) and whether the key held a list (`list`), so a
//! one-item list, item order and repeated items all read back as authored. An empty list is a
//! single row with `ord = -1`. Dates are stored as fixed-width `YYYY-MM-DDTHH:MM:SS.fffffffffZ`
//! text, which sorts chronologically and keeps sub-second precision.
//!
//! With the search index enabled an FTS5 table `documents_fts(path, title, content)` mirrors each
//! document and is written in the same transaction as its row.
//!
//! Every write runs inside one transaction bounded by a deadline. Batch upserts give each document
//! its own savepoint so a failing document is rolled back and reported without losing the rest.
use crate::{
    config::{CoreConfig, DB_FILE_NAME},
    document::{Document, MetaValue, TAGS_KEY},
    error::VellumError,
    query::{Binding, DocumentQuery, Inclusions, Row},
};
use chrono::{DateTime, Utc};
use futures_core::future::BoxFuture;
use sqlx::{
    error::BoxDynError,
    migrate::{Migration as SqlxMigration, MigrationSource, MigrationType, Migrator},
    query::Query,
    sqlite::{
        Sqlite, SqliteArguments, SqliteConnectOptions, SqliteConnection, SqliteJournalMode,
        SqlitePoolOptions, SqliteRow, SqliteSynchronous,
    },
    Acquire, Column, ConnectOptions, Pool, QueryBuilder, Row as SqlxRow, ValueRef,
};
use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    fs,
    future::Future,
    path::Path,
    time::Duration,
};

pub const ONLY_PUBLIC_MARKER: &str = "only_public";
pub const SEARCH_INDEX_MARKER: &str = "search_index";

const MAX_CONNECTIONS: u32 = 5;
const BUSY_TIMEOUT: Duration = Duration::from_millis(1500);
const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(30);

/// Rows per multi-row insert. Keeps parameter counts far below SQLITE_LIMIT_VARIABLE_NUMBER.
const INSERT_CHUNK: usize = 500;

const RECORD_SEP: char = '\u{1e}';
const UNIT_SEP: char = '\u{1f}';

/// Outcome of a batch upsert.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteReport {
    pub written: Vec<String>,
    pub failed: Vec<(String, VellumError)>,
}

/// A search hit from the text mirror, before snippet extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct TextMatch {
    pub path: String,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct DbConnection {
    pool: Pool<Sqlite>,
    search: bool,
    write_timeout: Duration,
}

impl DbConnection {
    /// Open (creating if needed) the database described by `config`. If the visibility or
    /// search mode differs from the one recorded by the marker files, the old database is
    /// discarded first.
    pub async fn open(config: &CoreConfig) -> Result<Self, VellumError> {
        let cache_dir = config.cache_dir();
        let rebuilt = reconcile_mode_markers(&cache_dir, config.only_public, config.search_index)?;
        if rebuilt {
            tracing::info!(
                "[DbConnection] mode changed (only_public={}, search_index={}), rebuilding {:?}",
                config.only_public,
                config.search_index,
                config.db_path()
            );
        }
        let mut db = DbConnection::connect(&config.db_path(), config.search_index).await?;
        db.write_timeout = config.write_timeout();
        Ok(db)
    }

    pub async fn connect(db_path: &Path, search: bool) -> Result<Self, VellumError> {
        tracing::debug!("Initializing cache db from file: {:?}", db_path);
        let options = base_options().filename(db_path).create_if_missing(true);
        DbConnection::init(options, MAX_CONNECTIONS, search).await
    }

    /// In-memory databases vanish with their connection, so the pool is held at one.
    pub async fn connect_in_memory(search: bool) -> Result<Self, VellumError> {
        let options = base_options().filename(":memory:");
        DbConnection::init(options, 1, search).await
    }

    async fn init(
        options: SqliteConnectOptions,
        max_connections: u32,
        search: bool,
    ) -> Result<Self, VellumError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .min_connections(if max_connections == 1 { 1 } else { 0 })
            .idle_timeout(if max_connections == 1 {
                None
            } else {
                Some(Duration::from_secs(600))
            })
            .max_lifetime(if max_connections == 1 {
                None
            } else {
                Some(Duration::from_secs(1800))
            })
            // A read cancelled mid-flight must not hand a query_only connection to a writer.
            .after_release(|conn, _meta| {
                Box::pin(async move {
                    sqlx::query("PRAGMA query_only = OFF").execute(&mut *conn).await?;
                    Ok(true)
                })
            })
            .connect_with(options)
            .await?;

        let migrator = Migrator::new(migrations()).await?;
        migrator.run(&pool).await?;
        if search {
            sqlx::query(
                "CREATE VIRTUAL TABLE IF NOT EXISTS documents_fts \
                 USING fts5(path UNINDEXED, title, content)",
            )
            .execute(&pool)
            .await?;
        }

        let db = DbConnection {
            pool,
            search,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        };
        let (documents, links) = db.counts().await?;
        tracing::info!(
            "DB Connection initialized.\n \
             \tCached document count:\t{documents} \n \
             \tCached outlink count:\t{links}"
        );
        Ok(db)
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub fn search_enabled(&self) -> bool {
        self.search
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub async fn close(&self) {
        let _ = sqlx::query("PRAGMA optimize").execute(&self.pool).await;
        self.pool.close().await;
    }

    async fn counts(&self) -> Result<(i64, i64), VellumError> {
        let row = sqlx::query(
            "SELECT (SELECT COUNT(*) FROM documents) AS dcount, \
                    (SELECT COUNT(*) FROM outlinks) AS lcount",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok((row.try_get("dcount")?, row.try_get("lcount")?))
    }

    pub async fn document_count(&self) -> Result<i64, VellumError> {
        Ok(self.counts().await?.0)
    }

    /// `{path: mtime}` for every stored document.
    pub async fn mtimes(&self) -> Result<HashMap<String, i64>, VellumError> {
        let rows = sqlx::query("SELECT path, mtime FROM documents")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| Ok((row.try_get("path")?, row.try_get("mtime")?)))
            .collect()
    }

    /// Point lookup with every child table aggregated plus derived inlinks. Content is not
    /// stored here; see [`DbConnection::content`].
    #[tracing::instrument(skip(self))]
    pub async fn get_document(&self, path: &str) -> Result<Option<Document>, VellumError> {
        let query = DocumentQuery::new()
            .filter("WHERE d.path = ?", vec![Binding::from(path)])
            .include(Inclusions::all());
        let Some(mut doc) = self.get_documents(&query).await?.into_iter().next() else {
            return Ok(None);
        };
        doc.inlinks = self.inlinks(path).await?;
        Ok(Some(doc))
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_documents(&self, query: &DocumentQuery) -> Result<Vec<Document>, VellumError> {
        let sql = query.to_sql();
        let rows = bind_all(sqlx::query(&sql), &query.bindings)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(
                    "[DbConnection.get_documents] SQL error processing '{}'\n\terror: {}",
                    sql,
                    e
                );
                VellumError::Query(format!("{e}"))
            })?;
        rows.iter()
            .map(|row| decode_document(row, &query.include))
            .collect()
    }

    /// Documents linking to `path`. Only served documents are stored, so every source is served.
    pub async fn inlinks(&self, path: &str) -> Result<BTreeSet<String>, VellumError> {
        let rows = sqlx::query("SELECT \"from\" FROM outlinks WHERE \"to\" = ? ORDER BY \"from\"")
            .bind(path)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| row.try_get::<String, _>(0).map_err(VellumError::from))
            .collect()
    }

    pub async fn outlink_rows(&self) -> Result<Vec<(String, String)>, VellumError> {
        self.pairs("SELECT \"from\", \"to\" FROM outlinks").await
    }

    pub async fn attachment_rows(&self) -> Result<Vec<(String, String)>, VellumError> {
        self.pairs("SELECT \"from\", file FROM attachments").await
    }

    async fn pairs(&self, sql: &str) -> Result<Vec<(String, String)>, VellumError> {
        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| Ok((row.try_get(0)?, row.try_get(1)?)))
            .collect()
    }

    /// Number of stored documents referencing `file`.
    pub async fn attachment_refs(&self, file: &str) -> Result<i64, VellumError> {
        let row = sqlx::query("SELECT COUNT(*) FROM attachments WHERE file = ?")
            .bind(file)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get(0)?)
    }

    /// Raw read-only passthrough. Rows come back keyed by column name with SQLite storage
    /// classes mapped onto JSON values; blobs are hex encoded.
    ///
    /// The statement runs on a connection switched to `PRAGMA query_only`, so data-modifying
    /// CTEs and trailing statements fail instead of writing behind the write lock.
    #[tracing::instrument(skip(self))]
    pub async fn get_rows(&self, sql: &str, bindings: &[Binding]) -> Result<Vec<Row>, VellumError> {
        let head = sql.trim_start().to_ascii_uppercase();
        if !(head.starts_with("SELECT") || head.starts_with("WITH")) {
            return Err(VellumError::Query(
                "only SELECT/WITH statements may be run as ad-hoc reads".to_string(),
            ));
        }
        let mut conn = self.pool.acquire().await?;
        sqlx::query("PRAGMA query_only = ON")
            .execute(&mut *conn)
            .await?;
        let fetched = bind_all(sqlx::query(sql), bindings)
            .fetch_all(&mut *conn)
            .await;
        sqlx::query("PRAGMA query_only = OFF")
            .execute(&mut *conn)
            .await?;
        let rows = fetched.map_err(|e| {
            tracing::debug!("[DbConnection.get_rows] rejected '{sql}': {e}");
            VellumError::Query(format!("{e}"))
        })?;
        rows.iter().map(decode_json_row).collect()
    }

    /// Stored body from the text mirror, when the search index is enabled.
    pub async fn content(&self, path: &str) -> Result<Option<String>, VellumError> {
        if !self.search {
            return Ok(None);
        }
        let row = sqlx::query("SELECT content FROM documents_fts WHERE path = ? LIMIT 1")
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;
        Ok(match row {
            Some(row) => Some(row.try_get(0)?),
            None => None,
        })
    }

    /// Documents matching every token, ordered by path.
    pub async fn search(&self, tokens: &[String], limit: u32) -> Result<Vec<TextMatch>, VellumError> {
        if !self.search {
            return Err(VellumError::Disabled("search index".to_string()));
        }
        let expr = tokens
            .iter()
            .filter(|t| !t.trim().is_empty())
            .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
            .collect::<Vec<_>>()
            .join(" ");
        if expr.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            "SELECT path, title, content FROM documents_fts \
             WHERE documents_fts MATCH ? ORDER BY path LIMIT ?",
        )
        .bind(expr)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| VellumError::Query(format!("{e}")))?;
        rows.iter()
            .map(|row| {
                Ok(TextMatch {
                    path: row.try_get("path")?,
                    title: row.try_get("title")?,
                    content: row.try_get("content")?,
                })
            })
            .collect()
    }

    async fn with_deadline<T, F>(&self, work: F) -> Result<T, VellumError>
    where
        F: Future<Output = Result<T, VellumError>>,
    {
        match tokio::time::timeout(self.write_timeout, work).await {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(
                    "[DbConnection] write transaction exceeded {:?}, rolled back",
                    self.write_timeout
                );
                Err(VellumError::Timeout(self.write_timeout))
            }
        }
    }

    /// Replace each document wholesale in one transaction. A document whose rows fail to write
    /// is rolled back to its savepoint, logged and listed in [`WriteReport::failed`].
    #[tracing::instrument(skip_all, fields(count = docs.len()))]
    pub async fn upsert_documents(&self, docs: &[Document]) -> Result<WriteReport, VellumError> {
        if docs.is_empty() {
            return Ok(WriteReport::default());
        }
        self.with_deadline(async {
            let mut tx = self.pool.begin().await?;
            let mut report = WriteReport::default();
            for doc in docs {
                let mut savepoint = Acquire::begin(&mut tx).await?;
                match write_document(&mut *savepoint, doc, self.search).await {
                    Ok(()) => {
                        savepoint.commit().await?;
                        report.written.push(doc.path.clone());
                    }
                    Err(e) => {
                        savepoint.rollback().await?;
                        tracing::warn!("[DbConnection] skipping {}: {}", doc.path, e);
                        report.failed.push((doc.path.clone(), VellumError::from(e)));
                    }
                }
            }
            tx.commit().await?;
            Ok(report)
        })
        .await
    }

    /// Delete documents (children cascade) in one transaction. Returns the number of rows removed.
    #[tracing::instrument(skip_all, fields(count = paths.len()))]
    pub async fn delete_documents(&self, paths: &[String]) -> Result<u64, VellumError> {
        if paths.is_empty() {
            return Ok(0);
        }
        self.with_deadline(async {
            let mut tx = self.pool.begin().await?;
            let mut removed = 0;
            for chunk in paths.chunks(INSERT_CHUNK) {
                removed += delete_in(&mut *tx, "documents", "path", chunk)
                    .await?
                    .rows_affected();
                if self.search {
                    delete_in(&mut *tx, "documents_fts", "path", chunk).await?;
                }
            }
            tx.commit().await?;
            Ok(removed)
        })
        .await
    }
}

fn base_options() -> SqliteConnectOptions {
    SqliteConnectOptions::new()
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(BUSY_TIMEOUT)
        .disable_statement_logging()
}

async fn delete_in(
    conn: &mut SqliteConnection,
    table: &str,
    column: &str,
    keys: &[String],
) -> Result<sqlx::sqlite::SqliteQueryResult, sqlx::Error> {
    let mut qb = QueryBuilder::<Sqlite>::new(format!("DELETE FROM {table} WHERE {column} IN ("));
    let mut separated = qb.separated(", ");
    for key in keys {
        separated.push_bind(key.as_str());
    }
    qb.push(")");
    qb.build().execute(conn).await
}

async fn write_document(
    conn: &mut SqliteConnection,
    doc: &Document,
    search: bool,
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM documents WHERE path = ?")
        .bind(&doc.path)
        .execute(&mut *conn)
        .await?;
    sqlx::query("INSERT INTO documents (path, mtime, date, title, public) VALUES (?, ?, ?, ?, ?)")
        .bind(&doc.path)
        .bind(doc.mtime)
        .bind(doc.date.as_ref().map(format_date))
        .bind(&doc.title)
        .bind(doc.public)
        .execute(&mut *conn)
        .await?;

    let outlinks: Vec<&str> = doc.outlinks.iter().map(String::as_str).collect();
    for chunk in outlinks.chunks(INSERT_CHUNK) {
        let mut qb = QueryBuilder::<Sqlite>::new("INSERT OR IGNORE INTO outlinks (\"from\", \"to\") ");
        qb.push_values(chunk, |mut b, to| {
            b.push_bind(&doc.path).push_bind(*to);
        });
        qb.build().execute(&mut *conn).await?;
    }

    let attachments: Vec<&str> = doc.attachments.iter().map(String::as_str).collect();
    for chunk in attachments.chunks(INSERT_CHUNK) {
        let mut qb = QueryBuilder::<Sqlite>::new("INSERT OR IGNORE INTO attachments (\"from\", file) ");
        qb.push_values(chunk, |mut b, file| {
            b.push_bind(&doc.path).push_bind(*file);
        });
        qb.build().execute(&mut *conn).await?;
    }

    // (key, ord, list, value)
    let mut rows: Vec<(&str, i64, bool, &str)> = doc
        .tags
        .iter()
        .enumerate()
        .map(|(ord, tag)| (TAGS_KEY, ord as i64, true, tag.as_str()))
        .collect();
    for (key, value) in &doc.metadata {
        match value {
            MetaValue::String(text) => rows.push((key.as_str(), 0, false, text.as_str())),
            MetaValue::List(items) if items.is_empty() => rows.push((key.as_str(), -1, true, "")),
            MetaValue::List(items) => rows.extend(
                items
                    .iter()
                    .enumerate()
                    .map(|(ord, item)| (key.as_str(), ord as i64, true, item.as_str())),
            ),
        }
    }
    for chunk in rows.chunks(INSERT_CHUNK) {
        let mut qb = QueryBuilder::<Sqlite>::new(
            "INSERT INTO metadata (\"from\", key, ord, list, value) ",
        );
        qb.push_values(chunk, |mut b, (key, ord, list, value)| {
            b.push_bind(&doc.path)
                .push_bind(*key)
                .push_bind(*ord)
                .push_bind(*list)
                .push_bind(*value);
        });
        qb.build().execute(&mut *conn).await?;
    }

    if search {
        sqlx::query("DELETE FROM documents_fts WHERE path = ?")
            .bind(&doc.path)
            .execute(&mut *conn)
            .await?;
        sqlx::query("INSERT INTO documents_fts (path, title, content) VALUES (?, ?, ?)")
            .bind(&doc.path)
            .bind(&doc.title)
            .bind(&doc.content)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

fn bind_all<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    bindings: &'q [Binding],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for binding in bindings {
        query = match binding {
            Binding::Null => query.bind(None::<String>),
            Binding::Int(i) => query.bind(*i),
            Binding::Real(f) => query.bind(*f),
            Binding::Text(s) => query.bind(s.as_str()),
        };
    }
    query
}

fn split_agg(agg: Option<String>) -> Vec<String> {
    agg.map(|s| {
        s.split(RECORD_SEP)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

fn decode_document(row: &SqliteRow, include: &Inclusions) -> Result<Document, VellumError> {
    let mut doc = Document::new(row.try_get::<String, _>("path")?);
    doc.mtime = row.try_get("mtime")?;
    doc.title = row.try_get("title")?;
    doc.public = row.try_get::<i64, _>("public")? != 0;
    doc.date = row
        .try_get::<Option<String>, _>("date")?
        .map(|raw| parse_stored_date(&raw))
        .transpose()?;
    if include.metadata {
        // key -> (list, [(ord, value)])
        let mut grouped: BTreeMap<String, (bool, Vec<(i64, String)>)> = BTreeMap::new();
        for record in split_agg(row.try_get("metadata_agg")?) {
            let mut fields = record.splitn(4, UNIT_SEP);
            let (Some(key), Some(ord), Some(list), Some(value)) =
                (fields.next(), fields.next(), fields.next(), fields.next())
            else {
                tracing::warn!("[DbConnection] malformed metadata row for {}", doc.path);
                continue;
            };
            let Ok(ord) = ord.parse::<i64>() else {
                continue;
            };
            let entry = grouped
                .entry(key.to_string())
                .or_insert_with(|| (list == "1", Vec::new()));
            if ord >= 0 {
                entry.1.push((ord, value.to_string()));
            }
        }
        for (key, (list, mut items)) in grouped {
            items.sort_by_key(|(ord, _)| *ord);
            let mut values = items.into_iter().map(|(_, value)| value);
            if key == TAGS_KEY {
                doc.tags = values.collect();
            } else if list {
                doc.metadata.insert(key, MetaValue::List(values.collect()));
            } else if let Some(value) = values.next() {
                doc.metadata.insert(key, MetaValue::String(value));
            }
        }
    }
    if include.outlinks {
        doc.outlinks = split_agg(row.try_get("outlinks_agg")?).into_iter().collect();
    }
    if include.attachments {
        doc.attachments = split_agg(row.try_get("attachments_agg")?).into_iter().collect();
    }
    Ok(doc)
}

fn format_date(date: &DateTime<Utc>) -> String {
    date.format("%Y-%m-%dT%H:%M:%S%.9fZ").to_string()
}

fn parse_stored_date(raw: &str) -> Result<DateTime<Utc>, VellumError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|date| date.with_timezone(&Utc))
        .map_err(|e| VellumError::Serialization(format!("stored date '{raw}': {e}")))
}

fn decode_json_row(row: &SqliteRow) -> Result<Row, VellumError> {
    let mut out = Row::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let value = if row.try_get_raw(idx)?.is_null() {
            serde_json::Value::Null
        } else if let Ok(i) = row.try_get::<i64, _>(idx) {
            serde_json::Value::from(i)
        } else if let Ok(f) = row.try_get::<f64, _>(idx) {
            serde_json::Value::from(f)
        } else if let Ok(s) = row.try_get::<String, _>(idx) {
            serde_json::Value::String(s)
        } else {
            serde_json::Value::String(hex::encode(row.try_get::<Vec<u8>, _>(idx)?))
        };
        out.insert(column.name().to_string(), value);
    }
    Ok(out)
}

/// Compare the marker files in `cache_dir` with the requested modes. On any mismatch the database
/// files are deleted and the markers rewritten; returns whether that happened.
pub fn reconcile_mode_markers(
    cache_dir: &Path,
    only_public: bool,
    search: bool,
) -> Result<bool, VellumError> {
    fs::create_dir_all(cache_dir)?;
    let modes = [(ONLY_PUBLIC_MARKER, only_public), (SEARCH_INDEX_MARKER, search)];
    let stale = modes
        .iter()
        .any(|(marker, enabled)| cache_dir.join(marker).exists() != *enabled);
    if !stale {
        return Ok(false);
    }
    for suffix in ["", "-wal", "-shm"] {
        let file = cache_dir.join(format!("{DB_FILE_NAME}{suffix}"));
        match fs::remove_file(&file) {
            Ok(()) => tracing::debug!("[DbConnection] removed {:?}", file),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    for (marker, enabled) in modes {
        let path = cache_dir.join(marker);
        if enabled {
            fs::write(&path, b"")?;
        } else if path.exists() {
            fs::remove_file(&path)?;
        }
    }
    Ok(true)
}

/// A migration definition.
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: i64,
    pub description: &'static str,
    pub sql: &'static str,
}

#[derive(Debug, Clone)]
struct MigrationList(Vec<Migration>);

impl MigrationSource<'static> for MigrationList {
    fn resolve(self) -> BoxFuture<'static, Result<Vec<SqlxMigration>, BoxDynError>> {
        Box::pin(async move {
            Ok(self
                .0
                .into_iter()
                .map(|migration| {
                    SqlxMigration::new(
                        migration.version,
                        migration.description.into(),
                        MigrationType::Simple,
                        migration.sql.into(),
                        false,
                    )
                })
                .collect())
        })
    }
}

fn migrations() -> MigrationList {
    MigrationList(vec![
        Migration {
            version: 1,
            description: "create_document_tables",
            sql: "\
            CREATE TABLE documents (path TEXT PRIMARY KEY, mtime INTEGER NOT NULL, date INTEGER, \
                title TEXT NOT NULL, public INTEGER NOT NULL DEFAULT 0); \
            CREATE INDEX idx_documents_date ON documents(date); \
            CREATE TABLE outlinks (\"from\" TEXT NOT NULL REFERENCES documents(path) ON DELETE CASCADE, \
                \"to\" TEXT NOT NULL, PRIMARY KEY (\"from\", \"to\")) WITHOUT ROWID; \
            CREATE INDEX idx_outlinks_to ON outlinks(\"to\"); \
            CREATE TABLE attachments (\"from\" TEXT NOT NULL REFERENCES documents(path) ON DELETE CASCADE, \
                file TEXT NOT NULL, PRIMARY KEY (\"from\", file)) WITHOUT ROWID; \
            CREATE INDEX idx_attachments_file ON attachments(file); \
            CREATE TABLE metadata (\"from\" TEXT NOT NULL REFERENCES documents(path) ON DELETE CASCADE, \
                key TEXT NOT NULL, value TEXT NOT NULL, PRIMARY KEY (\"from\", key, value)) WITHOUT ROWID; \
            CREATE INDEX idx_metadata_key_value ON metadata(key, value, \"from\");",
        },
        Migration {
            version: 2,
            description: "ordered_metadata_and_text_dates",
            // Rows are rebuilt by the next bulk sync, which finds an empty store.
            sql: "\
            DROP TABLE metadata; \
            DROP TABLE attachments; \
            DROP TABLE outlinks; \
            DROP TABLE documents; \
            CREATE TABLE documents (path TEXT PRIMARY KEY, mtime INTEGER NOT NULL, date TEXT, \
                title TEXT NOT NULL, public INTEGER NOT NULL DEFAULT 0); \
            CREATE INDEX idx_documents_date ON documents(date); \
            CREATE TABLE outlinks (\"from\" TEXT NOT NULL REFERENCES documents(path) ON DELETE CASCADE, \
                \"to\" TEXT NOT NULL, PRIMARY KEY (\"from\", \"to\")) WITHOUT ROWID; \
            CREATE INDEX idx_outlinks_to ON outlinks(\"to\"); \
            CREATE TABLE attachments (\"from\" TEXT NOT NULL REFERENCES documents(path) ON DELETE CASCADE, \
                file TEXT NOT NULL, PRIMARY KEY (\"from\", file)) WITHOUT ROWID; \
            CREATE INDEX idx_attachments_file ON attachments(file); \
            CREATE TABLE metadata (\"from\" TEXT NOT NULL REFERENCES documents(path) ON DELETE CASCADE, \
                key TEXT NOT NULL, ord INTEGER NOT NULL, list INTEGER NOT NULL, value TEXT NOT NULL, \
                PRIMARY KEY (\"from\", key, ord)) WITHOUT ROWID; \
            CREATE INDEX idx_metadata_key_value ON metadata(key, value, \"from\");",
        },
    ])
}
