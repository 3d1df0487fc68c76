//! [`Vault`] owns the store, the caches and the link-graph mirror for one content root, and is
//! the only entry point readers and writers use.
//!
//! Reads go cache first and fall through to the store. Writes (bulk sync in
//! [`crate::sync`], single-path updates in [`crate::update`]) are serialized by an async write
//! lock, commit to the store first and only then patch the mirror and caches.
//!
//! A write generation counter is odd while a [`WriteGuard`] is alive and even otherwise. A reader
//! samples it before touching the store and only caches what it read when the counter is still
//! the same even value, checked under the cache's own lock. A read that overlaps any part of a
//! write is therefore returned but never cached.
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeSet,
    sync::{
        atomic::{AtomicU64, Ordering},
        mpsc::Sender,
        Arc,
    },
};

use crate::{
    cache::{CacheStats, RecencyCache, TtlCache},
    config::CoreConfig,
    db::DbConnection,
    document::Document,
    error::VellumError,
    event::SyncEvent,
    extract::{ExtractMode, Extractor},
    graph::{LinkDelta, LinkGraph},
    pool::WorkerPool,
    query::{cache_key, Binding, DocumentQuery, Row},
    snippet::match_snippet,
};

/// Words of context in search-result snippets.
pub const SNIPPET_WINDOW: usize = 24;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub path: String,
    pub title: String,
    pub snippet: String,
}

pub struct Vault {
    pub(crate) config: CoreConfig,
    pub(crate) db: DbConnection,
    pub(crate) extractor: Extractor,
    pub(crate) pool: WorkerPool,
    pub(crate) documents: RecencyCache<String, Arc<Document>>,
    pub(crate) queries: Arc<TtlCache<String, Arc<Vec<Row>>>>,
    pub(crate) attachments: Arc<TtlCache<String, ()>>,
    pub(crate) graph: RwLock<LinkGraph>,
    write_lock: tokio::sync::Mutex<()>,
    generation: AtomicU64,
    events: Option<Sender<SyncEvent>>,
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("content_root", &self.config.content_root)
            .field("only_public", &self.config.only_public)
            .field("search_index", &self.config.search_index)
            .finish_non_exhaustive()
    }
}

impl Vault {
    /// Open the store under `config.cache_dir()` and load the link-graph mirror. Must be called
    /// from within a tokio runtime; TTL sweepers are spawned on it.
    pub async fn open(
        config: CoreConfig,
        events: Option<Sender<SyncEvent>>,
    ) -> Result<Self, VellumError> {
        config.validate()?;
        let db = DbConnection::open(&config).await?;
        Vault::with_db(config, db, events).await
    }

    /// Build around an already opened store, e.g. [`DbConnection::connect_in_memory`].
    pub async fn with_db(
        config: CoreConfig,
        db: DbConnection,
        events: Option<Sender<SyncEvent>>,
    ) -> Result<Self, VellumError> {
        let queries = Arc::new(TtlCache::new(config.query_ttl()));
        let attachments = Arc::new(TtlCache::new(config.attachment_ttl()));
        queries.spawn_sweeper(config.sweep_interval());
        attachments.spawn_sweeper(config.sweep_interval());
        let vault = Vault {
            extractor: Extractor::from_config(&config),
            pool: WorkerPool::new(config.workers(), config.queue_capacity),
            documents: RecencyCache::new(config.document_cache_capacity),
            queries,
            attachments,
            graph: RwLock::new(LinkGraph::new()),
            write_lock: tokio::sync::Mutex::new(()),
            generation: AtomicU64::new(0),
            events,
            config,
            db,
        };
        vault.reload_graph().await?;
        Ok(vault)
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn db(&self) -> &DbConnection {
        &self.db
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.documents.stats()
    }

    /// Document by path with content and inlinks. Not-served and missing documents are
    /// [`VellumError::NotFound`].
    #[tracing::instrument(skip(self))]
    pub async fn get_document(&self, path: &str) -> Result<Arc<Document>, VellumError> {
        if let Some(doc) = self.documents.get(path) {
            tracing::trace!("[Vault] document cache hit {path}");
            return Ok(doc);
        }
        let generation = self.generation();
        let Some(mut doc) = self.db.get_document(path).await? else {
            return Err(VellumError::NotFound(path.to_string()));
        };
        doc.content = self.load_content(path).await?;
        let doc = Arc::new(doc);
        if !self
            .documents
            .put_if(path.to_string(), doc.clone(), || self.quiet_since(generation))
        {
            tracing::trace!("[Vault] {path} read during a write, not cached");
        }
        Ok(doc)
    }

    /// Listing without content.
    #[tracing::instrument(skip(self))]
    pub async fn get_documents(&self, query: &DocumentQuery) -> Result<Vec<Document>, VellumError> {
        self.db.get_documents(query).await
    }

    /// Raw read-only query, cached for the configured query TTL by query text and bindings.
    #[tracing::instrument(skip(self))]
    pub async fn get_rows(
        &self,
        sql: &str,
        bindings: &[Binding],
    ) -> Result<Arc<Vec<Row>>, VellumError> {
        let key = cache_key(sql, bindings);
        if let Some(rows) = self.queries.get(&key) {
            tracing::trace!("[Vault] query cache hit {key}");
            return Ok(rows);
        }
        let generation = self.generation();
        let rows = Arc::new(self.db.get_rows(sql, bindings).await?);
        self.queries
            .insert_if(key, rows.clone(), || self.quiet_since(generation));
        Ok(rows)
    }

    /// Body of a served document, from the document cache when present.
    #[tracing::instrument(skip(self))]
    pub async fn get_document_content(&self, path: &str) -> Result<String, VellumError> {
        if let Some(doc) = self.documents.peek(path) {
            return Ok(doc.content.clone());
        }
        if !self.graph.read().contains(path) {
            return Err(VellumError::NotFound(path.to_string()));
        }
        self.load_content(path).await
    }

    async fn load_content(&self, path: &str) -> Result<String, VellumError> {
        if let Some(content) = self.db.content(path).await? {
            return Ok(content);
        }
        let extractor = self.extractor.clone();
        let owned = path.to_string();
        let doc = tokio::task::spawn_blocking(move || {
            extractor.extract(&owned, ExtractMode::ContentOnly)
        })
        .await??;
        Ok(doc.content)
    }

    /// Whether any stored document references `file`. Positive answers are cached for the
    /// attachment TTL and dropped as soon as the last reference goes away.
    #[tracing::instrument(skip(self))]
    pub async fn is_attachment_served(&self, file: &str) -> Result<bool, VellumError> {
        if self.attachments.get(file).is_some() {
            return Ok(true);
        }
        let generation = self.generation();
        let served = self.db.attachment_refs(file).await? > 0;
        if served {
            self.attachments
                .insert_if(file.to_string(), (), || self.quiet_since(generation));
        }
        Ok(served)
    }

    pub fn attachment_refs(&self, file: &str) -> usize {
        self.graph.read().attachment_refs(file)
    }

    pub fn inlinks(&self, path: &str) -> BTreeSet<String> {
        self.graph.read().inlinks(path)
    }

    pub fn outlinks(&self, path: &str) -> BTreeSet<String> {
        self.graph.read().outlinks(path)
    }

    pub async fn document_count(&self) -> Result<i64, VellumError> {
        self.db.document_count().await
    }

    /// Documents containing every whitespace-separated token of `text`, each with a highlighted
    /// snippet. Requires the search index.
    #[tracing::instrument(skip(self))]
    pub async fn search(&self, text: &str, limit: u32) -> Result<Vec<SearchHit>, VellumError> {
        let tokens: Vec<String> = text.split_whitespace().map(str::to_string).collect();
        let matches = self.db.search(&tokens, limit).await?;
        Ok(matches
            .into_iter()
            .map(|m| SearchHit {
                snippet: match_snippet(&m.content, &tokens, SNIPPET_WINDOW),
                path: m.path,
                title: m.title,
            })
            .collect())
    }

    pub(crate) async fn reload_graph(&self) -> Result<(), VellumError> {
        let documents = self.db.mtimes().await?.into_keys();
        let outlinks = self.db.outlink_rows().await?;
        let attachments = self.db.attachment_rows().await?;
        let graph = LinkGraph::from_rows(documents, &outlinks, &attachments);
        tracing::debug!(
            "[Vault] link graph loaded: {} documents, {} outlinks",
            graph.document_count(),
            outlinks.len()
        );
        *self.graph.write() = graph;
        Ok(())
    }

    pub(crate) fn is_served(&self, doc: &Document) -> bool {
        doc.is_served(self.config.only_public)
    }

    /// What gets written to the store: the body is only kept when the text mirror needs it.
    pub(crate) fn persisted_form(&self, doc: &Document) -> Document {
        if self.db.search_enabled() {
            doc.clone()
        } else {
            doc.without_content()
        }
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// True when no write has started or run since `sampled` was read.
    fn quiet_since(&self, sampled: u64) -> bool {
        sampled % 2 == 0 && self.generation() == sampled
    }

    /// Take the write lock and mark a write in progress. Every store write goes through here.
    pub(crate) async fn begin_write(&self) -> WriteGuard<'_> {
        let lock = self.write_lock.lock().await;
        self.generation.fetch_add(1, Ordering::AcqRel);
        WriteGuard { vault: self, _lock: lock }
    }

    /// Bring cached neighbours of `source` in line with a link delta.
    pub(crate) fn patch_neighbours(&self, source: &str, delta: &LinkDelta) {
        for target in &delta.linked {
            self.documents.update_with(target.as_str(), |doc| {
                Arc::make_mut(doc).inlinks.insert(source.to_string());
            });
        }
        for target in &delta.unlinked {
            self.documents.update_with(target.as_str(), |doc| {
                Arc::make_mut(doc).inlinks.remove(source);
            });
        }
        for file in &delta.released {
            self.attachments.remove(file.as_str());
            self.emit(SyncEvent::AttachmentReleased(file.clone()));
        }
    }

    pub(crate) fn emit(&self, event: SyncEvent) {
        if let Some(tx) = &self.events {
            if let Err(e) = tx.send(event) {
                tracing::debug!("[Vault] event receiver gone, dropping {}", e.0);
            }
        }
    }
}

/// Exclusive write access to a [`Vault`]. Dropping it clears the query cache and ends the write
/// before the lock is released.
pub(crate) struct WriteGuard<'a> {
    vault: &'a Vault,
    _lock: tokio::sync::MutexGuard<'a, ()>,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.vault.queries.clear();
        self.vault.generation.fetch_add(1, Ordering::AcqRel);
    }
}
