use serde::{Deserialize, Serialize};
use std::{
    collections::{HashMap, HashSet},
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};
use walkdir::{DirEntry, WalkDir};

use crate::{
    config::CoreConfig,
    document::Document,
    error::VellumError,
    event::SyncEvent,
    extract::{mtime_secs, ExtractMode},
    paths::{doc_path_from_abs, has_extension, is_hidden},
    vault::Vault,
};

/// Counts from one bulk synchronization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Document files found under the content root.
    pub scanned: usize,
    /// Found files whose stored mtime matched, so they were not read.
    pub unchanged: usize,
    pub upserted: usize,
    pub removed: usize,
    /// Files read but not served (private in public-only mode).
    pub hidden: usize,
    pub failed: usize,
    pub elapsed_ms: u64,
}

impl SyncReport {
    pub fn writes(&self) -> usize {
        self.upserted + self.removed
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "scanned {}, unchanged {}, upserted {}, removed {}, hidden {}, failed {} in {}ms",
            self.scanned,
            self.unchanged,
            self.upserted,
            self.removed,
            self.hidden,
            self.failed,
            self.elapsed_ms
        )
    }
}

/// True for paths the engine never indexes or watches: dot-entries below the content root, the
/// root-level static directory and the cache directory.
pub fn is_ignored(config: &CoreConfig, abs: &Path) -> bool {
    if !abs.starts_with(&config.content_root) || is_hidden(&config.content_root, abs) {
        return true;
    }
    abs.starts_with(config.static_root()) || abs.starts_with(config.cache_dir())
}

/// Document files under the content root, skipping ignored trees and the template directory.
struct TreeWalker {
    root: PathBuf,
    template_root: PathBuf,
    extension: String,
    config: CoreConfig,
}

impl TreeWalker {
    fn new(config: &CoreConfig) -> Self {
        TreeWalker {
            root: config.content_root.clone(),
            template_root: config.template_root(),
            extension: config.document_extension.clone(),
            config: config.clone(),
        }
    }

    fn skip(&self, entry: &DirEntry) -> bool {
        entry.depth() > 0
            && (is_ignored(&self.config, entry.path()) || entry.path() == self.template_root)
    }

    /// `(doc_path, mtime)` for every document file.
    fn scan(&self) -> Result<Vec<(String, i64)>, VellumError> {
        if !self.root.is_dir() {
            return Err(VellumError::NotFound(format!(
                "content root {}",
                self.root.display()
            )));
        }
        let mut found = Vec::new();
        for entry in WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| !self.skip(e))
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("[BulkSync] unreadable entry: {e}");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(doc_path) = doc_path_from_abs(&self.root, entry.path()) else {
                continue;
            };
            if !has_extension(&doc_path, &self.extension) {
                continue;
            }
            match entry.metadata() {
                Ok(meta) => found.push((doc_path, mtime_secs(&meta))),
                Err(e) => tracing::warn!("[BulkSync] cannot stat {doc_path}: {e}"),
            }
        }
        found.sort();
        Ok(found)
    }
}

enum Extracted {
    Served(Document),
    Hidden(String),
    Failed,
}

impl Vault {
    /// Reconcile the store with the content root: read new and modified files (by mtime), drop
    /// rows for files that vanished or stopped being served, then reload the link-graph mirror.
    /// Running it twice over an unchanged tree writes nothing the second time.
    ///
    /// Cached documents that were rewritten are replaced in place and removed ones are dropped;
    /// neither changes the recency order.
    #[tracing::instrument(skip(self))]
    pub async fn sync_all(&self) -> Result<SyncReport, VellumError> {
        let _write = self.begin_write().await;
        let started = Instant::now();

        let mut stored = self.db.mtimes().await?;
        let known: HashSet<String> = stored.keys().cloned().collect();
        let walker = TreeWalker::new(&self.config);
        let found = tokio::task::spawn_blocking(move || walker.scan()).await??;

        let mut report = SyncReport {
            scanned: found.len(),
            ..SyncReport::default()
        };
        let mut changed = Vec::new();
        for (path, mtime) in found {
            match stored.remove(&path) {
                Some(prev) if prev == mtime => report.unchanged += 1,
                _ => changed.push(path),
            }
        }
        let mut vanished: Vec<String> = stored.into_keys().collect();
        vanished.sort();
        if !vanished.is_empty() {
            tracing::debug!("[BulkSync] {} documents vanished", vanished.len());
            report.removed += self.db.delete_documents(&vanished).await? as usize;
        }

        tracing::debug!(
            "[BulkSync] extracting {} documents on {} workers",
            changed.len(),
            self.pool.workers()
        );
        let extractor = self.extractor.clone();
        let only_public = self.config.only_public;
        let outcomes = self
            .pool
            .map(changed, move |path: String| {
                Some(match extractor.extract(&path, ExtractMode::Full) {
                    Ok(doc) if doc.is_served(only_public) => Extracted::Served(doc),
                    Ok(doc) => Extracted::Hidden(doc.path),
                    Err(e) => {
                        tracing::warn!("[BulkSync] {e}");
                        Extracted::Failed
                    }
                })
            })
            .await;

        if outcomes.panicked > 0 {
            tracing::warn!("[BulkSync] {} extractions panicked", outcomes.panicked);
            report.failed += outcomes.panicked;
        }
        let mut served = Vec::new();
        let mut hidden = Vec::new();
        for outcome in outcomes.results {
            match outcome {
                Extracted::Served(doc) => served.push(doc),
                Extracted::Hidden(path) => {
                    report.hidden += 1;
                    if known.contains(&path) {
                        hidden.push(path);
                    }
                }
                Extracted::Failed => report.failed += 1,
            }
        }
        if !hidden.is_empty() {
            hidden.sort();
            report.removed += self.db.delete_documents(&hidden).await? as usize;
        }
        served.sort_by(|a, b| a.path.cmp(&b.path));
        let upserts: Vec<Document> = served.iter().map(|doc| self.persisted_form(doc)).collect();
        let written = self.db.upsert_documents(&upserts).await?;
        report.upserted = written.written.len();
        report.failed += written.failed.len();

        self.reload_graph().await?;
        if report.writes() > 0 {
            for path in vanished.iter().chain(&hidden) {
                self.documents.remove(path.as_str());
            }
            let committed: HashSet<&str> = written.written.iter().map(String::as_str).collect();
            let fresh = served
                .into_iter()
                .filter(|doc| committed.contains(doc.path.as_str()))
                .map(|doc| (doc.path.clone(), doc))
                .collect();
            self.refresh_cached(fresh);
            self.attachments.clear();
        }
        report.elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::info!("[BulkSync] {report}");
        self.emit(SyncEvent::SyncCompleted(report.clone()));
        Ok(report)
    }

    /// Swap rewritten documents into the document cache and bring every other resident entry's
    /// inlinks in line with the reloaded graph.
    fn refresh_cached(&self, mut fresh: HashMap<String, Document>) {
        let graph = self.graph.read();
        let mut replaced = 0;
        self.documents.update_each(|path, cached| {
            let inlinks = graph.inlinks(path);
            if let Some(mut doc) = fresh.remove(path) {
                doc.inlinks = inlinks;
                *cached = Arc::new(doc);
                replaced += 1;
            } else if cached.inlinks != inlinks {
                Arc::make_mut(cached).inlinks = inlinks;
            }
        });
        tracing::debug!("[BulkSync] refreshed {replaced} cached documents");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbConnection;
    use std::{collections::BTreeSet, fs};

    fn config(root: &Path) -> CoreConfig {
        CoreConfig::new(root)
    }

    #[test]
    fn walker_skips_hidden_static_template_and_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for sub in [".git", "static", "templates", "notes", "notes/static"] {
            fs::create_dir_all(root.join(sub)).unwrap();
        }
        for file in [
            "a.md",
            "notes/b.md",
            "notes/static/c.md",
            "notes/.draft.md",
            "notes/readme.txt",
            ".git/x.md",
            "static/d.md",
            "templates/page.md",
        ] {
            fs::write(root.join(file), "x").unwrap();
        }
        let found: Vec<String> = TreeWalker::new(&config(root))
            .scan()
            .unwrap()
            .into_iter()
            .map(|(path, _)| path)
            .collect();
        assert_eq!(found, vec!["/a.md", "/notes/b.md", "/notes/static/c.md"]);
    }

    #[test]
    fn missing_root_is_an_error_not_an_empty_tree() {
        let dir = tempfile::tempdir().unwrap();
        let walker = TreeWalker::new(&config(&dir.path().join("gone")));
        assert!(walker.scan().unwrap_err().is_not_found());
    }

    #[test]
    fn ignored_paths() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        assert!(is_ignored(&config, &dir.path().join(".vellum/vellum.db")));
        assert!(is_ignored(&config, &dir.path().join("static/logo.png")));
        assert!(is_ignored(&config, Path::new("/elsewhere/a.md")));
        assert!(!is_ignored(&config, &dir.path().join("templates/page.html")));
        assert!(!is_ignored(&config, &dir.path().join("notes/a.md")));
    }

    #[test_log::test(tokio::test)]
    async fn sync_refreshes_cached_documents_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("a.md"), "# A").unwrap();
        fs::write(root.join("b.md"), "# B").unwrap();
        let mut config = config(root);
        config.document_cache_capacity = 2;
        let db = DbConnection::connect_in_memory(false).await.unwrap();
        let vault = Vault::with_db(config, db, None).await.unwrap();
        vault.sync_all().await.unwrap();
        vault.get_document("/a.md").await.unwrap();
        vault.get_document("/b.md").await.unwrap();

        fs::write(root.join("a.md"), "# A2").unwrap();
        let later =
            filetime::FileTime::from_unix_time(filetime::FileTime::now().unix_seconds() + 5, 0);
        filetime::set_file_mtime(root.join("a.md"), later).unwrap();
        fs::write(root.join("c.md"), "# C\n[b](b.md)").unwrap();
        let report = vault.sync_all().await.unwrap();
        assert_eq!(report.upserted, 2);

        let a = vault.documents.peek("/a.md").expect("a stays cached");
        assert_eq!(a.title, "A2");
        assert_eq!(a.content, "# A2");
        let b = vault.documents.peek("/b.md").expect("b stays cached");
        assert_eq!(b.inlinks, BTreeSet::from(["/c.md".to_string()]));

        // "a" was refreshed without promotion, so it is still the first to go.
        vault.get_document("/c.md").await.unwrap();
        assert!(!vault.documents.contains("/a.md"));
        assert!(vault.documents.contains("/b.md"));

        fs::remove_file(root.join("b.md")).unwrap();
        assert_eq!(vault.sync_all().await.unwrap().removed, 1);
        assert!(!vault.documents.contains("/b.md"));
        assert!(vault.documents.contains("/c.md"));
    }

    #[test]
    fn report_display() {
        let report = SyncReport {
            scanned: 3,
            upserted: 2,
            removed: 1,
            ..SyncReport::default()
        };
        assert_eq!(report.writes(), 3);
        assert_eq!(
            report.to_string(),
            "scanned 3, unchanged 0, upserted 2, removed 1, hidden 0, failed 0 in 0ms"
        );
    }
}
