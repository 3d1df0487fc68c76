//! Single-path writes driven by file events.
//!
//! Each operation holds the vault's write lock for its whole duration, commits to the store,
//! and only then patches the link-graph mirror and the caches. Cached neighbours are edited in
//! place (no promotion) so an update never changes which documents are resident.
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{
    error::VellumError,
    event::SyncEvent,
    extract::ExtractMode,
    paths::abs_from_doc_path,
    vault::Vault,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeOutcome {
    /// The document was (re)written to the store.
    Updated,
    /// A stored document was deleted.
    Removed,
    /// The file exists but is not served; any stored row was deleted.
    Hidden,
    /// Nothing stored and nothing to store.
    Unchanged,
}

impl Vault {
    /// Refresh `path` if its file exists, otherwise remove it.
    #[tracing::instrument(skip(self))]
    pub async fn apply_change(&self, path: &str) -> Result<ChangeOutcome, VellumError> {
        if abs_from_doc_path(&self.config.content_root, path).is_file() {
            self.refresh_document(path).await
        } else {
            self.remove_document(path).await
        }
    }

    /// Re-read one document and write it through. A file that vanished mid-read is treated as a
    /// removal.
    #[tracing::instrument(skip(self))]
    pub async fn refresh_document(&self, path: &str) -> Result<ChangeOutcome, VellumError> {
        let _write = self.begin_write().await;
        let extractor = self.extractor.clone();
        let owned = path.to_string();
        let extracted =
            tokio::task::spawn_blocking(move || extractor.extract(&owned, ExtractMode::Full))
                .await?;
        let doc = match extracted {
            Ok(doc) => doc,
            Err(e) if e.is_not_found() => return self.remove_locked(path).await,
            Err(e) => {
                tracing::warn!("[Updater] {e}");
                return Err(e);
            }
        };
        if !self.is_served(&doc) {
            tracing::debug!("[Updater] {path} is not served");
            return match self.remove_locked(path).await? {
                ChangeOutcome::Removed => Ok(ChangeOutcome::Hidden),
                other => Ok(other),
            };
        }

        let report = self
            .db
            .upsert_documents(std::slice::from_ref(&self.persisted_form(&doc)))
            .await?;
        if let Some((_, e)) = report.failed.into_iter().next() {
            return Err(e);
        }

        let (delta, inlinks) = {
            let mut graph = self.graph.write();
            let delta = graph.replace(&doc.path, &doc.outlinks, &doc.attachments);
            (delta, graph.inlinks(&doc.path))
        };
        let mut cached = doc;
        cached.inlinks = inlinks;
        self.documents.update(path, Arc::new(cached));
        self.patch_neighbours(path, &delta);
        tracing::debug!(
            "[Updater] {path} updated: +{} -{} links, {} attachments released",
            delta.linked.len(),
            delta.unlinked.len(),
            delta.released.len()
        );
        self.emit(SyncEvent::DocumentUpdated(path.to_string()));
        Ok(ChangeOutcome::Updated)
    }

    /// Apply changes for every stored document below `dir`, e.g. after the directory was deleted
    /// or renamed away. Returns how many were removed.
    #[tracing::instrument(skip(self))]
    pub async fn remove_tree(&self, dir: &str) -> Result<usize, VellumError> {
        let paths = self.graph.read().documents_under(dir);
        let mut removed = 0;
        for path in paths {
            if self.apply_change(&path).await? == ChangeOutcome::Removed {
                removed += 1;
            }
        }
        Ok(removed)
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_document(&self, path: &str) -> Result<ChangeOutcome, VellumError> {
        let _write = self.begin_write().await;
        self.remove_locked(path).await
    }

    /// Caller holds a [`crate::vault::WriteGuard`].
    async fn remove_locked(&self, path: &str) -> Result<ChangeOutcome, VellumError> {
        let removed = self.db.delete_documents(&[path.to_string()]).await?;
        let delta = self.graph.write().remove(path);
        self.documents.remove(path);
        self.patch_neighbours(path, &delta);
        if removed == 0 {
            return Ok(ChangeOutcome::Unchanged);
        }
        tracing::debug!("[Updater] {path} removed");
        self.emit(SyncEvent::DocumentRemoved(path.to_string()));
        Ok(ChangeOutcome::Removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::CoreConfig, db::DbConnection};
    use std::fs;

    async fn vault(root: &std::path::Path, only_public: bool) -> Vault {
        let mut config = CoreConfig::new(root);
        config.only_public = only_public;
        let db = DbConnection::connect_in_memory(false).await.unwrap();
        Vault::with_db(config, db, None).await.unwrap()
    }

    #[test_log::test(tokio::test)]
    async fn refresh_then_remove() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.md"), "# A\n[b](/b.md)").unwrap();
        let vault = vault(dir.path(), false).await;

        assert_eq!(vault.apply_change("/a.md").await.unwrap(), ChangeOutcome::Updated);
        assert_eq!(vault.inlinks("/b.md").into_iter().collect::<Vec<_>>(), vec!["/a.md"]);
        assert_eq!(vault.get_document("/a.md").await.unwrap().title, "A");

        fs::remove_file(dir.path().join("a.md")).unwrap();
        assert_eq!(vault.apply_change("/a.md").await.unwrap(), ChangeOutcome::Removed);
        assert!(vault.inlinks("/b.md").is_empty());
        assert!(vault.get_document("/a.md").await.unwrap_err().is_not_found());
        assert_eq!(vault.apply_change("/a.md").await.unwrap(), ChangeOutcome::Unchanged);
    }

    #[test_log::test(tokio::test)]
    async fn removing_a_directory_drops_its_documents() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("notes")).unwrap();
        fs::write(dir.path().join("notes/a.md"), "a").unwrap();
        fs::write(dir.path().join("notes/b.md"), "b").unwrap();
        fs::write(dir.path().join("top.md"), "t").unwrap();
        let vault = vault(dir.path(), false).await;
        for path in ["/notes/a.md", "/notes/b.md", "/top.md"] {
            vault.apply_change(path).await.unwrap();
        }
        fs::remove_dir_all(dir.path().join("notes")).unwrap();
        assert_eq!(vault.remove_tree("/notes").await.unwrap(), 2);
        assert_eq!(vault.document_count().await.unwrap(), 1);
    }

    #[test_log::test(tokio::test)]
    async fn private_documents_are_hidden_in_public_mode() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("p.md"), "---\npublic: true\n---\nbody").unwrap();
        let vault = vault(dir.path(), true).await;
        assert_eq!(vault.apply_change("/p.md").await.unwrap(), ChangeOutcome::Updated);

        fs::write(dir.path().join("p.md"), "---\npublic: false\n---\nbody").unwrap();
        assert_eq!(vault.apply_change("/p.md").await.unwrap(), ChangeOutcome::Hidden);
        assert_eq!(vault.document_count().await.unwrap(), 0);
        assert_eq!(vault.apply_change("/p.md").await.unwrap(), ChangeOutcome::Unchanged);
    }

    #[test_log::test(tokio::test)]
    async fn cached_neighbours_are_patched_without_promotion() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.md"), "# A").unwrap();
        fs::write(dir.path().join("b.md"), "# B").unwrap();
        let vault = vault(dir.path(), false).await;
        vault.apply_change("/a.md").await.unwrap();
        vault.apply_change("/b.md").await.unwrap();
        assert!(vault.get_document("/b.md").await.unwrap().inlinks.is_empty());

        fs::write(dir.path().join("a.md"), "# A\n[see b](b.md)").unwrap();
        vault.apply_change("/a.md").await.unwrap();
        let hits = vault.cache_stats().hits;
        let b = vault.get_document("/b.md").await.unwrap();
        assert_eq!(vault.cache_stats().hits, hits + 1);
        assert!(b.inlinks.contains("/a.md"));
    }
}
