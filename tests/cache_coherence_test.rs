//! Cache behaviour across incremental updates: no stale documents, neighbours patched in place,
//! query results invalidated on write.

mod common;

use common::{init_logging, open_vault, test_config, write_doc};
use std::sync::{mpsc::channel, Arc};
use tempfile::TempDir;
use vellum_core::{
    event::SyncEvent,
    query::Binding,
    update::ChangeOutcome,
    vault::Vault,
};

#[tokio::test]
async fn deleted_documents_are_not_served_from_cache() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let root = temp.path().to_path_buf();
    write_doc(&root, "p.md", "# P\n");
    let vault = open_vault(test_config(&root)).await;
    vault.sync_all().await.unwrap();

    let cached = vault.get_document("/p.md").await.unwrap();
    assert_eq!(cached.title, "P");

    std::fs::remove_file(root.join("p.md")).unwrap();
    assert_eq!(
        vault.apply_change("/p.md").await.unwrap(),
        ChangeOutcome::Removed
    );
    assert!(vault.get_document("/p.md").await.unwrap_err().is_not_found());
    assert!(vault
        .get_document_content("/p.md")
        .await
        .unwrap_err()
        .is_not_found());
}

#[tokio::test]
async fn updates_refresh_cached_entries_without_reordering() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let root = temp.path().to_path_buf();
    write_doc(&root, "a.md", "# A\n");
    write_doc(&root, "b.md", "# B\n");
    let mut config = test_config(&root);
    config.document_cache_capacity = 2;
    let vault = open_vault(config).await;
    vault.sync_all().await.unwrap();

    // Cache order, least recent first: a, b.
    vault.get_document("/a.md").await.unwrap();
    vault.get_document("/b.md").await.unwrap();

    write_doc(&root, "a.md", "# A2\n[b](/b.md)\n");
    vault.apply_change("/a.md").await.unwrap();
    assert_eq!(
        vault.get_document("/b.md").await.unwrap().inlinks.len(),
        1,
        "cached target picks up the new inlink"
    );

    // Loading a third document evicts `a`, which the update above did not promote.
    write_doc(&root, "c.md", "# C\n");
    vault.apply_change("/c.md").await.unwrap();
    vault.get_document("/c.md").await.unwrap();
    let misses = vault.cache_stats().misses;
    let a = vault.get_document("/a.md").await.unwrap();
    assert_eq!(a.title, "A2");
    assert_eq!(vault.cache_stats().misses, misses + 1);
}

#[tokio::test]
async fn removing_a_source_unlinks_cached_targets() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let root = temp.path().to_path_buf();
    write_doc(&root, "src.md", "[t](/target.md)\n");
    write_doc(&root, "target.md", "# Target\n");
    let vault = open_vault(test_config(&root)).await;
    vault.sync_all().await.unwrap();
    assert!(vault
        .get_document("/target.md")
        .await
        .unwrap()
        .inlinks
        .contains("/src.md"));

    std::fs::remove_file(root.join("src.md")).unwrap();
    vault.apply_change("/src.md").await.unwrap();
    assert!(vault
        .get_document("/target.md")
        .await
        .unwrap()
        .inlinks
        .is_empty());
}

#[tokio::test]
async fn query_cache_is_dropped_on_write() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let root = temp.path().to_path_buf();
    write_doc(&root, "a.md", "# A\n");
    let vault = open_vault(test_config(&root)).await;
    vault.sync_all().await.unwrap();

    let sql = "SELECT title FROM documents WHERE path = ?";
    let bindings = [Binding::from("/a.md")];
    let first = vault.get_rows(sql, &bindings).await.unwrap();
    let again = vault.get_rows(sql, &bindings).await.unwrap();
    assert!(Arc::ptr_eq(&first, &again));
    assert_eq!(first[0]["title"], serde_json::json!("A"));

    write_doc(&root, "a.md", "# Changed\n");
    vault.apply_change("/a.md").await.unwrap();
    let fresh = vault.get_rows(sql, &bindings).await.unwrap();
    assert_eq!(fresh[0]["title"], serde_json::json!("Changed"));

    assert!(vault
        .get_rows("DELETE FROM documents", &[])
        .await
        .is_err());
}

#[tokio::test]
async fn writes_publish_events() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let root = temp.path().to_path_buf();
    write_doc(&root, "a.md", "![x](/x.png)\n");
    let (tx, rx) = channel();
    let vault = Vault::open(test_config(&root), Some(tx)).await.unwrap();

    vault.sync_all().await.unwrap();
    std::fs::remove_file(root.join("a.md")).unwrap();
    vault.apply_change("/a.md").await.unwrap();

    let events: Vec<SyncEvent> = rx.try_iter().collect();
    assert!(matches!(&events[0], SyncEvent::SyncCompleted(report) if report.upserted == 1));
    assert_eq!(
        events[1..].to_vec(),
        vec![
            SyncEvent::AttachmentReleased("/x.png".to_string()),
            SyncEvent::DocumentRemoved("/a.md".to_string()),
        ]
    );
}
