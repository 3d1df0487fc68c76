//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

use std::{
    path::{Path, PathBuf},
    time::{Duration, Instant},
};
use tempfile::TempDir;
use vellum_core::{config::CoreConfig, vault::Vault};

/// Initialize tracing for tests, respecting RUST_LOG env var.
///
/// Safe to call multiple times; later calls are no-ops.
#[allow(dead_code)]
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// Write `text` to `rel` under `root`, creating parent directories.
#[allow(dead_code)]
pub fn write_doc(root: &Path, rel: &str, text: &str) -> PathBuf {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, text).unwrap();
    path
}

/// Rewrite a file and push its mtime forward, so second-resolution mtime comparison sees it.
#[allow(dead_code)]
pub fn touch_doc(root: &Path, rel: &str, text: &str, seconds_ahead: i64) {
    let path = write_doc(root, rel, text);
    let now = filetime::FileTime::now();
    let later = filetime::FileTime::from_unix_time(now.unix_seconds() + seconds_ahead, 0);
    filetime::set_file_mtime(path, later).unwrap();
}

/// A small site:
///
/// - `/index.md`: public, links to `/notes/a.md` and embeds `/img/logo.png`
/// - `/notes/a.md`: public, tagged, links back to `/index.md`
/// - `/notes/private.md`: not public, links to `/notes/a.md`
/// - `/static/skip.md` and `/.hidden/skip.md`: never indexed
#[allow(dead_code)]
pub fn create_test_site(temp_dir: &TempDir) -> PathBuf {
    let root = temp_dir.path().join("site");
    write_doc(
        &root,
        "index.md",
        r#"---
title: Home
public: true
date: 2024-03-01
---
# Ignored heading

Start at [note a](notes/a.md "first note").
<img src="/img/logo.png">
"#,
    );
    write_doc(
        &root,
        "notes/a.md",
        r#"+++
public = true
tags = ["rust", "notes"]
author = "sam"
+++
# Note A

Back [home](/index.md).
The quick brown fox jumps over the lazy dog.
"#,
    );
    write_doc(
        &root,
        "notes/private.md",
        "# Private\n\nSee [a](/notes/a.md).\n",
    );
    write_doc(&root, "static/skip.md", "# Static\n");
    write_doc(&root, ".hidden/skip.md", "# Hidden\n");
    root
}

/// Config rooted at `root` with a short debounce.
#[allow(dead_code)]
pub fn test_config(root: &Path) -> CoreConfig {
    let mut config = CoreConfig::new(root);
    config.debounce_ms = 150;
    config.workers = Some(2);
    config
}

#[allow(dead_code)]
pub async fn open_vault(config: CoreConfig) -> Vault {
    Vault::open(config, None).await.unwrap()
}

/// Poll `check` until it returns true or `timeout` passes.
#[allow(dead_code)]
pub fn wait_until<F: FnMut() -> bool>(timeout: Duration, mut check: F) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    check()
}
