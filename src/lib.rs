//! # vellum-core
//!
//! The sync, index and cache engine behind a document site: it keeps a SQLite index of a tree of
//! Markdown documents in step with the filesystem and serves reads through bounded caches.
//!
//! ## Overview
//!
//! Three sources of truth are kept in agreement: file mtimes on disk, the persistent store, and
//! in-memory caches. A bulk pass reconciles the whole tree at startup; after that a debounced
//! watcher applies one path at a time, so a single edit never triggers a rebuild.
//!
//! ### Key Features
//!
//! - **Line-oriented extraction**: YAML (`---`) or TOML (`+++`) metadata, inline and embedded
//!   links, attachments, exclusion regions for public-only builds
//! - **Durable index**: documents, outlinks, attachments and metadata in SQLite, with an optional
//!   FTS5 text mirror written in the same transaction
//! - **Idempotent bulk sync**: mtime diffing plus a bounded worker pool for extraction
//! - **Incremental updates**: one path re-read, the link graph mirror patched, cached neighbours
//!   edited in place
//! - **Bounded caches**: an LRU document cache with update-without-promotion, and TTL caches for
//!   raw queries and attachment existence
//! - **Debounced watching**: per-path timers in front of the incremental updater
//!
//! ## Architecture
//!
//! - **[`extract`]**: turns one file into a [`document::Document`]
//! - **[`db`]**: the SQLite store ([`db::DbConnection`])
//! - **[`vault`]**: [`vault::Vault`], owner of the store, caches and link graph, and the read API
//! - **[`sync`]** / **[`update`]**: bulk and single-path write paths on [`vault::Vault`]
//! - **[`cache`]**: [`cache::RecencyCache`] and [`cache::TtlCache`]
//! - **[`graph`]**: in-memory inlink and attachment refcount mirror
//! - **[`watch`]**: [`watch::WatchService`], filesystem notifications through a
//!   [`debounce::Debouncer`]
//! - **[`snippet`]**: highlighted excerpts for search results
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vellum_core::{config::CoreConfig, vault::Vault};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), vellum_core::VellumError> {
//!     let mut config = CoreConfig::new("./site");
//!     config.only_public = true;
//!     let vault = Vault::open(config, None).await?;
//!     let report = vault.sync_all().await?;
//!     println!("{report}");
//!
//!     let doc = vault.get_document("/index.md").await?;
//!     for source in &doc.inlinks {
//!         println!("linked from {source}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **default**: `service`
//! - **service**: filesystem watching ([`watch`], [`debounce`]) via `notify`
//! - **bin**: the `vellum` command line tool

pub mod cache;
pub mod config;
pub mod db;
#[cfg(feature = "service")]
pub mod debounce;
pub mod document;
pub mod error;
pub mod event;
pub mod extract;
pub mod graph;
pub mod paths;
pub mod pool;
pub mod query;
pub mod snippet;
pub mod sync;
pub mod update;
pub mod vault;
#[cfg(feature = "service")]
pub mod watch;

pub use error::*;
