//! # Watch Service
//!
//! [`WatchService`] keeps a [`Vault`] current while files change: it opens the store, runs the
//! initial bulk sync, then feeds filesystem notifications through a per-path [`Debouncer`] into
//! the incremental updater.
//!
//! ## Threading Model
//!
//! - The service owns a multi-threaded tokio runtime. Synchronous callers use
//!   [`WatchService::block_on`] to reach the async [`Vault`] API.
//! - `notify` delivers events on its own thread. The callback only forwards them into an
//!   unbounded channel.
//! - A dispatcher task drains the channel. Directory creates are registered with the watcher
//!   right there, before any timer, so files written into a fresh directory are not missed.
//! - Every other path is scheduled on the debouncer. When its timer fires the job runs as its own
//!   task; writes are serialized by the vault's write lock.
//!
//! Watches are per directory and non-recursive so hidden entries, the static tree and the cache
//! directory (which the store itself writes into) never produce events.
//!
//! ## Shutdown
//!
//! Dropping the service cancels pending timers, stops the watcher and shuts the runtime down.
//!
//! ```rust,no_run
//! use vellum_core::{config::CoreConfig, watch::WatchService, event::SyncEvent};
//! use std::sync::mpsc::channel;
//!
//! let (tx, rx) = channel::<SyncEvent>();
//! let service = WatchService::new(CoreConfig::new("/path/to/site"), Some(tx))?;
//! let vault = service.vault();
//! let doc = service.block_on(vault.get_document("/index.md"))?;
//! println!("{} links in", doc.inlinks.len());
//! for event in rx {
//!     println!("{event}");
//! }
//! # Ok::<(), vellum_core::VellumError>(())
//! ```
use notify::{
    event::ModifyKind, recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode,
    Watcher,
};
use parking_lot::Mutex;
use std::{
    collections::HashSet,
    future::Future,
    path::{Path, PathBuf},
    sync::{mpsc::Sender, Arc},
};
use tokio::{runtime::Runtime, sync::mpsc::unbounded_channel, task::JoinHandle};
use walkdir::WalkDir;

use crate::{
    config::CoreConfig,
    debounce::Debouncer,
    error::VellumError,
    event::SyncEvent,
    paths::{doc_path_from_abs, has_extension},
    sync::is_ignored,
    vault::Vault,
};

/// Debounce keys: one timer per document, template file or removed directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Job {
    Document(String),
    Template(PathBuf),
    Tree(String),
}

struct Dispatcher {
    vault: Arc<Vault>,
    config: CoreConfig,
    watcher: Mutex<Option<RecommendedWatcher>>,
    watched: Mutex<HashSet<PathBuf>>,
    debouncer: Debouncer<Job>,
}

impl Dispatcher {
    /// Watch every non-ignored directory under `dir` that is not watched yet. Returns the
    /// document paths found on the way, for directories that appeared after the initial sync.
    fn watch_tree(&self, dir: &Path) -> Vec<String> {
        let root = &self.config.content_root;
        let template_root = self.config.template_root();
        let mut docs = Vec::new();
        let walker = WalkDir::new(dir)
            .into_iter()
            .filter_entry(|e| !is_ignored(&self.config, e.path()));
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("[Watch] {e}");
                    continue;
                }
            };
            if entry.file_type().is_dir() {
                let path = entry.path().to_path_buf();
                if !self.watched.lock().insert(path.clone()) {
                    continue;
                }
                let result = match self.watcher.lock().as_mut() {
                    Some(watcher) => watcher.watch(&path, RecursiveMode::NonRecursive),
                    None => return docs,
                };
                match result {
                    Ok(()) => tracing::debug!("[Watch] watching {path:?}"),
                    Err(e) => {
                        tracing::warn!("[Watch] cannot watch {path:?}: {}", VellumError::from(e));
                        self.watched.lock().remove(&path);
                    }
                }
            } else if entry.file_type().is_file() && !entry.path().starts_with(&template_root) {
                if let Some(doc_path) = doc_path_from_abs(root, entry.path()) {
                    if has_extension(&doc_path, &self.config.document_extension) {
                        docs.push(doc_path);
                    }
                }
            }
        }
        docs
    }

    /// Forget watches at or below a directory that no longer exists.
    fn forget_tree(&self, dir: &Path) {
        let mut watched = self.watched.lock();
        let gone: Vec<PathBuf> = watched.iter().filter(|p| p.starts_with(dir)).cloned().collect();
        for path in gone {
            watched.remove(&path);
            if let Some(watcher) = self.watcher.lock().as_mut() {
                // The OS usually drops the watch with the directory already.
                let _ = watcher.unwatch(&path);
            }
        }
    }

    fn handle(self: &Arc<Self>, event: Event) {
        if matches!(event.kind, EventKind::Access(_)) {
            return;
        }
        let structural = matches!(
            event.kind,
            EventKind::Any
                | EventKind::Create(_)
                | EventKind::Remove(_)
                | EventKind::Modify(ModifyKind::Name(_))
        );
        let root = &self.config.content_root;
        let template_root = self.config.template_root();
        for path in event.paths {
            if is_ignored(&self.config, &path) {
                continue;
            }
            if path.is_dir() {
                if structural {
                    for doc_path in self.watch_tree(&path) {
                        self.schedule(Job::Document(doc_path));
                    }
                    if path.starts_with(&template_root) {
                        self.schedule(Job::Template(path));
                    }
                }
                continue;
            }
            if path.starts_with(&template_root) {
                self.schedule(Job::Template(path));
                continue;
            }
            let Some(doc_path) = doc_path_from_abs(root, &path) else {
                continue;
            };
            if has_extension(&doc_path, &self.config.document_extension) {
                self.schedule(Job::Document(doc_path));
            } else if structural && !path.exists() {
                self.forget_tree(&path);
                self.schedule(Job::Tree(doc_path));
            }
        }
    }

    fn schedule(self: &Arc<Self>, job: Job) {
        tracing::trace!("[Watch] scheduling {job:?}");
        let vault = self.vault.clone();
        self.debouncer.schedule(job.clone(), move || async move {
            match job {
                Job::Document(path) => match vault.apply_change(&path).await {
                    Ok(outcome) => tracing::debug!("[Watch] {path}: {outcome:?}"),
                    Err(e) => tracing::warn!("[Watch] {path}: {e}"),
                },
                Job::Template(path) => {
                    tracing::info!("[Watch] template changed: {path:?}");
                    vault.emit(SyncEvent::TemplateChanged(path));
                }
                Job::Tree(dir) => match vault.remove_tree(&dir).await {
                    Ok(removed) => tracing::debug!("[Watch] {dir}: {removed} documents removed"),
                    Err(e) => tracing::warn!("[Watch] {dir}: {e}"),
                },
            }
        });
    }
}

pub struct WatchService {
    dispatcher: Arc<Dispatcher>,
    dispatch_task: JoinHandle<()>,
    runtime: Runtime,
}

impl WatchService {
    /// Open the vault for `config`, start watching, then run the initial bulk sync. Events
    /// that arrive during the sync are applied after it through the usual debounce path.
    pub fn new(
        config: CoreConfig,
        events: Option<Sender<SyncEvent>>,
    ) -> Result<Self, VellumError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .enable_all()
            .build()?;
        let vault = Arc::new(runtime.block_on(Vault::open(config.clone(), events))?);

        let (tx, mut rx) = unbounded_channel::<notify::Result<Event>>();
        let watcher = recommended_watcher(move |result: notify::Result<Event>| {
            if tx.send(result).is_err() {
                tracing::trace!("[Watch] dispatcher gone, dropping event");
            }
        })?;
        let dispatcher = Arc::new(Dispatcher {
            debouncer: Debouncer::new(runtime.handle().clone(), config.debounce()),
            watcher: Mutex::new(Some(watcher)),
            watched: Mutex::new(HashSet::new()),
            vault: vault.clone(),
            config,
        });
        dispatcher.watch_tree(&dispatcher.config.content_root);
        tracing::info!(
            "[Watch] watching {} directories under {:?}",
            dispatcher.watched.lock().len(),
            dispatcher.config.content_root
        );

        let task_dispatcher = dispatcher.clone();
        let dispatch_task = runtime.spawn(async move {
            while let Some(result) = rx.recv().await {
                match result {
                    Ok(event) => task_dispatcher.handle(event),
                    Err(e) => tracing::error!("[Watch] {}", VellumError::from(e)),
                }
            }
        });

        runtime.block_on(vault.sync_all())?;
        Ok(WatchService {
            dispatcher,
            dispatch_task,
            runtime,
        })
    }

    pub fn vault(&self) -> Arc<Vault> {
        self.dispatcher.vault.clone()
    }

    /// Run a future on the service's runtime. Must not be called from async code.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    pub fn watched_dirs(&self) -> usize {
        self.dispatcher.watched.lock().len()
    }

    /// Paths waiting on a debounce timer.
    pub fn pending(&self) -> usize {
        self.dispatcher.debouncer.pending()
    }
}

impl Drop for WatchService {
    fn drop(&mut self) {
        tracing::debug!("[Watch] shutting down");
        self.dispatcher.debouncer.cancel_all();
        self.dispatcher.watcher.lock().take();
        self.dispatch_task.abort();
    }
}
