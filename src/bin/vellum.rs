//! vellum CLI tool
//!
//! ## Commands
//!
//! - `sync <root>`: one bulk synchronization, then print the report
//! - `watch <root>`: synchronize, then keep the index current until Ctrl-C

use clap::{Args, Parser, Subcommand};
use std::{path::PathBuf, sync::mpsc::channel, time::Duration};
use vellum_core::{config::CoreConfig, event::SyncEvent, vault::Vault, watch::WatchService};

#[derive(Parser)]
#[command(name = "vellum")]
#[command(author, version, about = "Keep a document index in sync with a content tree", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct CommonArgs {
    /// Content root to index
    root: PathBuf,

    /// Configuration file path (TOML); the positional root overrides its content_root
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Only index documents marked `public: true`
    #[arg(long)]
    only_public: bool,

    /// Maintain the full-text search index
    #[arg(long)]
    search: bool,
}

impl CommonArgs {
    fn into_config(self) -> Result<CoreConfig, vellum_core::VellumError> {
        let mut config = match &self.config {
            Some(path) => CoreConfig::load(path)?,
            None => CoreConfig::default(),
        };
        config.content_root = self.root;
        config.only_public |= self.only_public;
        config.search_index |= self.search;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Synchronize the index with the content tree once
    Sync(CommonArgs),

    /// Synchronize, then watch for changes
    Watch(CommonArgs),
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Sync(args) => {
            let config = args.into_config()?;
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(async {
                let vault = Vault::open(config, None).await?;
                let report = vault.sync_all().await?;
                println!("{report}");
                println!("{} documents indexed", vault.document_count().await?);
                vault.db().close().await;
                Ok::<(), vellum_core::VellumError>(())
            })?;
            Ok(())
        }

        Commands::Watch(args) => {
            let config = args.into_config()?;
            let root = config.content_root.clone();

            let (tx, rx) = channel::<SyncEvent>();
            let event_handle = std::thread::spawn(move || {
                for event in rx {
                    println!("[Event] {event}");
                }
            });

            let service = WatchService::new(config, Some(tx))?;
            println!(
                "Watching {} ({} directories). Press Ctrl-C to stop.",
                root.display(),
                service.watched_dirs()
            );

            let running = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(true));
            let r = running.clone();
            ctrlc::set_handler(move || {
                println!("\nShutting down...");
                r.store(false, std::sync::atomic::Ordering::SeqCst);
            })?;

            while running.load(std::sync::atomic::Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(100));
            }

            let vault = service.vault();
            service.block_on(vault.db().close());
            drop(vault);
            drop(service);
            drop(event_handle);
            println!("Shutdown complete");
            Ok(())
        }
    }
}
