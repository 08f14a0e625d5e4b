//! shellcache - command-line driver for the offline app-shell cache.
//!
//! Each invocation plays the host for one event: it builds a worker over
//! the on-disk cache storage and the real network, delivers the event and
//! prints what the worker did.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use shellcache_core::worker::push::build_notification;
use shellcache_core::worker::ClickRoute;
use shellcache_core::{
    CacheStorage, ChannelHost, DiskCacheStorage, HostCommand, HttpFetcher, Request, ServiceWorker,
    WorkerConfig, WorkerContext, WorkerState,
};

#[derive(Parser)]
#[command(name = "shellcache", version, about = "Offline cache manager for a single-page app shell")]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(long, env = "SHELLCACHE_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Directory holding the cache storage
    #[arg(long, env = "SHELLCACHE_CACHE_DIR", global = true)]
    cache_dir: Option<PathBuf>,

    /// Origin relative locators resolve against, overriding the config
    #[arg(long, env = "SHELLCACHE_SCOPE", global = true)]
    scope: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Precache the manifest and activate the current version
    Install,
    /// Request a resource through the cache
    Fetch {
        /// Absolute URL or scope-relative path
        locator: String,
        /// Treat the request as a page navigation
        #[arg(long)]
        document: bool,
    },
    /// Re-fetch every cached entry
    Refresh,
    /// Run the background sync handler
    Sync,
    /// List caches and their entries
    Caches,
    /// Print the current cache identifier
    Version,
    /// Deliver a push message with a JSON payload
    Push {
        payload: Option<String>,
    },
    /// Click the default notification
    Click {
        #[arg(long)]
        action: Option<String>,
    },
}

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

struct Session {
    config: WorkerConfig,
    storage: Arc<DiskCacheStorage>,
    ctx: WorkerContext,
    commands: mpsc::Receiver<HostCommand>,
}

impl Session {
    fn open(cli: &Cli) -> Result<Self> {
        let mut config = match cli.config {
            Some(ref path) => WorkerConfig::load_from(path)?,
            None => WorkerConfig::load()?,
        };
        if let Some(ref scope) = cli.scope {
            config.scope = scope.clone();
            config.validate()?;
        }

        let cache_dir = match cli.cache_dir {
            Some(ref dir) => dir.clone(),
            None => WorkerConfig::cache_dir()?,
        };
        let storage = Arc::new(
            DiskCacheStorage::new(cache_dir.clone())
                .with_context(|| format!("Failed to open cache storage at {}", cache_dir.display()))?,
        );
        let network = HttpFetcher::new(
            config.scope_url()?,
            Duration::from_secs(config.request_timeout_secs),
        )?;
        let (host, commands) = ChannelHost::new();
        let ctx = WorkerContext::new(
            config.clone(),
            storage.clone(),
            Arc::new(network),
            Arc::new(host),
        );

        Ok(Self {
            config,
            storage,
            ctx,
            commands,
        })
    }

    /// Worker for a version that was installed by an earlier run.
    async fn installed_worker(&self) -> Result<ServiceWorker> {
        let worker = ServiceWorker::restore(self.ctx.clone()).await?;
        if worker.state() != WorkerState::Activated {
            anyhow::bail!(
                "{} is not installed; run `shellcache install` first",
                self.config.cache_name()
            );
        }
        Ok(worker)
    }

    /// Print what the worker asked the host to do.
    fn report_host_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            let line = match command {
                HostCommand::SkipWaiting => "skip waiting".to_string(),
                HostCommand::ClaimClients => "claim clients".to_string(),
                HostCommand::PostMessage(message) => format!(
                    "post message {}",
                    serde_json::to_string(&message).unwrap_or_default()
                ),
                HostCommand::ShowNotification(n) => format!("show notification {:?}", n.title),
                HostCommand::CloseNotification(n) => format!("close notification {:?}", n.title),
                HostCommand::OpenWindow(url) => format!("open window {}", url),
            };
            eprintln!("host: {}", line);
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut session = Session::open(&cli)?;

    match cli.command {
        Command::Install => {
            let worker = ServiceWorker::new(session.ctx.clone());
            match worker.install().await {
                Ok(count) => println!(
                    "Precached {} resources into {}",
                    count,
                    session.config.cache_name()
                ),
                Err(e) => eprintln!("Install incomplete: {}", e),
            }
            let deleted = worker.activate().await?;
            for name in deleted {
                println!("Deleted old cache {}", name);
            }
        }
        Command::Fetch { locator, document } => {
            let worker = session.installed_worker().await?;
            let url = session.config.resolve(&locator)?;
            let request = if document {
                Request::navigate(url)
            } else {
                Request::get(url)
            };
            match worker.fetch(request).await {
                Some(response) => {
                    eprintln!(
                        "{} {} ({:?}, {})",
                        response.status,
                        response.url,
                        response.kind,
                        response.header("content-type").unwrap_or("no content-type")
                    );
                    io::stdout().write_all(&response.body)?;
                }
                None => eprintln!("No response"),
            }
            worker.settle().await;
        }
        Command::Refresh => {
            let worker = session.installed_worker().await?;
            let tag = session.config.periodic_sync_tag.clone();
            if let Some(result) = worker.periodic_sync(&tag).await {
                let report = result?;
                println!(
                    "Refreshed {}, kept {}, failed {}",
                    report.refreshed, report.kept, report.failed
                );
            }
        }
        Command::Sync => {
            let worker = ServiceWorker::new(session.ctx.clone());
            let tag = session.config.sync_tag.clone();
            if let Some(outcome) = worker.sync(&tag).await {
                println!("{:?}", outcome);
            }
        }
        Command::Caches => {
            let current = session.config.cache_name();
            for name in session.storage.names().await? {
                let marker = if name == current { " (current)" } else { "" };
                println!("{}{}", name, marker);
                for entry in session.storage.entries(&name).await? {
                    println!(
                        "  {}  {:>8}  {:>9}  {}",
                        entry.status, entry.size, entry.age, entry.key
                    );
                }
            }
        }
        Command::Version => {
            let worker = ServiceWorker::new(session.ctx.clone());
            let (port, reply) = tokio::sync::oneshot::channel();
            worker
                .message(Some(&json!({"type": "GET_VERSION"})), vec![port])
                .await?;
            println!("{}", reply.await.context("Worker did not reply")?);
        }
        Command::Push { payload } => {
            let worker = ServiceWorker::new(session.ctx.clone());
            match worker.push(payload.as_deref().map(str::as_bytes)).await? {
                Some(notification) => println!("{}", serde_json::to_string_pretty(&notification)?),
                None => println!("Push ignored"),
            }
        }
        Command::Click { action } => {
            let worker = ServiceWorker::new(session.ctx.clone());
            let notification = build_notification(&session.config.notification, json!({}));
            match worker.notification_click(&notification, action.as_deref()).await? {
                ClickRoute::Dismissed => println!("Dismissed"),
                ClickRoute::Opened(url) => println!("Opened {}", url),
            }
        }
    }

    session.report_host_commands();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();
    let cli = Cli::parse();
    info!("shellcache starting");

    run(cli).await
}
