//! kpl-sync - catalog refresh and playlist reconciliation service
//!
//! Subcommands:
//! - `refresh`: rebuild the catalog from MediaCMS once
//! - `request-refresh`: write a refresh request marker
//! - `watch`: run the refresh coordinator until Ctrl+C
//! - `load-playlist`: store a playlist definition from a JSON file
//! - `apply`: apply a stored playlist to the room's live queue
//! - `stats`: print catalog statistics

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kpl_common::bus::HttpCommandBus;
use kpl_common::config::{ConfigOverrides, SyncConfig};
use kpl_common::gateway::StoreGateway;
use kpl_common::store::{DocumentStore, KvNamespace, SqliteDocumentStore};
use kpl_sync::admin::{current_snapshot, last_processed_refresh, put_playlist, record_catalog_refresh_request};
use kpl_sync::catalog::connector::MediaCmsConnector;
use kpl_sync::catalog::{run_catalog_refresh, CatalogRepository, Connector};
use kpl_sync::coordinator::{run_refresh_watcher, CatalogRefresher};
use kpl_sync::reconcile::{PlaylistDefinition, QueueMode, Reconciler};
use serde_json::json;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Command-line arguments for kpl-sync
#[derive(Parser, Debug)]
#[command(name = "kpl-sync")]
#[command(about = "Catalog refresh and playlist reconciliation for kryten playlists")]
#[command(version)]
struct Args {
    /// Configuration file (default: ~/.config/kpl/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database holding the catalog and documents
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Bucket prefix for this deployment's documents
    #[arg(long, global = true)]
    namespace: Option<String>,

    /// Room whose live queue is targeted
    #[arg(long, global = true)]
    channel: Option<String>,

    /// Base URL used to build manifest URLs
    #[arg(long, global = true)]
    manifest_base_url: Option<String>,

    /// MediaCMS instance to ingest from
    #[arg(long, global = true)]
    mediacms_url: Option<String>,

    /// Executor endpoint that receives queue commands
    #[arg(long, global = true)]
    executor_url: Option<String>,

    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rebuild the catalog from MediaCMS now
    Refresh {
        /// Free-form notes stored on the snapshot
        #[arg(long)]
        notes: Option<String>,
    },
    /// Ask a running watcher to refresh the catalog
    RequestRefresh {
        #[arg(long, default_value = "cli")]
        requested_by: String,
        /// Correlation id (generated when omitted)
        #[arg(long)]
        correlation_id: Option<String>,
    },
    /// Watch for refresh requests until interrupted
    Watch {
        /// Poll interval in seconds (overrides configuration)
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Store a playlist definition read from a JSON file
    LoadPlaylist { path: PathBuf },
    /// Apply a stored playlist to the live queue
    Apply {
        playlist_id: String,
        /// append, hard_replace or preserve_current
        #[arg(long, default_value = "append")]
        mode: QueueMode,
    },
    /// Print catalog statistics
    Stats,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        let poll_interval_secs = match &self.command {
            Command::Watch { interval } => *interval,
            _ => None,
        };

        ConfigOverrides {
            database_path: self.database.clone(),
            namespace: self.namespace.clone(),
            channel: self.channel.clone(),
            manifest_base_url: self.manifest_base_url.clone(),
            mediacms_base_url: self.mediacms_url.clone(),
            executor_url: self.executor_url.clone(),
            poll_interval_secs,
            log_level: self.log_level.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = SyncConfig::resolve(&args.overrides(), args.config.as_deref())
        .context("Failed to resolve configuration")?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("kpl_sync={0},kpl_common={0}", config.log_level).into()
            }),
        )
        .init();

    info!(
        "Starting kpl-sync v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    info!("Database path: {}", config.database_path.display());

    let pool = kpl_sync::db::init_database(&config.database_path)
        .await
        .context("Failed to open database")?;
    let store: Arc<dyn DocumentStore> = Arc::new(SqliteDocumentStore::new(pool.clone()).await?);
    let namespace = KvNamespace::new(config.namespace.clone());

    match args.command {
        Command::Refresh { notes } => {
            let connector = MediaCmsConnector::new(&config.mediacms_base_url)?;
            let snapshot = run_catalog_refresh(
                &connector,
                &pool,
                store.as_ref(),
                &namespace,
                Some(&config.manifest_base_url),
                connector.name(),
                notes.as_deref(),
            )
            .await
            .context("Catalog refresh failed")?;
            print_json(&snapshot)?;
        }
        Command::RequestRefresh {
            requested_by,
            correlation_id,
        } => {
            let marker =
                record_catalog_refresh_request(store.as_ref(), &namespace, &requested_by, correlation_id.as_deref())
                    .await?;
            print_json(&marker)?;
        }
        Command::Watch { .. } => {
            let refresher = CatalogRefresher {
                connector: Arc::new(MediaCmsConnector::new(&config.mediacms_base_url)?),
                pool: pool.clone(),
                store: store.clone(),
                namespace: namespace.clone(),
                manifest_base_url: Some(config.manifest_base_url.clone()),
            };

            let bus = Arc::new(HttpCommandBus::new(&config.executor_url)?);
            let gateway = Arc::new(StoreGateway::new(store.clone(), bus));

            let cancel = CancellationToken::new();
            let watcher = tokio::spawn(run_refresh_watcher(
                gateway,
                namespace.clone(),
                Arc::new(refresher),
                config.poll_interval(),
                cancel.clone(),
            ));

            shutdown_signal().await;
            cancel.cancel();

            let state = watcher.await.context("Refresh watcher task failed")?;
            info!(
                last_seen = state.last_seen_correlation_id.as_deref().unwrap_or("none"),
                "Refresh watcher stopped"
            );
        }
        Command::LoadPlaylist { path } => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let playlist: PlaylistDefinition =
                serde_json::from_str(&raw).with_context(|| format!("Invalid playlist in {}", path.display()))?;
            put_playlist(store.as_ref(), &namespace, &playlist).await?;
        }
        Command::Apply { playlist_id, mode } => {
            let bus = Arc::new(HttpCommandBus::new(&config.executor_url)?);
            let gateway = Arc::new(StoreGateway::new(store.clone(), bus));
            let reconciler = Reconciler::new(
                gateway,
                CatalogRepository::new(pool.clone()),
                namespace.clone(),
                config.manifest_base_url.clone(),
            );

            let result = reconciler
                .apply_playlist_to_queue(&playlist_id, &config.channel, mode)
                .await
                .context("Reconciliation failed")?;
            print_json(&result)?;
        }
        Command::Stats => {
            let stats = CatalogRepository::new(pool.clone()).stats().await?;
            let current = current_snapshot(store.as_ref(), &namespace).await?;
            let last_refresh = last_processed_refresh(store.as_ref(), &namespace).await?;
            print_json(&json!({
                "catalog": stats,
                "current_snapshot": current,
                "last_processed_refresh": last_refresh,
            }))?;
        }
    }

    pool.close().await;
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
