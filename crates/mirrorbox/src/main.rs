//! `mirrorbox` - headless mail synchronization daemon
//!
//! Mirrors every stored account into the local database: a periodic sync
//! per account, plus IDLE push on each account's watched folder.
//!
//! Usage: `mirrorbox [CONFIG]`. The database path comes from
//! `MIRRORBOX_DB`, defaulting to the platform data directory.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use mirrorbox_sync::config::{default_config_path, default_database_path};
use mirrorbox_sync::{
    AlwaysOnline, ConnectivityMonitor, EngineConfig, IdleManager, KeyringStore, Mirror,
    NetworkConnector, Scheduler, SyncEngine,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mirrorbox=info,mirrorbox_sync=debug,mirrorbox_imap=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .or_else(default_config_path)
        .context("no config directory on this platform")?;
    let config = EngineConfig::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    let database_path = std::env::var_os("MIRRORBOX_DB")
        .map(PathBuf::from)
        .or_else(default_database_path)
        .context("no data directory on this platform")?;
    if let Some(parent) = database_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mirror = Mirror::new(&database_path.to_string_lossy())
        .await
        .with_context(|| format!("opening {}", database_path.display()))?;
    info!("Starting mirrorbox with {}", database_path.display());

    let accounts = mirror.list_accounts().await?;
    if accounts.is_empty() {
        warn!("No accounts stored, nothing to sync");
    }

    let connectivity: Arc<dyn ConnectivityMonitor> = Arc::new(AlwaysOnline::default());
    let connector = Arc::new(NetworkConnector::new(
        Arc::new(KeyringStore::new()),
        config.connection.clone(),
    ));
    let engine = Arc::new(SyncEngine::new(
        mirror,
        Arc::clone(&connector),
        Arc::clone(&connectivity),
        config.sync.clone(),
    ));
    let idle = IdleManager::new(connector, Arc::clone(&connectivity), &config);
    let scheduler = Arc::new(Scheduler::new(engine, connectivity, &config));

    let events = idle.take_events().context("event receiver already taken")?;
    let router = scheduler.route_events(events);
    idle.watch_connectivity();

    for account in &accounts {
        scheduler.start_account(account)?;
        scheduler.request_sync(account.require_id()?);
        idle.start_account(account).await?;
    }
    info!(accounts = accounts.len(), "mirrorbox running, Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    idle.stop_all().await;
    scheduler.stop_all().await;
    router.abort();
    Ok(())
}
