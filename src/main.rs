// Rumble tracker entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file, not terminal)
// 2. Load config
// 3. Open database, hydrate stored game state
// 4. Preload entrant pool from CSV (first run only)
// 5. Create channels, spawn the sync hub
// 6. Run the app loop until Ctrl+C

use rumble_tracker::app::{self, AppState};
use rumble_tracker::config;
use rumble_tracker::db::Database;
use rumble_tracker::game::pool;
use rumble_tracker::sync::{self, PeerMap};

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing (log to file, not terminal)
    init_tracing()?;
    info!("Rumble tracker starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: ws port {}, db at {}",
        config.ws_port, config.db_path
    );

    // 3. Open database and hydrate any stored game
    let db = Database::open(&config.db_path).context("failed to open database")?;
    let peers = PeerMap::new();
    let mut app_state = AppState::new(config.clone(), db, peers.clone());

    match app::hydrate_from_db(&mut app_state) {
        Ok(true) => info!("Game state restored from previous session"),
        Ok(false) => info!("Starting a fresh game"),
        Err(e) => {
            error!("Hydration failed: {e:#}");
            return Err(e.context("hydration failed"));
        }
    }

    // 4. Preload the entrant pool from CSV, but only into an empty pool so
    //    restarts don't duplicate entrants.
    if let Some(csv_path) = &config.pool_csv {
        if app_state.engine.state().entrants.is_empty() {
            match pool::load_pool(csv_path) {
                Ok(drafts) => {
                    let added = app_state.engine.add_entrants(drafts);
                    info!("Preloaded {added} entrants from {}", csv_path.display());
                }
                Err(e) => warn!("Pool preload skipped: {e}"),
            }
        }
    }

    // 5. Spawn the sync hub
    let (sync_tx, sync_rx) = mpsc::channel(256);
    let listener = sync::bind(config.ws_port)
        .await
        .with_context(|| format!("failed to bind sync hub on port {}", config.ws_port))?;
    let hub_handle = tokio::spawn(async move {
        if let Err(e) = sync::run(listener, peers, sync_tx).await {
            error!("Sync hub error: {e:#}");
        }
    });

    // 6. Run the app loop until Ctrl+C
    let app_handle = tokio::spawn(async move {
        if let Err(e) = app::run(sync_rx, app_state).await {
            error!("Application loop error: {e:#}");
        }
    });

    info!("Ready: windows can connect on 127.0.0.1:{}", config.ws_port);
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    // Tear down: the hub loops forever, and the app loop drains until its
    // channel closes.
    hub_handle.abort();
    app_handle.abort();

    info!("Rumble tracker shut down cleanly");
    Ok(())
}

/// Initialize tracing to log to a file, keeping the terminal free for
/// operator output.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("rumble-tracker.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("rumble_tracker=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
