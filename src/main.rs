use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

mod config;
mod data;
mod ledger;
mod protocol;
mod quest;
mod routes;
mod session;

use config::ServerConfig;
use data::ItemRegistry;
use ledger::PlayerLedger;
use quest::{QuestCatalog, QuestEngine, QuestHooks, TriggerAdapter};
use routes::AppState;
use session::SessionRegistry;

#[tokio::main]
async fn main() {
    let config_path = ServerConfig::config_path();
    let config = ServerConfig::load(&config_path);

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let fallback = config
            .as_ref()
            .map(|c| c.log_filter.clone())
            .unwrap_or_else(|_| ServerConfig::default().log_filter);
        tracing_subscriber::EnvFilter::new(fallback)
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };
    config.log_summary(&config_path);

    // Load item registry from TOML files
    let mut item_registry = ItemRegistry::new();
    if let Err(e) = item_registry.load_from_directory(&config.data_dir) {
        error!("Failed to load item registry: {}", e);
    }

    // Quest content errors are fatal
    let catalog = match QuestCatalog::load_from_directory(&config.data_dir) {
        Ok(catalog) => Arc::new(catalog),
        Err(e) => {
            error!("Failed to load quest catalog: {}", e);
            std::process::exit(1);
        }
    };

    let sessions = Arc::new(SessionRegistry::new(config.notification_buffer));
    let ledger = Arc::new(PlayerLedger::new());
    let hooks = QuestHooks {
        notifier: sessions.clone(),
        rewards: ledger.clone(),
        items: Arc::new(item_registry),
    };
    let engine = QuestEngine::start(catalog, hooks, config.engine_settings());

    // Spawn kill event adapter
    let (kills, kill_rx) = mpsc::channel(config.kill_event_buffer.max(1));
    let mut adapter = tokio::spawn(TriggerAdapter::new(engine.clone()).run(kill_rx));

    let state = AppState {
        engine: engine.clone(),
        sessions,
        ledger,
        kills,
    };
    let app = routes::router(state);

    let listener = match tokio::net::TcpListener::bind(&config.bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", config.bind_addr, e);
            std::process::exit(1);
        }
    };
    info!("Quest server listening on http://{}", config.bind_addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
    }

    // The adapter stops once every AppState clone is dropped. A WebSocket
    // still open after shutdown keeps its clone, so the wait is bounded.
    let grace = Duration::from_millis(config.shutdown_grace_ms);
    match tokio::time::timeout(grace, &mut adapter).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Kill event adapter failed: {}", e),
        Err(_) => {
            warn!("Kill event adapter still running after {:?}, aborting", grace);
            adapter.abort();
        }
    }
    engine.shutdown().await;
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
