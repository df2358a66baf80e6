use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use retro_db::{init_database, RedbStorage};
use retro_server::{routes, AppState, Config};

const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            eprintln!("Required: RETRO_IDENTITY_SALT=<secret>");
            eprintln!(
                "Optional: RETRO_LISTEN_ADDR, RETRO_DB_PATH, RETRO_ACTIVE_WINDOW_SECS, \
                 RETRO_WRITE_LIMIT_PER_SEC"
            );
            std::process::exit(1);
        }
    };

    tracing::info!("Starting Retro server");
    tracing::info!("Listen address: {}", config.listen_addr);
    tracing::info!("Database path: {}", config.db_path.display());

    // Initialize database
    let db = match init_database(&config.db_path) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("Database error: {}", e);
            std::process::exit(1);
        }
    };

    let storage = Arc::new(RedbStorage::new(db));
    let state = AppState::new(&config, storage);

    // Periodically drop idle rate-limit entries and event channels
    let janitor = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
        loop {
            interval.tick().await;
            janitor.write_limiter.cleanup();
            janitor.hub.cleanup();
        }
    });

    let app = routes::create_router(state);

    let listener = match tokio::net::TcpListener::bind(&config.listen_addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Failed to bind to {}: {}", config.listen_addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("Server running at http://{}", config.listen_addr);

    if let Err(e) = axum::serve(listener, app).await {
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }
}
