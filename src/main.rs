use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use axum::{routing::get, Router};
use quizroom::{
    config::Config,
    loader,
    room::registry::RoomRegistry,
    store::{CachedStore, FileStore, MemoryStore, RoomStore},
    ws,
};

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quizroom=debug,tower_http=debug,axum=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting quizroom...");

    let config = Arc::new(Config::from_env());

    // Persistent room store when a data dir is configured, otherwise
    // memory-only; either way fronted by the best-effort cache.
    let backing: Arc<dyn RoomStore> = match &config.data_dir {
        Some(dir) => match FileStore::new(dir.clone()).await {
            Ok(store) => {
                tracing::info!(dir = %dir.display(), "using file-backed room store");
                Arc::new(store)
            }
            Err(e) => {
                tracing::error!("failed to open data dir {}: {e}", dir.display());
                std::process::exit(1);
            }
        },
        None => {
            tracing::warn!("DATA_DIR not set, rooms will not survive a restart");
            Arc::new(MemoryStore::new())
        }
    };
    let store: Arc<dyn RoomStore> = Arc::new(CachedStore::new(backing));

    let registry = Arc::new(RoomRegistry::new(store, config.clone()));

    // Load the default quiz room so clients have something to join.
    match loader::load_quiz_file(&config.quiz_path).await {
        Ok(quiz) => {
            if let Err(e) = registry.load_default(&quiz).await {
                tracing::error!("failed to initialize default room: {e}");
                std::process::exit(1);
            }
        }
        Err(e) => {
            tracing::warn!(
                path = %config.quiz_path.display(),
                "no default quiz loaded ({e}); rooms must be created explicitly"
            );
        }
    }

    let state = ws::AppState {
        registry,
        config: config.clone(),
    };

    let app = Router::new()
        .route("/ws", get(ws::ws_handler))
        .fallback_service(ServeDir::new("static"))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Listening on http://{}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("failed to bind {addr}: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("server error: {e}");
        std::process::exit(1);
    }
}
