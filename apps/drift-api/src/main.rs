use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use drift_api::config::Config;
use drift_api::db::kv::{KeyValueStore, MemoryStore};
use drift_api::gateway::groups::GroupRegistry;
use drift_api::store::{MemoryRepo, MessageRepo};
use drift_api::AppState;
use drift_common::SnowflakeGenerator;

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing — env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;

    // In-memory backends for the single-process deployment. Swap for
    // database-backed implementations behind the same traits when needed.
    let repo: Arc<dyn MessageRepo> = Arc::new(MemoryRepo::new());
    let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());

    let state = AppState {
        repo,
        kv,
        groups: Arc::new(GroupRegistry::new()),
        snowflake: Arc::new(SnowflakeGenerator::new(config.worker_id)),
        config: Arc::new(config),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(drift_api::gateway::server::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "drift-api listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app).await.expect("server error");
}
