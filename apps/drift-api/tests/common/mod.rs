use std::net::SocketAddr;
use std::sync::Arc;

use drift_api::auth;
use drift_api::config::Config;
use drift_api::db::kv::{KeyValueStore, MemoryStore};
use drift_api::gateway::groups::GroupRegistry;
use drift_api::store::{MemoryRepo, MessageRepo};
use drift_api::AppState;
use drift_common::SnowflakeGenerator;

/// Build an AppState wired to in-memory backends.
pub fn test_state() -> AppState {
    let repo: Arc<dyn MessageRepo> = Arc::new(MemoryRepo::new());
    let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    AppState {
        repo,
        kv,
        groups: Arc::new(GroupRegistry::new()),
        snowflake: Arc::new(SnowflakeGenerator::new(0)),
        config: Arc::new(Config {
            port: 0,
            worker_id: 0,
        }),
    }
}

/// Start the gateway on an ephemeral port. The server runs in the
/// background; returns its address and the shared state.
pub async fn start_server() -> (SocketAddr, AppState) {
    let state = test_state();
    let app = drift_api::gateway::server::router().with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state)
}

/// Mint a single-use credential token for a test user.
pub async fn mint_token(state: &AppState, user_id: &str, username: &str) -> String {
    auth::issue_token(state.kv.as_ref(), user_id, username)
        .await
        .expect("issue token")
}
