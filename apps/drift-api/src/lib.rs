pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod geo;
pub mod store;

use std::sync::Arc;

use config::Config;
use db::kv::KeyValueStore;
use drift_common::SnowflakeGenerator;
use gateway::groups::GroupRegistry;
use store::MessageRepo;

/// Shared application state available to every connection task.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn MessageRepo>,
    pub kv: Arc<dyn KeyValueStore>,
    pub groups: Arc<GroupRegistry>,
    pub snowflake: Arc<SnowflakeGenerator>,
    pub config: Arc<Config>,
}
