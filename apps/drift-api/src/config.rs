/// Service configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the WebSocket server binds to.
    pub port: u16,
    /// Worker ID mixed into generated message ids.
    pub worker_id: u16,
}

impl Config {
    /// Load configuration from environment variables. Every setting has a
    /// default, so a bare environment works out of the box.
    pub fn from_env() -> Self {
        Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(4100),
            worker_id: std::env::var("WORKER_ID")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
        }
    }
}
