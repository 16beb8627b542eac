use thiserror::Error;

/// Errors produced by the storage seams (message repository and key-value
/// store). The in-memory backends never fail, but external backends can, and
/// the facades collapse these into "operation did not succeed" outcomes.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached.
    #[error("store backend unavailable: {0}")]
    Unavailable(String),

    /// A stored record failed to decode.
    #[error("corrupt record: {0}")]
    Corrupt(&'static str),
}
