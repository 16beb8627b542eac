//! Message rows and the durable-store seam.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::geo::Block;

/// Votes at or below this delete the message on a downvote.
pub const DELETE_THRESH: i32 = -5;

/// A stored message row. Sessions only ever hold copies of these.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: i64,
    pub lat: f64,
    pub long: f64,
    pub block_lat: f64,
    pub block_long: f64,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub votes: i32,
    pub seen: i32,
    pub author_id: String,
}

impl Message {
    pub fn block(&self) -> Block {
        Block {
            lat: self.block_lat,
            long: self.block_long,
        }
    }
}

/// Fields for a new message row. Vote and seen counts take their defaults
/// (1 and 0) at insert time.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub id: i64,
    pub lat: f64,
    pub long: f64,
    pub block: Block,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub author_id: String,
}

/// The durable message store, queryable by cell and author, with atomic
/// per-row vote mutation.
///
/// Backed by an external database in production and [`super::MemoryRepo`] in
/// tests and single-process deployments.
#[async_trait]
pub trait MessageRepo: Send + Sync {
    /// Insert unless a live message in the same block already has
    /// case-insensitively identical text. Returns `None` on duplicate.
    /// The duplicate check and the insert are one atomic step.
    async fn insert_unique(&self, new: NewMessage) -> Result<Option<Message>, StoreError>;

    async fn get(&self, id: i64) -> Result<Option<Message>, StoreError>;

    /// All live messages whose block equals `block`, unordered.
    async fn by_block(&self, block: Block) -> Result<Vec<Message>, StoreError>;

    /// All live messages whose block falls inside the inclusive bounding box.
    async fn by_range(
        &self,
        lat_min: f64,
        lat_max: f64,
        long_min: f64,
        long_max: f64,
    ) -> Result<Vec<Message>, StoreError>;

    async fn by_author(&self, author_id: &str) -> Result<Vec<Message>, StoreError>;

    /// Adjust the vote count by `delta`. A negative adjustment that brings
    /// the count to [`DELETE_THRESH`] or below deletes the row. Returns the
    /// final count and whether the row was deleted, or `None` for an unknown
    /// id. Atomic per row.
    async fn apply_vote(&self, id: i64, delta: i32) -> Result<Option<(i32, bool)>, StoreError>;

    /// Remove a row outright. Returns the removed row.
    async fn delete(&self, id: i64) -> Result<Option<Message>, StoreError>;

    /// Record one more live delivery of the message and return the updated
    /// row.
    async fn bump_seen(&self, id: i64) -> Result<Option<Message>, StoreError>;
}
