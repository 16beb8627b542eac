//! In-memory message repository.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::StoreError;
use crate::geo::Block;

use super::repo::{Message, MessageRepo, NewMessage, DELETE_THRESH};

/// Repository backed by a single mutex-guarded map, so the duplicate check
/// at insert and each vote mutation are atomic.
pub struct MemoryRepo {
    rows: Mutex<HashMap<i64, Message>>,
}

impl MemoryRepo {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryRepo {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageRepo for MemoryRepo {
    async fn insert_unique(&self, new: NewMessage) -> Result<Option<Message>, StoreError> {
        let mut rows = self.rows.lock();

        let duplicate = rows.values().any(|m| {
            m.block_lat == new.block.lat
                && m.block_long == new.block.long
                && m.text.eq_ignore_ascii_case(&new.text)
        });
        if duplicate {
            return Ok(None);
        }

        let row = Message {
            id: new.id,
            lat: new.lat,
            long: new.long,
            block_lat: new.block.lat,
            block_long: new.block.long,
            text: new.text,
            created_at: new.created_at,
            votes: 1,
            seen: 0,
            author_id: new.author_id,
        };
        rows.insert(row.id, row.clone());
        Ok(Some(row))
    }

    async fn get(&self, id: i64) -> Result<Option<Message>, StoreError> {
        Ok(self.rows.lock().get(&id).cloned())
    }

    async fn by_block(&self, block: Block) -> Result<Vec<Message>, StoreError> {
        Ok(self
            .rows
            .lock()
            .values()
            .filter(|m| m.block_lat == block.lat && m.block_long == block.long)
            .cloned()
            .collect())
    }

    async fn by_range(
        &self,
        lat_min: f64,
        lat_max: f64,
        long_min: f64,
        long_max: f64,
    ) -> Result<Vec<Message>, StoreError> {
        Ok(self
            .rows
            .lock()
            .values()
            .filter(|m| {
                m.block_lat >= lat_min
                    && m.block_lat <= lat_max
                    && m.block_long >= long_min
                    && m.block_long <= long_max
            })
            .cloned()
            .collect())
    }

    async fn by_author(&self, author_id: &str) -> Result<Vec<Message>, StoreError> {
        Ok(self
            .rows
            .lock()
            .values()
            .filter(|m| m.author_id == author_id)
            .cloned()
            .collect())
    }

    async fn apply_vote(&self, id: i64, delta: i32) -> Result<Option<(i32, bool)>, StoreError> {
        let mut rows = self.rows.lock();
        let Some(row) = rows.get_mut(&id) else {
            return Ok(None);
        };
        row.votes += delta;
        let votes = row.votes;
        if delta < 0 && votes <= DELETE_THRESH {
            rows.remove(&id);
            return Ok(Some((votes, true)));
        }
        Ok(Some((votes, false)))
    }

    async fn delete(&self, id: i64) -> Result<Option<Message>, StoreError> {
        Ok(self.rows.lock().remove(&id))
    }

    async fn bump_seen(&self, id: i64) -> Result<Option<Message>, StoreError> {
        let mut rows = self.rows.lock();
        let Some(row) = rows.get_mut(&id) else {
            return Ok(None);
        };
        row.seen += 1;
        Ok(Some(row.clone()))
    }
}
