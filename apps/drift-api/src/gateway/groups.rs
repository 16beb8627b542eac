//! Block-keyed broadcast groups.
//!
//! A registry mapping a block key to a broadcast channel. `join` and `leave`
//! are the only mutators; publishing fans an id-only notice out to every
//! subscribed connection, each of which receives it on its own task. All
//! three are safe to call concurrently from any number of tasks.

use dashmap::DashMap;
use tokio::sync::broadcast;

/// Capacity of each group channel. A receiver that lags skips notices.
const GROUP_CAPACITY: usize = 1024;

/// Published to a block group when a message is created there. Carries the
/// id only; subscribers fetch the body themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Notice {
    pub message_id: i64,
}

pub struct GroupRegistry {
    groups: DashMap<String, broadcast::Sender<Notice>>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self {
            groups: DashMap::new(),
        }
    }

    /// Subscribe to a group, creating its channel on first join.
    pub fn join(&self, key: &str) -> broadcast::Receiver<Notice> {
        self.groups
            .entry(key.to_string())
            .or_insert_with(|| broadcast::channel(GROUP_CAPACITY).0)
            .subscribe()
    }

    /// Prune a group once its last receiver is gone. Callers drop their
    /// receiver first, then leave.
    pub fn leave(&self, key: &str) {
        self.groups.remove_if(key, |_, tx| tx.receiver_count() == 0);
    }

    /// Send a notice to every current subscriber of the group. Returns the
    /// number of receivers reached; a group nobody joined reaches zero.
    pub fn publish(&self, key: &str, notice: Notice) -> usize {
        match self.groups.get(key) {
            Some(tx) => tx.send(notice).unwrap_or(0),
            None => 0,
        }
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}

impl Default for GroupRegistry {
    fn default() -> Self {
        Self::new()
    }
}
