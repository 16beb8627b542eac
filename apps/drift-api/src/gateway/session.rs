//! Per-connection session state.

use std::collections::VecDeque;

use crate::geo::Geoloc;
use crate::store::{Pager, QueryKind};

/// Most self-published message ids remembered for echo suppression. Bounded
/// so a burst of posts cannot grow the queue without limit.
const PENDING_SELF_LIMIT: usize = 8;

/// State for one bound connection. Owned exclusively by the connection's
/// task and passed by `&mut` into every transition — no locking, no aliasing
/// across connections.
pub struct Session {
    pub user_id: String,
    pub username: String,
    cell: Geoloc,
    block_key: String,
    pending_self: VecDeque<i64>,
    last_query: Option<QueryKind>,
    pager: Option<Pager>,
}

impl Session {
    pub fn new(user_id: String, username: String, cell: Geoloc) -> Self {
        let block_key = cell.block().key();
        Self {
            user_id,
            username,
            cell,
            block_key,
            pending_self: VecDeque::new(),
            last_query: None,
            pager: None,
        }
    }

    pub fn cell(&self) -> Geoloc {
        self.cell
    }

    pub fn block_key(&self) -> &str {
        &self.block_key
    }

    /// Rebind to a new cell, dropping any cached query results. Returns the
    /// old block key so the caller can leave that group.
    pub fn rebind(&mut self, cell: Geoloc) -> String {
        let old_key = std::mem::replace(&mut self.block_key, cell.block().key());
        self.cell = cell;
        self.invalidate_cache();
        old_key
    }

    pub fn invalidate_cache(&mut self) {
        self.last_query = None;
        self.pager = None;
    }

    /// Remember a just-published message id so its loop-back notification is
    /// not echoed to this client. The oldest id is evicted at capacity.
    pub fn record_self_post(&mut self, id: i64) {
        if self.pending_self.len() == PENDING_SELF_LIMIT {
            self.pending_self.pop_front();
        }
        self.pending_self.push_back(id);
    }

    /// True when the notice is one of our own posts looping back; the match
    /// consumes the record so only the first loop-back is suppressed.
    pub fn suppress_notice(&mut self, id: i64) -> bool {
        if let Some(pos) = self.pending_self.iter().position(|&pending| pending == id) {
            self.pending_self.remove(pos);
            true
        } else {
            false
        }
    }

    /// The cached pager, if one exists for this query kind.
    pub fn cached(&self, kind: QueryKind) -> Option<&Pager> {
        match (&self.pager, self.last_query) {
            (Some(pager), Some(last)) if last == kind => Some(pager),
            _ => None,
        }
    }

    /// Replace the cache wholesale with a fresh result set.
    pub fn cache(&mut self, pager: Pager) {
        self.last_query = Some(pager.kind());
        self.pager = Some(pager);
    }
}
