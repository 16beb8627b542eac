//! Fixed-size paging over a retrieved result set.

use super::repo::Message;

/// Messages per page.
pub const PAGE_SIZE: usize = 10;

/// Which retrieval produced a cached result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Ranked,
    New,
    Random,
    Range,
    Author,
}

/// A snapshot of one query's results, sliced into fixed-size pages.
///
/// Valid only for the session that created it; it is replaced wholesale when
/// the session changes cell or issues a different query kind.
#[derive(Debug)]
pub struct Pager {
    kind: QueryKind,
    items: Vec<Message>,
}

impl Pager {
    pub fn new(kind: QueryKind, items: Vec<Message>) -> Self {
        Self { kind, items }
    }

    pub fn kind(&self) -> QueryKind {
        self.kind
    }

    pub fn total_pages(&self) -> usize {
        self.items.len().div_ceil(PAGE_SIZE)
    }

    /// Page `n`, 1-based. `n` below 1 is treated as 1; a page past the end
    /// is empty rather than an error.
    pub fn page(&self, n: usize) -> &[Message] {
        let n = n.max(1);
        if n > self.total_pages() {
            return &[];
        }
        let start = (n - 1) * PAGE_SIZE;
        let end = (start + PAGE_SIZE).min(self.items.len());
        &self.items[start..end]
    }
}
