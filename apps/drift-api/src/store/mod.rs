//! Message store facade.
//!
//! Mediates creation, retrieval, and vote mutation against the repository
//! seam. Every operation here is total from the caller's perspective: a
//! backend fault collapses into the documented outcome (`NotFound`, an empty
//! result) and never propagates.

pub mod memory;
pub mod pager;
pub mod repo;

use chrono::Utc;
use drift_common::SnowflakeGenerator;
use rand::seq::SliceRandom;

use crate::geo::{Geoloc, MAX_RANGE};

pub use memory::MemoryRepo;
pub use pager::{Pager, QueryKind, PAGE_SIZE};
pub use repo::{Message, MessageRepo, NewMessage, DELETE_THRESH};

/// Longest message text kept. Overflow is truncated, not rejected.
pub const MAX_MESSAGE_LEN: usize = 256;

/// Outcome of a creation request. `Duplicate` and `Invalid` are business
/// results, not errors.
#[derive(Debug)]
pub enum CreateOutcome {
    Created(Message),
    Duplicate,
    Invalid,
}

/// Outcome of a vote mutation. A deleting downvote still reports the final
/// count.
#[derive(Debug, PartialEq, Eq)]
pub enum VoteOutcome {
    Updated(i32),
    NotFound,
}

/// Outcome of an explicit author delete.
#[derive(Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted(i64),
    NotFound,
    Forbidden,
}

/// Create a message in the cell's block. Rejects an invalid location or
/// blank text as `Invalid`; an existing live message in the block with
/// case-insensitively identical text yields `Duplicate`.
pub async fn create_message(
    repo: &dyn MessageRepo,
    ids: &SnowflakeGenerator,
    cell: Geoloc,
    raw_text: &str,
    author_id: &str,
) -> CreateOutcome {
    let text = raw_text.trim();
    if !cell.is_valid() || text.is_empty() {
        return CreateOutcome::Invalid;
    }
    let text: String = text.chars().take(MAX_MESSAGE_LEN).collect();

    let new = NewMessage {
        id: ids.generate(),
        lat: cell.lat,
        long: cell.long,
        block: cell.block(),
        text,
        created_at: Utc::now(),
        author_id: author_id.to_string(),
    };

    match repo.insert_unique(new).await {
        Ok(Some(message)) => CreateOutcome::Created(message),
        Ok(None) => CreateOutcome::Duplicate,
        Err(err) => {
            tracing::warn!(?err, "message insert failed");
            CreateOutcome::Invalid
        }
    }
}

/// Messages in the cell's block, highest vote count first.
pub async fn retrieve_ranked(repo: &dyn MessageRepo, cell: Geoloc) -> Pager {
    let mut items = block_scan(repo, cell).await;
    items.sort_by(|a, b| b.votes.cmp(&a.votes).then(b.id.cmp(&a.id)));
    Pager::new(QueryKind::Ranked, items)
}

/// Messages in the cell's block, newest first.
pub async fn retrieve_new(repo: &dyn MessageRepo, cell: Geoloc) -> Pager {
    let mut items = block_scan(repo, cell).await;
    items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    Pager::new(QueryKind::New, items)
}

/// Messages in the cell's block in a fresh shuffle. No ordering guarantee
/// across calls.
pub async fn retrieve_random(repo: &dyn MessageRepo, cell: Geoloc) -> Pager {
    let mut items = block_scan(repo, cell).await;
    items.shuffle(&mut rand::thread_rng());
    Pager::new(QueryKind::Random, items)
}

/// Messages whose block falls within `±width` longitude and `±width/2`
/// latitude of the cell's block. `width` is clamped to `[0, MAX_RANGE]`.
pub async fn retrieve_range(repo: &dyn MessageRepo, cell: Geoloc, width: f64) -> Pager {
    let width = width.clamp(0.0, MAX_RANGE);
    let block = cell.block();
    let items = repo
        .by_range(
            block.lat - width / 2.0,
            block.lat + width / 2.0,
            block.long - width,
            block.long + width,
        )
        .await
        .unwrap_or_else(|err| {
            tracing::warn!(?err, "range query failed");
            Vec::new()
        });
    Pager::new(QueryKind::Range, items)
}

/// All messages by one author, any block.
pub async fn retrieve_by_author(repo: &dyn MessageRepo, author_id: &str) -> Pager {
    let mut items = repo.by_author(author_id).await.unwrap_or_else(|err| {
        tracing::warn!(?err, "author query failed");
        Vec::new()
    });
    items.sort_by(|a, b| b.id.cmp(&a.id));
    Pager::new(QueryKind::Author, items)
}

pub async fn upvote(repo: &dyn MessageRepo, id: i64) -> VoteOutcome {
    vote(repo, id, 1).await
}

/// Downvote. Deletes the message when the count falls to [`DELETE_THRESH`]
/// or below, still reporting the final count.
pub async fn downvote(repo: &dyn MessageRepo, id: i64) -> VoteOutcome {
    vote(repo, id, -1).await
}

async fn vote(repo: &dyn MessageRepo, id: i64, delta: i32) -> VoteOutcome {
    match repo.apply_vote(id, delta).await {
        Ok(Some((votes, _deleted))) => VoteOutcome::Updated(votes),
        Ok(None) => VoteOutcome::NotFound,
        Err(err) => {
            tracing::warn!(?err, id, "vote mutation failed");
            VoteOutcome::NotFound
        }
    }
}

/// Explicit delete. Only the author may remove a message.
pub async fn delete_message(
    repo: &dyn MessageRepo,
    id: i64,
    requester_id: &str,
) -> DeleteOutcome {
    let existing = match repo.get(id).await {
        Ok(Some(m)) => m,
        Ok(None) => return DeleteOutcome::NotFound,
        Err(err) => {
            tracing::warn!(?err, id, "delete lookup failed");
            return DeleteOutcome::NotFound;
        }
    };
    if existing.author_id != requester_id {
        return DeleteOutcome::Forbidden;
    }
    match repo.delete(id).await {
        Ok(Some(m)) => DeleteOutcome::Deleted(m.id),
        Ok(None) => DeleteOutcome::NotFound,
        Err(err) => {
            tracing::warn!(?err, id, "delete failed");
            DeleteOutcome::NotFound
        }
    }
}

async fn block_scan(repo: &dyn MessageRepo, cell: Geoloc) -> Vec<Message> {
    repo.by_block(cell.block()).await.unwrap_or_else(|err| {
        tracing::warn!(?err, "block query failed");
        Vec::new()
    })
}
