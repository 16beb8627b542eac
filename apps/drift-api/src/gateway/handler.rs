//! Bound-phase request dispatch and broadcast-notice handling.

use serde_json::json;

use crate::store::{self, CreateOutcome, Pager, QueryKind, VoteOutcome};
use crate::AppState;

use super::frames::{MessageView, Request, ServerFrame};
use super::groups::Notice;
use super::session::Session;

/// What the connection loop should do after the replies are sent.
#[derive(Debug)]
pub enum Outcome {
    Continue,
    /// The session moved to a new cell; the caller must swap its group
    /// subscription and then leave the old group.
    Rejoin { old_key: String },
    Close,
}

/// Handle one decoded request against the session's state. Returns the
/// frames to send back to the requester; fan-out happens via the group
/// registry as a side effect.
pub async fn dispatch(
    state: &AppState,
    session: &mut Session,
    request: Request,
) -> (Vec<ServerFrame>, Outcome) {
    match request {
        Request::Post { text } => (post(state, session, &text).await, Outcome::Continue),

        Request::ChangeCell { cell } => {
            let old_key = session.rebind(cell);
            tracing::debug!(
                user = %session.user_id,
                from = %old_key,
                to = %session.block_key(),
                "cell changed"
            );
            let ack = ServerFrame::socket(json!({
                "status": "cell changed",
                "block": session.block_key(),
            }));
            (vec![ack], Outcome::Rejoin { old_key })
        }

        Request::Retrieve { kind, page, range } => {
            (retrieve(state, session, kind, page, range).await, Outcome::Continue)
        }

        Request::Upvote { id } => (
            vote(store::upvote(state.repo.as_ref(), id).await, id),
            Outcome::Continue,
        ),

        Request::Downvote { id } => (
            vote(store::downvote(state.repo.as_ref(), id).await, id),
            Outcome::Continue,
        ),

        Request::Close => (
            vec![ServerFrame::socket(json!({ "status": "closing" }))],
            Outcome::Close,
        ),
    }
}

async fn post(state: &AppState, session: &mut Session, text: &str) -> Vec<ServerFrame> {
    let outcome = store::create_message(
        state.repo.as_ref(),
        &state.snowflake,
        session.cell(),
        text,
        &session.user_id,
    )
    .await;

    match outcome {
        CreateOutcome::Created(message) => {
            session.record_self_post(message.id);
            let reached = state.groups.publish(
                session.block_key(),
                Notice {
                    message_id: message.id,
                },
            );
            tracing::debug!(
                id = message.id,
                block = %session.block_key(),
                reached,
                "message posted"
            );
            vec![ServerFrame::post(MessageView::from(&message))]
        }
        CreateOutcome::Duplicate => {
            vec![ServerFrame::error("duplicate message in this block")]
        }
        CreateOutcome::Invalid => {
            vec![ServerFrame::error("empty message or invalid location")]
        }
    }
}

async fn retrieve(
    state: &AppState,
    session: &mut Session,
    kind: QueryKind,
    page: usize,
    range: f64,
) -> Vec<ServerFrame> {
    // Repeat requests of the same kind page through the cached result set;
    // anything else replaces the cache with a fresh query.
    if session.cached(kind).is_none() {
        let fresh = run_query(state, session, kind, range).await;
        session.cache(fresh);
    }
    let Some(pager) = session.cached(kind) else {
        return vec![ServerFrame::error("retrieval failed")];
    };

    let views: Vec<MessageView> = pager.page(page).iter().map(MessageView::from).collect();
    vec![ServerFrame::retrieve(page.max(1), pager.total_pages(), views)]
}

async fn run_query(state: &AppState, session: &Session, kind: QueryKind, range: f64) -> Pager {
    let repo = state.repo.as_ref();
    match kind {
        QueryKind::Ranked => store::retrieve_ranked(repo, session.cell()).await,
        QueryKind::New => store::retrieve_new(repo, session.cell()).await,
        QueryKind::Random => store::retrieve_random(repo, session.cell()).await,
        QueryKind::Range => store::retrieve_range(repo, session.cell(), range).await,
        QueryKind::Author => store::retrieve_by_author(repo, &session.user_id).await,
    }
}

fn vote(outcome: VoteOutcome, id: i64) -> Vec<ServerFrame> {
    match outcome {
        VoteOutcome::Updated(votes) => vec![ServerFrame::vote(id, votes)],
        VoteOutcome::NotFound => vec![ServerFrame::error("message not found")],
    }
}

/// Handle a notice delivered from the session's block group. Returns the
/// frame to forward, or `None` when the notice is this session's own post
/// looping back (suppressed, deliberately silent) or the message is already
/// gone.
pub async fn handle_notice(
    state: &AppState,
    session: &mut Session,
    notice: Notice,
) -> Option<ServerFrame> {
    if session.suppress_notice(notice.message_id) {
        return None;
    }

    match state.repo.bump_seen(notice.message_id).await {
        Ok(Some(message)) => Some(ServerFrame::notify(MessageView::from(&message))),
        // Deleted between publish and delivery.
        Ok(None) => None,
        Err(err) => {
            tracing::warn!(?err, id = notice.message_id, "notice lookup failed");
            None
        }
    }
}
