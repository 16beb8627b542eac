//! WebSocket upgrade handler and per-connection event loop.
//!
//! Every connection runs as its own task. The transport handshake is
//! accepted immediately; the first text frame must then carry coordinates
//! and a credential token. Bind failures are fatal, anything after that is
//! reported on an error frame with the connection kept open.

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::broadcast;

use crate::auth;
use crate::geo::Geoloc;
use crate::AppState;

use super::frames::{BindFrame, Request, RequestFrame, ServerFrame};
use super::handler::{self, Outcome};
use super::session::Session;

/// Normal closure, used for a client-requested close.
const CLOSE_NORMAL: u16 = 1000;
/// Close code for a failed bind (4000-range for application-level).
const CLOSE_BIND_FAILED: u16 = 4003;

pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(ws_upgrade))
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let conn_id = drift_common::id::prefixed_ulid(drift_common::id::prefix::CONNECTION);

    // Accept first, authenticate second.
    let greeting = ServerFrame::socket(json!({ "status": "connected" }));
    if send(&mut ws_tx, &greeting).await.is_err() {
        return;
    }

    let mut session = match bind_phase(&state, &mut ws_tx, &mut ws_rx).await {
        Some(session) => session,
        // An error frame and close have already been sent.
        None => return,
    };

    // Join before confirming, so the confirmation frame means the session
    // is already receiving fan-out.
    let mut group_rx = state.groups.join(session.block_key());
    let confirm = ServerFrame::token(&session.user_id, &session.username);
    if send(&mut ws_tx, &confirm).await.is_err() {
        drop(group_rx);
        state.groups.leave(session.block_key());
        return;
    }
    tracing::info!(
        conn = %conn_id,
        user = %session.user_id,
        block = %session.block_key(),
        "session bound"
    );

    run_session(&state, &mut session, &mut ws_tx, &mut ws_rx, &mut group_rx).await;

    // Leave whichever group the session last joined.
    drop(group_rx);
    state.groups.leave(session.block_key());
    tracing::info!(conn = %conn_id, user = %session.user_id, "session ended");
}

/// Wait for the bind frame, validate coordinates, verify the credential.
/// Any failure here is fatal: an error frame is sent and the connection is
/// closed with no group joined.
async fn bind_phase(
    state: &AppState,
    ws_tx: &mut SplitSink<WebSocket, Message>,
    ws_rx: &mut SplitStream<WebSocket>,
) -> Option<Session> {
    while let Some(msg) = ws_rx.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!(?e, "ws read error during bind");
                return None;
            }
        };

        let text = match msg {
            Message::Text(t) => t,
            Message::Close(_) => return None,
            Message::Ping(_) | Message::Pong(_) => continue,
            _ => continue,
        };

        let frame: BindFrame = match serde_json::from_str(&text) {
            Ok(f) => f,
            Err(_) => {
                let _ = reject(ws_tx, "expected lat, long, and token").await;
                return None;
            }
        };

        let cell = match Geoloc::from_values(&frame.lat, &frame.long) {
            Ok(c) => c,
            Err(_) => {
                let _ = reject(ws_tx, "invalid coordinates").await;
                return None;
            }
        };

        let identity = match auth::verify_token(state.kv.as_ref(), &frame.token).await {
            Ok(Some(identity)) => identity,
            Ok(None) => {
                let _ = reject(ws_tx, "invalid credential").await;
                return None;
            }
            Err(err) => {
                tracing::warn!(?err, "credential lookup failed");
                let _ = reject(ws_tx, "invalid credential").await;
                return None;
            }
        };

        return Some(Session::new(identity.user_id, identity.username, cell));
    }
    None
}

/// Main session loop: dispatch client requests, forward group notices.
async fn run_session(
    state: &AppState,
    session: &mut Session,
    ws_tx: &mut SplitSink<WebSocket, Message>,
    ws_rx: &mut SplitStream<WebSocket>,
    group_rx: &mut broadcast::Receiver<super::groups::Notice>,
) {
    loop {
        tokio::select! {
            // Client sends us a frame.
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let frame: RequestFrame = match serde_json::from_str(&text) {
                            Ok(f) => f,
                            Err(_) => {
                                if send(ws_tx, &ServerFrame::error("malformed request")).await.is_err() {
                                    break;
                                }
                                continue;
                            }
                        };

                        let request = match Request::decode(frame) {
                            Ok(r) => r,
                            Err(e) => {
                                if send(ws_tx, &ServerFrame::error(&e.to_string())).await.is_err() {
                                    break;
                                }
                                continue;
                            }
                        };

                        let (replies, outcome) = handler::dispatch(state, session, request).await;

                        // Swap the subscription before acknowledging, so the
                        // ack means the new cell's fan-out is already live.
                        // Swapping drops the old receiver, which lets the old
                        // group be pruned.
                        if let Outcome::Rejoin { ref old_key } = outcome {
                            *group_rx = state.groups.join(session.block_key());
                            state.groups.leave(old_key);
                        }

                        for reply in &replies {
                            if send(ws_tx, reply).await.is_err() {
                                return;
                            }
                        }

                        if matches!(outcome, Outcome::Close) {
                            let _ = close(ws_tx, CLOSE_NORMAL, "closed by client").await;
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(?e, user = %session.user_id, "ws read error");
                        break;
                    }
                    _ => continue,
                }
            }

            // A notice from the session's block group.
            notice = group_rx.recv() => {
                match notice {
                    Ok(notice) => {
                        if let Some(frame) = handler::handle_notice(state, session, notice).await {
                            if send(ws_tx, &frame).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            user = %session.user_id,
                            skipped,
                            "session lagged behind its block group"
                        );
                        // Continue — the missed notices are simply dropped.
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
}

async fn send(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    frame: &ServerFrame,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(frame).unwrap();
    ws_tx.send(Message::Text(json.into())).await
}

/// Send an error frame followed by a close frame.
async fn reject(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    reason: &str,
) -> Result<(), axum::Error> {
    send(ws_tx, &ServerFrame::error(reason)).await?;
    close(ws_tx, CLOSE_BIND_FAILED, reason).await
}

async fn close(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    code: u16,
    reason: &str,
) -> Result<(), axum::Error> {
    let frame = Message::Close(Some(CloseFrame {
        code,
        reason: reason.to_string().into(),
    }));
    ws_tx.send(frame).await
}
