//! Wire frames: inbound bind/request decoding and outbound frame builders.
//!
//! Inbound request frames carry an integer category code. They are decoded
//! once at the transport boundary into [`Request`] so everything past this
//! module matches on an exhaustive enum.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::geo::{self, Geoloc};
use crate::store::{Message, QueryKind};

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// First frame on a fresh connection: coordinates plus a credential token.
/// Coordinates may arrive as JSON strings or numbers.
#[derive(Debug, Deserialize)]
pub struct BindFrame {
    pub lat: Value,
    pub long: Value,
    pub token: String,
}

/// Any frame after a successful bind.
#[derive(Debug, Deserialize)]
pub struct RequestFrame {
    pub category: u8,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub page: Option<Value>,
    #[serde(default)]
    pub range: Option<Value>,
    #[serde(default)]
    pub lat: Option<Value>,
    #[serde(default)]
    pub long: Option<Value>,
}

pub const CAT_POST: u8 = 0;
pub const CAT_CHANGE_CELL: u8 = 1;
pub const CAT_RETRIEVE_RANKED: u8 = 2;
pub const CAT_RETRIEVE_NEW: u8 = 3;
pub const CAT_RETRIEVE_RANDOM: u8 = 4;
pub const CAT_RETRIEVE_RANGE: u8 = 5;
pub const CAT_RETRIEVE_AUTHOR: u8 = 6;
pub const CAT_UPVOTE: u8 = 7;
pub const CAT_DOWNVOTE: u8 = 8;
pub const CAT_CLOSE: u8 = 9;

/// A decoded, validated client request.
#[derive(Debug)]
pub enum Request {
    Post { text: String },
    ChangeCell { cell: Geoloc },
    Retrieve { kind: QueryKind, page: usize, range: f64 },
    Upvote { id: i64 },
    Downvote { id: i64 },
    Close,
}

/// Why an inbound request frame was rejected. Never fatal in the bound
/// phase; the client gets an error frame and the connection stays open.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("unknown category {0}")]
    UnknownCategory(u8),
    #[error("invalid coordinates")]
    BadCoordinates,
    #[error("{0}")]
    BadPayload(&'static str),
}

impl Request {
    pub fn decode(frame: RequestFrame) -> Result<Self, FrameError> {
        match frame.category {
            CAT_POST => {
                let text = frame
                    .data
                    .as_str()
                    .ok_or(FrameError::BadPayload("post data must be message text"))?;
                Ok(Request::Post {
                    text: text.to_string(),
                })
            }
            CAT_CHANGE_CELL => {
                let (lat, long) = match (&frame.lat, &frame.long) {
                    (Some(lat), Some(long)) => (lat, long),
                    _ => return Err(FrameError::BadCoordinates),
                };
                let cell =
                    Geoloc::from_values(lat, long).map_err(|_| FrameError::BadCoordinates)?;
                Ok(Request::ChangeCell { cell })
            }
            CAT_RETRIEVE_RANKED => Ok(retrieve(QueryKind::Ranked, &frame, 0.0)),
            CAT_RETRIEVE_NEW => Ok(retrieve(QueryKind::New, &frame, 0.0)),
            CAT_RETRIEVE_RANDOM => Ok(retrieve(QueryKind::Random, &frame, 0.0)),
            CAT_RETRIEVE_RANGE => {
                let raw = frame.range.as_ref().unwrap_or(&frame.data);
                let width = geo::parse_range(raw);
                Ok(retrieve(QueryKind::Range, &frame, width))
            }
            CAT_RETRIEVE_AUTHOR => Ok(retrieve(QueryKind::Author, &frame, 0.0)),
            CAT_UPVOTE => Ok(Request::Upvote {
                id: message_id(&frame.data)?,
            }),
            CAT_DOWNVOTE => Ok(Request::Downvote {
                id: message_id(&frame.data)?,
            }),
            CAT_CLOSE => Ok(Request::Close),
            other => Err(FrameError::UnknownCategory(other)),
        }
    }
}

fn retrieve(kind: QueryKind, frame: &RequestFrame, range: f64) -> Request {
    Request::Retrieve {
        kind,
        page: parse_page(frame.page.as_ref()),
        range,
    }
}

/// Lenient page parse; anything unusable means page 1.
fn parse_page(raw: Option<&Value>) -> usize {
    match raw {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(1) as usize,
        Some(Value::String(s)) => s.trim().parse().unwrap_or(1),
        _ => 1,
    }
}

fn message_id(raw: &Value) -> Result<i64, FrameError> {
    match raw {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .ok_or(FrameError::BadPayload("vote data must be a message id"))
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// A frame sent to the client.
#[derive(Debug, Clone, Serialize)]
pub struct ServerFrame {
    pub category: &'static str,
    pub data: Value,
}

impl ServerFrame {
    /// Connection lifecycle notices (greeting, cell change, closing ack).
    pub fn socket(data: Value) -> Self {
        Self {
            category: "socket",
            data,
        }
    }

    pub fn error(message: &str) -> Self {
        Self {
            category: "error",
            data: json!({ "message": message }),
        }
    }

    /// Identity confirmation after a successful bind.
    pub fn token(user_id: &str, username: &str) -> Self {
        Self {
            category: "token",
            data: json!({ "id": user_id, "username": username }),
        }
    }

    /// Echo acknowledgement of the requester's own new post.
    pub fn post(view: MessageView) -> Self {
        Self {
            category: "post",
            data: json!(view),
        }
    }

    pub fn vote(id: i64, votes: i32) -> Self {
        Self {
            category: "vote",
            data: json!({ "id": id, "votes": votes }),
        }
    }

    pub fn retrieve(page: usize, pages: usize, messages: Vec<MessageView>) -> Self {
        Self {
            category: "retrieve",
            data: json!({ "page": page, "pages": pages, "messages": messages }),
        }
    }

    /// Fan-out delivery of another session's post.
    pub fn notify(view: MessageView) -> Self {
        Self {
            category: "notify",
            data: json!(view),
        }
    }
}

/// Client-facing snapshot of a stored message.
#[derive(Debug, Clone, Serialize)]
pub struct MessageView {
    pub id: i64,
    pub lat: f64,
    pub long: f64,
    pub date: String,
    pub message: String,
    pub votes: i32,
    pub seen: i32,
}

impl From<&Message> for MessageView {
    fn from(m: &Message) -> Self {
        Self {
            id: m.id,
            lat: m.lat,
            long: m.long,
            date: m.created_at.format("%d/%m/%Y").to_string(),
            message: m.text.clone(),
            votes: m.votes,
            seen: m.seen,
        }
    }
}
