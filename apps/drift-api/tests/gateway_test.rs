mod common;

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::time;
use tokio_tungstenite::tungstenite;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Helper: connect to the gateway and consume the greeting frame.
async fn connect(addr: SocketAddr) -> WsStream {
    let url = format!("ws://{addr}/ws");
    let (mut ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("ws connect");

    let greeting = read_frame(&mut ws).await;
    assert_eq!(greeting["category"], "socket");
    assert_eq!(greeting["data"]["status"], "connected");
    ws
}

/// Helper: read the next text frame as JSON, with a timeout.
async fn read_frame(ws: &mut WsStream) -> serde_json::Value {
    let msg = time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timeout waiting for frame")
        .expect("stream ended")
        .expect("ws read error");
    let text = msg.into_text().expect("not text");
    serde_json::from_str(&text).expect("parse frame")
}

/// Helper: assert nothing arrives for a short while.
async fn expect_silence(ws: &mut WsStream) {
    let result = time::timeout(Duration::from_millis(250), ws.next()).await;
    assert!(result.is_err(), "expected no frame, got {result:?}");
}

async fn send_json(ws: &mut WsStream, value: serde_json::Value) {
    ws.send(tungstenite::Message::Text(value.to_string().into()))
        .await
        .expect("send frame");
}

/// Helper: connect and complete the bind phase, returning the stream after
/// the token confirmation.
async fn connect_and_bind(
    addr: SocketAddr,
    state: &drift_api::AppState,
    username: &str,
    lat: f64,
    long: f64,
) -> WsStream {
    let user_id = drift_common::id::prefixed_ulid("usr");
    let token = common::mint_token(state, &user_id, username).await;

    let mut ws = connect(addr).await;
    send_json(&mut ws, serde_json::json!({ "lat": lat, "long": long, "token": token })).await;

    let confirm = read_frame(&mut ws).await;
    assert_eq!(confirm["category"], "token");
    assert_eq!(confirm["data"]["username"], username);
    ws
}

// ---------------------------------------------------------------------------
// Bind phase
// ---------------------------------------------------------------------------

#[tokio::test]
async fn bind_confirms_identity() {
    let (addr, state) = common::start_server().await;
    let user_id = drift_common::id::prefixed_ulid("usr");
    let token = common::mint_token(&state, &user_id, "binder").await;

    let mut ws = connect(addr).await;
    // Coordinates as strings are accepted too.
    send_json(
        &mut ws,
        serde_json::json!({ "lat": "1.23456", "long": "2.34567", "token": token }),
    )
    .await;

    let confirm = read_frame(&mut ws).await;
    assert_eq!(confirm["category"], "token");
    assert_eq!(confirm["data"]["id"], user_id.as_str());
    assert_eq!(confirm["data"]["username"], "binder");
}

#[tokio::test]
async fn bind_with_invalid_token_is_fatal() {
    let (addr, _state) = common::start_server().await;

    let mut ws = connect(addr).await;
    send_json(
        &mut ws,
        serde_json::json!({ "lat": 1.0, "long": 2.0, "token": "tok_bogus" }),
    )
    .await;

    let error = read_frame(&mut ws).await;
    assert_eq!(error["category"], "error");

    // The server closes the connection.
    let next = time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timeout waiting for close");
    match next {
        Some(Ok(tungstenite::Message::Close(_))) | None => {}
        other => panic!("expected close, got {other:?}"),
    }
}

#[tokio::test]
async fn bind_with_out_of_range_coordinates_is_fatal() {
    let (addr, state) = common::start_server().await;
    let token = common::mint_token(&state, "usr_x", "nowhere").await;

    let mut ws = connect(addr).await;
    send_json(
        &mut ws,
        serde_json::json!({ "lat": 95.0, "long": 2.0, "token": token }),
    )
    .await;

    let error = read_frame(&mut ws).await;
    assert_eq!(error["category"], "error");
    assert_eq!(state.groups.group_count(), 0, "no group may be joined");
}

// ---------------------------------------------------------------------------
// Fan-out
// ---------------------------------------------------------------------------

#[tokio::test]
async fn posts_fan_out_within_the_block_only() {
    let (addr, state) = common::start_server().await;

    // Two clients in the same cell, one in a different cell.
    let mut author = connect_and_bind(addr, &state, "author", 1.23456, 2.34567).await;
    let mut neighbour = connect_and_bind(addr, &state, "neighbour", 1.23461, 2.34572).await;
    let mut stranger = connect_and_bind(addr, &state, "stranger", -33.86, 151.21).await;

    send_json(&mut author, serde_json::json!({ "category": 0, "data": "hello" })).await;

    // The author gets the echo acknowledgement, not a notify.
    let ack = read_frame(&mut author).await;
    assert_eq!(ack["category"], "post");
    assert_eq!(ack["data"]["message"], "hello");

    // The neighbour gets the fan-out copy.
    let notify = read_frame(&mut neighbour).await;
    assert_eq!(notify["category"], "notify");
    assert_eq!(notify["data"]["message"], "hello");
    assert_eq!(notify["data"]["id"], ack["data"]["id"]);

    // Nobody else hears anything, including the author.
    expect_silence(&mut stranger).await;
    expect_silence(&mut author).await;
}

#[tokio::test]
async fn duplicate_posts_get_a_non_fatal_error() {
    let (addr, state) = common::start_server().await;
    let mut ws = connect_and_bind(addr, &state, "dupe", 5.0, 5.0).await;

    send_json(&mut ws, serde_json::json!({ "category": 0, "data": "Echo" })).await;
    assert_eq!(read_frame(&mut ws).await["category"], "post");

    send_json(&mut ws, serde_json::json!({ "category": 0, "data": "echo" })).await;
    assert_eq!(read_frame(&mut ws).await["category"], "error");

    // Still connected: a retrieval works afterwards.
    send_json(&mut ws, serde_json::json!({ "category": 3 })).await;
    assert_eq!(read_frame(&mut ws).await["category"], "retrieve");
}

#[tokio::test]
async fn change_cell_moves_the_subscription() {
    let (addr, state) = common::start_server().await;
    let mut mover = connect_and_bind(addr, &state, "mover", 1.0, 1.0).await;
    let mut poster = connect_and_bind(addr, &state, "poster", 40.0, 40.0).await;

    send_json(
        &mut mover,
        serde_json::json!({ "category": 1, "lat": 40.0, "long": 40.0 }),
    )
    .await;
    let ack = read_frame(&mut mover).await;
    assert_eq!(ack["category"], "socket");
    assert_eq!(ack["data"]["status"], "cell changed");

    send_json(&mut poster, serde_json::json!({ "category": 0, "data": "over here" })).await;
    assert_eq!(read_frame(&mut poster).await["category"], "post");

    let notify = read_frame(&mut mover).await;
    assert_eq!(notify["category"], "notify");
    assert_eq!(notify["data"]["message"], "over here");
}

#[tokio::test]
async fn change_cell_with_bad_coordinates_keeps_the_old_cell() {
    let (addr, state) = common::start_server().await;
    let mut mover = connect_and_bind(addr, &state, "stayer", 1.0, 1.0).await;
    let mut poster = connect_and_bind(addr, &state, "poster", 1.0, 1.0).await;

    send_json(
        &mut mover,
        serde_json::json!({ "category": 1, "lat": "not-a-number", "long": 0 }),
    )
    .await;
    assert_eq!(read_frame(&mut mover).await["category"], "error");

    // Still subscribed to the original cell.
    send_json(&mut poster, serde_json::json!({ "category": 0, "data": "still here" })).await;
    assert_eq!(read_frame(&mut poster).await["category"], "post");
    assert_eq!(read_frame(&mut mover).await["data"]["message"], "still here");
}

// ---------------------------------------------------------------------------
// Votes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn votes_mutate_and_delete_at_the_threshold() {
    let (addr, state) = common::start_server().await;
    let mut ws = connect_and_bind(addr, &state, "voter", 7.0, 7.0).await;

    send_json(&mut ws, serde_json::json!({ "category": 0, "data": "contested" })).await;
    let ack = read_frame(&mut ws).await;
    let id = ack["data"]["id"].as_i64().unwrap();

    send_json(&mut ws, serde_json::json!({ "category": 7, "data": id })).await;
    let vote = read_frame(&mut ws).await;
    assert_eq!(vote["category"], "vote");
    assert_eq!(vote["data"]["votes"], 2);

    // Drive the count down past the deletion threshold (-5): 2 → -5 is
    // seven downvotes.
    for expected in (-5..=1).rev() {
        send_json(&mut ws, serde_json::json!({ "category": 8, "data": id })).await;
        let vote = read_frame(&mut ws).await;
        assert_eq!(vote["category"], "vote");
        assert_eq!(vote["data"]["votes"], expected);
    }

    // Deleted: a further vote reports not-found.
    send_json(&mut ws, serde_json::json!({ "category": 7, "data": id })).await;
    assert_eq!(read_frame(&mut ws).await["category"], "error");
}

// ---------------------------------------------------------------------------
// Retrieval
// ---------------------------------------------------------------------------

#[tokio::test]
async fn retrieval_pages_and_clamps() {
    let (addr, state) = common::start_server().await;
    let mut ws = connect_and_bind(addr, &state, "reader", 9.0, 9.0).await;

    for i in 0..3 {
        send_json(
            &mut ws,
            serde_json::json!({ "category": 0, "data": format!("message {i}") }),
        )
        .await;
        assert_eq!(read_frame(&mut ws).await["category"], "post");
    }

    send_json(&mut ws, serde_json::json!({ "category": 3, "page": 1 })).await;
    let frame = read_frame(&mut ws).await;
    assert_eq!(frame["category"], "retrieve");
    assert_eq!(frame["data"]["pages"], 1);
    let messages = frame["data"]["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 3);
    // Newest first.
    assert_eq!(messages[0]["message"], "message 2");

    // A page far past the end is empty, not an error.
    send_json(&mut ws, serde_json::json!({ "category": 3, "page": 6 })).await;
    let frame = read_frame(&mut ws).await;
    assert_eq!(frame["data"]["pages"], 1);
    assert!(frame["data"]["messages"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn range_retrieval_spans_neighbouring_blocks() {
    let (addr, state) = common::start_server().await;
    let mut near = connect_and_bind(addr, &state, "near", 10.5, 21.0).await;
    let mut reader = connect_and_bind(addr, &state, "reader", 10.0, 20.0).await;
    let mut far = connect_and_bind(addr, &state, "far", 80.0, 120.0).await;

    send_json(&mut near, serde_json::json!({ "category": 0, "data": "nearby" })).await;
    assert_eq!(read_frame(&mut near).await["category"], "post");
    send_json(&mut far, serde_json::json!({ "category": 0, "data": "far away" })).await;
    assert_eq!(read_frame(&mut far).await["category"], "post");

    // Width 2.0: lat in [9, 11], long in [18, 22] — the nearby post only.
    send_json(&mut reader, serde_json::json!({ "category": 5, "range": 2.0 })).await;
    let frame = read_frame(&mut reader).await;
    assert_eq!(frame["category"], "retrieve");
    let messages = frame["data"]["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["message"], "nearby");
}

#[tokio::test]
async fn author_retrieval_spans_cells() {
    let (addr, state) = common::start_server().await;
    let user_id = drift_common::id::prefixed_ulid("usr");
    let token = common::mint_token(&state, &user_id, "wanderer").await;

    let mut ws = connect(addr).await;
    send_json(&mut ws, serde_json::json!({ "lat": 1.0, "long": 1.0, "token": token })).await;
    assert_eq!(read_frame(&mut ws).await["category"], "token");

    send_json(&mut ws, serde_json::json!({ "category": 0, "data": "first stop" })).await;
    assert_eq!(read_frame(&mut ws).await["category"], "post");

    send_json(&mut ws, serde_json::json!({ "category": 1, "lat": 2.0, "long": 2.0 })).await;
    assert_eq!(read_frame(&mut ws).await["category"], "socket");

    send_json(&mut ws, serde_json::json!({ "category": 0, "data": "second stop" })).await;
    assert_eq!(read_frame(&mut ws).await["category"], "post");

    send_json(&mut ws, serde_json::json!({ "category": 6 })).await;
    let frame = read_frame(&mut ws).await;
    assert_eq!(frame["category"], "retrieve");
    assert_eq!(frame["data"]["messages"].as_array().unwrap().len(), 2);
}

// ---------------------------------------------------------------------------
// Protocol errors and close
// ---------------------------------------------------------------------------

#[tokio::test]
async fn bad_requests_are_non_fatal() {
    let (addr, state) = common::start_server().await;
    let mut ws = connect_and_bind(addr, &state, "clumsy", 3.0, 3.0).await;

    send_json(&mut ws, serde_json::json!({ "category": 42 })).await;
    assert_eq!(read_frame(&mut ws).await["category"], "error");

    ws.send(tungstenite::Message::Text("not json".into()))
        .await
        .expect("send");
    assert_eq!(read_frame(&mut ws).await["category"], "error");

    // The session survives both.
    send_json(&mut ws, serde_json::json!({ "category": 0, "data": "alive" })).await;
    assert_eq!(read_frame(&mut ws).await["category"], "post");
}

#[tokio::test]
async fn close_category_acks_and_disconnects() {
    let (addr, state) = common::start_server().await;
    let mut ws = connect_and_bind(addr, &state, "leaver", 6.0, 6.0).await;

    send_json(&mut ws, serde_json::json!({ "category": 9 })).await;
    let ack = read_frame(&mut ws).await;
    assert_eq!(ack["category"], "socket");
    assert_eq!(ack["data"]["status"], "closing");

    let next = time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timeout waiting for close");
    match next {
        Some(Ok(tungstenite::Message::Close(_))) | None => {}
        other => panic!("expected close, got {other:?}"),
    }

    // The block group is pruned once its last member is gone.
    let deadline = time::Instant::now() + Duration::from_secs(2);
    while state.groups.group_count() != 0 {
        assert!(time::Instant::now() < deadline, "group was not pruned");
        time::sleep(Duration::from_millis(20)).await;
    }
}
