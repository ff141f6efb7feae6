//! Integration tests for the server, handler and full connection flow.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use kanabattle::prelude::*;
use serde_json::{Value, json};
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

// =========================================================================
// Test authenticator
// =========================================================================

/// Accepts any token except `"bad"`. The token doubles as display name and
/// seeds a stable user id.
struct TestAuth;

impl Authenticator for TestAuth {
    async fn authenticate(&self, token: &str) -> Result<Identity, SessionError> {
        if token == "bad" {
            return Err(SessionError::AuthFailed("bad token".into()));
        }
        Ok(Identity::new(user(token), token))
    }
}

fn user(name: &str) -> UserId {
    let seed = name
        .bytes()
        .fold(7u128, |acc, b| acc.wrapping_mul(31).wrapping_add(u128::from(b)));
    UserId(Uuid::from_u128(seed))
}

// =========================================================================
// Helpers
// =========================================================================

type ClientWs =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Short matches so a full game fits in a test.
fn test_settings() -> RoomSettings {
    RoomSettings {
        min_duration_secs: 1,
        ..RoomSettings::default()
    }
}

/// Starts a server on a random port and returns its address and hub.
async fn start_server_with<A: Authenticator>(auth: A) -> (String, Hub) {
    let server = BattleServerBuilder::new()
        .bind("127.0.0.1:0")
        .room_settings(test_settings())
        .build(auth)
        .await
        .expect("server should build");

    let addr = server
        .local_addr()
        .expect("should have local addr")
        .to_string();
    let hub = server.hub();

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    // Give the accept loop a moment to start.
    tokio::time::sleep(Duration::from_millis(10)).await;
    (addr, hub)
}

async fn start_server() -> (String, Hub) {
    start_server_with(TestAuth).await
}

async fn connect(addr: &str, token: &str) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws?token={token}"))
        .await
        .expect("should connect");
    ws
}

async fn send_json(ws: &mut ClientWs, value: Value) {
    ws.send(Message::Text(value.to_string().into()))
        .await
        .expect("send");
}

/// Next JSON frame from the server, skipping pings.
async fn recv_json(ws: &mut ClientWs) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("websocket error");
        match msg {
            Message::Text(text) => return serde_json::from_str(&text).expect("json"),
            Message::Binary(data) => return serde_json::from_slice(&data).expect("json"),
            Message::Close(_) => panic!("server closed the connection"),
            _ => continue,
        }
    }
}

async fn recv_type(ws: &mut ClientWs, expected: &str) -> Value {
    let msg = recv_json(ws).await;
    assert_eq!(msg["type"], expected, "unexpected message {msg}");
    msg
}

/// Asserts nothing arrives for a short while.
async fn assert_silent(ws: &mut ClientWs) {
    let res = tokio::time::timeout(Duration::from_millis(150), ws.next()).await;
    assert!(res.is_err(), "expected no message, got {res:?}");
}

fn player_count(room_state: &Value) -> usize {
    room_state["players"].as_object().map_or(0, |p| p.len())
}

fn score_of(msg: &Value, name: &str) -> u64 {
    msg["players"][user(name).to_string()]["score"]
        .as_u64()
        .expect("player missing from roster")
}

async fn create_room(ws: &mut ClientWs, duration: u32) -> Value {
    send_json(
        ws,
        json!({"type": "CREATE_ROOM", "duration": duration, "groups": ["hiragana"]}),
    )
    .await;
    recv_type(ws, "ROOM_STATE").await
}

fn only_code(hub: &Hub) -> RoomCode {
    let codes = hub.room_codes();
    assert_eq!(codes.len(), 1, "expected exactly one room");
    codes[0].clone()
}

// =========================================================================
// Authentication
// =========================================================================

#[tokio::test]
async fn test_upgrade_without_token_is_refused() {
    let (addr, hub) = start_server().await;

    let result = tokio_tungstenite::connect_async(format!("ws://{addr}/ws")).await;
    assert!(result.is_err(), "upgrade without token must fail");
    assert_eq!(hub.session_count(), 0);
}

#[tokio::test]
async fn test_bad_token_gets_unauthorized_error() {
    let (addr, hub) = start_server().await;
    let mut ws = connect(&addr, "bad").await;

    let msg = recv_type(&mut ws, "ERROR").await;
    assert_eq!(msg["message"], "unauthorized");

    // Then the server hangs up.
    let next = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("server should close");
    assert!(matches!(next, None | Some(Ok(Message::Close(_))) | Some(Err(_))));
    assert_eq!(hub.session_count(), 0);
}

#[tokio::test]
async fn test_silent_socket_does_not_block_other_clients() {
    let (addr, hub) = start_server().await;

    // Connected at the TCP level, never sends an upgrade request.
    let _silent = tokio::net::TcpStream::connect(&addr).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let mut ws = tokio::time::timeout(Duration::from_secs(5), connect(&addr, "host"))
        .await
        .expect("accept loop is stuck behind the silent socket");
    let state = create_room(&mut ws, 60).await;
    assert_eq!(player_count(&state), 1);
    assert_eq!(hub.room_count(), 1);
}

#[tokio::test]
async fn test_jwt_identity_reaches_the_roster() {
    use jsonwebtoken::{EncodingKey, Header, encode, get_current_timestamp};

    let (addr, _hub) = start_server_with(JwtAuthenticator::new(b"it-secret")).await;

    let sub = Uuid::new_v4();
    let claims = json!({
        "sub": sub.to_string(),
        "name": "Aiko",
        "exp": get_current_timestamp() + 600,
    });
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(b"it-secret"),
    )
    .unwrap();

    let mut ws = connect(&addr, &token).await;
    let state = create_room(&mut ws, 60).await;
    assert_eq!(state["hostId"], sub.to_string());
    assert_eq!(state["players"][sub.to_string()]["username"], "Aiko");
}

// =========================================================================
// Lobby
// =========================================================================

#[tokio::test]
async fn test_create_room_joins_the_creator() {
    let (addr, hub) = start_server().await;
    let mut host = connect(&addr, "host").await;

    let state = create_room(&mut host, 60).await;
    assert_eq!(state["state"], "WAITING");
    assert_eq!(state["hostId"], user("host").to_string());
    assert_eq!(state["config"]["duration"], 60);
    assert_eq!(state["config"]["groups"], json!(["hiragana"]));
    assert_eq!(player_count(&state), 1);
    assert_eq!(score_of(&state, "host"), 0);
    assert_eq!(hub.room_count(), 1);
}

#[tokio::test]
async fn test_create_room_with_bad_config_reports_error() {
    let (addr, hub) = start_server().await;
    let mut ws = connect(&addr, "host").await;

    send_json(&mut ws, json!({"type": "CREATE_ROOM", "duration": 0, "groups": ["hiragana"]})).await;
    let err = recv_type(&mut ws, "ERROR").await;
    assert!(err["message"].as_str().unwrap().contains("duration"));

    send_json(&mut ws, json!({"type": "CREATE_ROOM", "duration": 60, "groups": []})).await;
    let err = recv_type(&mut ws, "ERROR").await;
    assert!(err["message"].as_str().unwrap().contains("group"));

    assert_eq!(hub.room_count(), 0);
}

#[tokio::test]
async fn test_join_unknown_room_reports_not_found() {
    let (addr, _hub) = start_server().await;
    let mut ws = connect(&addr, "guest").await;

    send_json(&mut ws, json!({"type": "JOIN_ROOM", "code": "ZZZZZZ"})).await;
    let err = recv_type(&mut ws, "ERROR").await;
    assert_eq!(err["message"], "Room not found");
}

#[tokio::test]
async fn test_garbage_and_roomless_requests_are_ignored() {
    let (addr, _hub) = start_server().await;
    let mut ws = connect(&addr, "guest").await;

    ws.send(Message::Text("garbage".into())).await.unwrap();
    send_json(&mut ws, json!({"type": "CHEAT", "score": 9999})).await;
    send_json(&mut ws, json!({"type": "SUBMIT_SCORE", "score": 10})).await;
    send_json(&mut ws, json!({"type": "START_GAME"})).await;
    assert_silent(&mut ws).await;

    // The connection is still alive.
    send_json(&mut ws, json!({"type": "JOIN_ROOM", "code": "ZZZZZZ"})).await;
    let err = recv_type(&mut ws, "ERROR").await;
    assert_eq!(err["message"], "Room not found");
}

#[tokio::test]
async fn test_join_after_start_is_rejected() {
    let (addr, hub) = start_server().await;
    let mut host = connect(&addr, "host").await;
    create_room(&mut host, 60).await;
    let code = only_code(&hub);

    send_json(&mut host, json!({"type": "START_GAME"})).await;
    recv_type(&mut host, "GAME_STARTED").await;

    let mut late = connect(&addr, "late").await;
    send_json(&mut late, json!({"type": "JOIN_ROOM", "code": code.as_str()})).await;
    let err = recv_type(&mut late, "ERROR").await;
    assert_eq!(err["message"], "Game already in progress");
}

// =========================================================================
// Match flow
// =========================================================================

#[tokio::test]
async fn test_full_match_over_websocket() {
    let (addr, hub) = start_server().await;
    let mut host = connect(&addr, "host").await;
    let mut guest = connect(&addr, "guest").await;

    create_room(&mut host, 1).await;
    let code = only_code(&hub);

    // Codes are case-insensitive on the way in.
    send_json(
        &mut guest,
        json!({"type": "JOIN_ROOM", "code": code.as_str().to_lowercase()}),
    )
    .await;
    let guest_view = recv_type(&mut guest, "ROOM_STATE").await;
    let host_view = recv_type(&mut host, "ROOM_STATE").await;
    assert_eq!(player_count(&guest_view), 2);
    assert_eq!(player_count(&host_view), 2);
    assert_eq!(guest_view["hostId"], user("host").to_string());

    // Only the host may start.
    send_json(&mut guest, json!({"type": "START_GAME"})).await;
    send_json(&mut host, json!({"type": "START_GAME"})).await;
    let started = recv_type(&mut host, "GAME_STARTED").await;
    assert!(started["endTime"].is_string());
    recv_type(&mut guest, "GAME_STARTED").await;

    send_json(&mut guest, json!({"type": "SUBMIT_SCORE", "score": 120})).await;
    let update = recv_type(&mut guest, "SCORE_UPDATE").await;
    assert_eq!(score_of(&update, "guest"), 120);
    assert_eq!(score_of(&update, "host"), 0);
    recv_type(&mut host, "SCORE_UPDATE").await;

    // Out-of-range scores change nothing.
    send_json(&mut guest, json!({"type": "SUBMIT_SCORE", "score": 100000})).await;

    let over = recv_type(&mut host, "GAME_OVER").await;
    assert_eq!(score_of(&over, "guest"), 120);
    assert_eq!(score_of(&over, "host"), 0);
    recv_type(&mut guest, "GAME_OVER").await;

    let snapshot = hub.room_snapshot(&code).await.expect("room still listed");
    assert_eq!(snapshot.state, MatchState::Finished);
}

#[tokio::test]
async fn test_disconnect_leaves_room() {
    let (addr, hub) = start_server().await;
    let mut host = connect(&addr, "host").await;
    let mut guest = connect(&addr, "guest").await;

    create_room(&mut host, 60).await;
    let code = only_code(&hub);
    send_json(&mut guest, json!({"type": "JOIN_ROOM", "code": code.as_str()})).await;
    recv_type(&mut guest, "ROOM_STATE").await;
    recv_type(&mut host, "ROOM_STATE").await;

    guest.close(None).await.unwrap();

    let state = recv_type(&mut host, "ROOM_STATE").await;
    assert_eq!(player_count(&state), 1);
    assert!(state["players"].get(user("guest").to_string()).is_none());

    for _ in 0..50 {
        if hub.session_count() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(hub.session_count(), 1);
}

#[tokio::test]
async fn test_creating_a_second_room_leaves_the_first() {
    let (addr, hub) = start_server().await;
    let mut host = connect(&addr, "host").await;
    let mut guest = connect(&addr, "guest").await;

    create_room(&mut host, 60).await;
    let first = only_code(&hub);
    send_json(&mut guest, json!({"type": "JOIN_ROOM", "code": first.as_str()})).await;
    recv_type(&mut guest, "ROOM_STATE").await;
    recv_type(&mut host, "ROOM_STATE").await;

    let second = create_room(&mut guest, 60).await;
    assert_eq!(second["hostId"], user("guest").to_string());
    assert_eq!(player_count(&second), 1);

    // The host sees the guest go.
    let state = recv_type(&mut host, "ROOM_STATE").await;
    assert_eq!(player_count(&state), 1);
    assert_eq!(hub.room_count(), 2);
}
