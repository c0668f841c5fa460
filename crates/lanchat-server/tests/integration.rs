//! End-to-end tests against a live listener using a real WebSocket client.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use lanchat_core::Profile;
use lanchat_server::{ChatServer, ServerConfig};
use serde_json::{Value, json};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

const TIMEOUT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(250);

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Boot a test server on an ephemeral port and return the WS URL.
async fn boot_server(profile: Profile) -> (String, ChatServer) {
    let server = ChatServer::new(ServerConfig {
        profile,
        ..ServerConfig::default()
    });
    let (addr, _handle) = server.listen().await.unwrap();
    (format!("ws://{addr}/ws"), server)
}

async fn connect(url: &str) -> WsStream {
    let (ws, _) = connect_async(url).await.unwrap();
    ws
}

async fn send(ws: &mut WsStream, v: Value) {
    ws.send(Message::text(v.to_string())).await.unwrap();
}

/// Read the next text message as JSON.
async fn read_json(ws: &mut WsStream) -> Value {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timeout waiting for message")
            .expect("stream closed")
            .expect("ws error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Read a text message if one arrives within `wait`.
async fn try_read_json(ws: &mut WsStream, wait: Duration) -> Option<Value> {
    loop {
        match timeout(wait, ws.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => return serde_json::from_str(&text).ok(),
            Ok(Some(Ok(_))) => {}
            _ => return None,
        }
    }
}

/// Skip frames until one of `ty` arrives.
async fn read_type(ws: &mut WsStream, ty: &str) -> Value {
    loop {
        let v = read_json(ws).await;
        if v["type"] == ty {
            return v;
        }
    }
}

/// Skip frames until a contact list with exactly `names` (in order) arrives.
async fn read_contacts(ws: &mut WsStream, names: &[&str]) -> Value {
    loop {
        let v = read_type(ws, "contact-list").await;
        let got: Vec<&str> = v["contacts"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["username"].as_str().unwrap())
            .collect();
        if got == names {
            return v;
        }
    }
}

/// Assert no `message`/`image`/`registered`/`error` envelope arrives soon.
async fn assert_no_delivery(ws: &mut WsStream) {
    while let Some(v) = try_read_json(ws, QUIET).await {
        assert_eq!(v["type"], "contact-list", "unexpected envelope: {v}");
    }
}

/// Connect and register; returns the socket and the assigned id.
async fn join(url: &str, name: &str) -> (WsStream, String) {
    let mut ws = connect(url).await;
    send(&mut ws, json!({"type": "register", "username": name})).await;
    let ack = read_type(&mut ws, "registered").await;
    let id = ack["id"].as_str().unwrap().to_owned();
    (ws, id)
}

#[tokio::test]
async fn e2e_two_clients_chat() {
    let (url, server) = boot_server(Profile::Full).await;

    // Unregistered sessions see an empty list
    let mut alice = connect(&url).await;
    let first = read_json(&mut alice).await;
    assert_eq!(first, json!({"type": "contact-list", "contacts": []}));

    // The acknowledgement arrives before the list that contains alice
    send(&mut alice, json!({"type": "register", "username": "alice"})).await;
    let ack = read_json(&mut alice).await;
    assert_eq!(ack["type"], "registered");
    let alice_id = ack["id"].as_str().unwrap().to_owned();
    assert!(alice_id.starts_with("user_"));
    let list = read_json(&mut alice).await;
    assert_eq!(list["type"], "contact-list");
    assert_eq!(list["contacts"][0]["username"], "alice");
    assert_eq!(list["contacts"][0]["ip"], "127.0.0.1");
    assert_eq!(list["contacts"][0]["id"], alice_id.as_str());

    let (mut bob, bob_id) = join(&url, "bob").await;
    let _ = read_contacts(&mut alice, &["alice", "bob"]).await;
    let _ = read_contacts(&mut bob, &["alice", "bob"]).await;

    // Broadcast reaches both, sender included
    send(&mut alice, json!({"type": "message", "to": "all", "content": "hi"})).await;
    for ws in [&mut alice, &mut bob] {
        let msg = read_type(ws, "message").await;
        assert_eq!(msg["from"], alice_id.as_str());
        assert_eq!(msg["fromName"], "alice");
        assert_eq!(msg["content"], "hi");
        assert!(msg["timestamp"].is_i64());
    }

    // Direct message reaches only the target
    send(&mut alice, json!({"type": "message", "to": bob_id, "content": "psst"})).await;
    let dm = read_type(&mut bob, "message").await;
    assert_eq!(dm["content"], "psst");
    assert_no_delivery(&mut alice).await;

    // Disconnect shrinks everyone's list
    bob.close(None).await.unwrap();
    let _ = read_contacts(&mut alice, &["alice"]).await;

    // Stale id: silently dropped
    send(&mut alice, json!({"type": "message", "to": bob_id, "content": "gone?"})).await;
    assert_no_delivery(&mut alice).await;
    assert_eq!(server.registry().len(), 1);
}

#[tokio::test]
async fn e2e_duplicate_name_rejected() {
    let (url, server) = boot_server(Profile::Full).await;
    let (mut alice, _) = join(&url, "alice").await;

    let mut imposter = connect(&url).await;
    send(&mut imposter, json!({"type": "register", "username": "alice"})).await;
    let err = read_type(&mut imposter, "error").await;
    assert!(err["message"].as_str().unwrap().contains("alice"));
    assert_no_delivery(&mut imposter).await;
    assert_no_delivery(&mut alice).await;
    assert_eq!(server.registry().registered_count(), 1);

    // Retry with a free name
    send(&mut imposter, json!({"type": "register", "username": "alice2"})).await;
    let _ = read_type(&mut imposter, "registered").await;
    let _ = read_contacts(&mut alice, &["alice", "alice2"]).await;
}

#[tokio::test]
async fn e2e_name_reusable_after_disconnect() {
    let (url, _server) = boot_server(Profile::Full).await;
    let (alice, _) = join(&url, "alice").await;
    let (mut watcher, _) = join(&url, "watcher").await;
    drop(alice);
    let _ = read_contacts(&mut watcher, &["watcher"]).await;

    let (_again, _) = join(&url, "alice").await;
    let _ = read_contacts(&mut watcher, &["watcher", "alice"]).await;
}

#[tokio::test]
async fn e2e_bad_frames_keep_connection_open() {
    let (url, server) = boot_server(Profile::Full).await;
    let mut ws = connect(&url).await;
    let _ = read_json(&mut ws).await;

    ws.send(Message::text("{not json")).await.unwrap();
    send(&mut ws, json!({"type": "wave"})).await;
    send(&mut ws, json!({"type": "message", "to": "all", "content": "early"})).await;
    ws.send(Message::binary(vec![1u8, 2, 3])).await.unwrap();
    assert_no_delivery(&mut ws).await;

    send(&mut ws, json!({"type": "register", "username": "  dana  "})).await;
    let _ = read_type(&mut ws, "registered").await;
    let list = read_type(&mut ws, "contact-list").await;
    assert_eq!(list["contacts"][0]["username"], "dana");
    assert_eq!(server.registry().registered_count(), 1);
}

#[tokio::test]
async fn e2e_image_broadcast() {
    let (url, _server) = boot_server(Profile::Full).await;
    let (mut alice, alice_id) = join(&url, "alice").await;
    let (mut bob, _) = join(&url, "bob").await;

    let data = "data:image/png;base64,iVBORw0KGgo=";
    send(&mut alice, json!({"type": "image", "to": "all", "imageData": data})).await;
    for ws in [&mut alice, &mut bob] {
        let img = read_type(ws, "image").await;
        assert_eq!(img["from"], alice_id.as_str());
        assert_eq!(img["fromName"], "alice");
        assert_eq!(img["imageData"], data);
    }
}

#[tokio::test]
async fn e2e_basic_profile_shares_names_and_rejects_images() {
    let (url, server) = boot_server(Profile::Basic).await;
    let (mut first, _) = join(&url, "sam").await;
    let (mut second, _) = join(&url, "sam").await;
    let _ = read_contacts(&mut first, &["sam", "sam"]).await;
    assert_eq!(server.registry().registered_count(), 2);

    send(&mut first, json!({"type": "image", "to": "all", "imageData": "data:,"})).await;
    assert_no_delivery(&mut second).await;

    send(&mut first, json!({"type": "message", "to": "all", "content": "ok"})).await;
    let msg = read_type(&mut second, "message").await;
    assert_eq!(msg["content"], "ok");
}

#[tokio::test]
async fn e2e_shutdown_closes_sessions() {
    let (url, server) = boot_server(Profile::Full).await;
    let (mut alice, _) = join(&url, "alice").await;

    assert!(server.graceful_shutdown().await);

    let close = loop {
        match timeout(TIMEOUT, alice.next()).await.expect("timeout") {
            Some(Ok(Message::Close(frame))) => break frame,
            Some(Ok(_)) => {}
            other => panic!("expected close frame, got {other:?}"),
        }
    };
    assert_eq!(close.map(|f| f.code), Some(CloseCode::Away));
    assert!(server.registry().is_empty());
}
