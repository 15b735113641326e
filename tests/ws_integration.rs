#[allow(dead_code)]
mod common;

use std::time::Duration;

use common::{
    ws_connect, ws_join, ws_join_with, ws_read_json, ws_read_until, ws_send_json,
    ws_try_read_json, ws_wait_for_turn, TestServer,
};
use futures::SinkExt;
use serde_json::json;

#[tokio::test]
async fn join_receives_init_and_map() {
    let server = TestServer::new().await;
    let mut stream = ws_connect(&server.ws_url()).await;
    ws_send_json(&mut stream, json!({"name": "Alice", "race": "cat", "weapon": "spear"})).await;

    let init = ws_read_until(&mut stream, |v| v["type"] == "init").await;
    assert_eq!(init["race"], "cat");
    assert!(init["id"].is_string());
    assert!(init["x"].is_number());

    let map = ws_read_until(&mut stream, |v| v["type"] == "map").await;
    let rows = map["data"].as_array().unwrap();
    assert_eq!(rows.len(), 20);
    assert_eq!(rows[0].as_array().unwrap().len(), 20);

    let state = ws_read_until(&mut stream, |v| v["type"] == "state").await;
    assert_eq!(state["data"][0]["name"], "Alice");
    assert_eq!(state["data"][0]["hp"], 10);
    assert_eq!(state["current_turn"], init["id"]);
}

#[tokio::test]
async fn duplicate_name_is_rejected() {
    let server = TestServer::new().await;
    let (_alice, _) = ws_join(&server, "Alice").await;

    let mut second = ws_connect(&server.ws_url()).await;
    ws_send_json(&mut second, json!({"name": "Alice"})).await;
    let reply = ws_read_json(&mut second).await;
    assert_eq!(reply["error"], "Name 'Alice' is already taken");
    assert!(ws_try_read_json(&mut second).await.is_none());
}

#[tokio::test]
async fn malformed_handshake_is_rejected() {
    let server = TestServer::new().await;
    let mut stream = ws_connect(&server.ws_url()).await;
    stream
        .send(tokio_tungstenite::tungstenite::Message::Text("not json".into()))
        .await
        .unwrap();
    let reply = ws_read_json(&mut stream).await;
    assert!(reply["error"]
        .as_str()
        .unwrap()
        .starts_with("Malformed handshake"));
}

#[tokio::test]
async fn skip_passes_the_turn() {
    let server = TestServer::new().await;
    let (mut alice, alice_id) = ws_join(&server, "Alice").await;
    let (mut bob, bob_id) = ws_join(&server, "Bob").await;

    ws_wait_for_turn(&mut bob, &alice_id).await;
    ws_send_json(&mut alice, json!({"action": "turn_action", "type": "skip"})).await;

    let state = ws_wait_for_turn(&mut bob, &bob_id).await;
    assert!(state["turn_time_left"].as_f64().unwrap() > 15.0);
}

#[tokio::test]
async fn idle_holder_times_out() {
    let server = TestServer::from_config(arena_server::Config {
        turn_timeout: Duration::from_millis(300),
        ..TestServer::config()
    })
    .await;
    let (_alice, alice_id) = ws_join(&server, "Alice").await;
    let (mut bob, bob_id) = ws_join(&server, "Bob").await;

    ws_wait_for_turn(&mut bob, &bob_id).await;
    ws_wait_for_turn(&mut bob, &alice_id).await;
}

#[tokio::test]
async fn chat_reaches_everyone_and_is_replayed() {
    let server = TestServer::new().await;
    let (mut alice, _) = ws_join(&server, "Alice").await;
    let (mut bob, _) = ws_join(&server, "Bob").await;

    ws_send_json(&mut alice, json!({"action": "chat", "text": "hello arena"})).await;
    for stream in [&mut alice, &mut bob] {
        let chat = ws_read_until(stream, |v| v["type"] == "chat" && v["from"] == "Alice").await;
        assert_eq!(chat["text"], "hello arena");
        assert!(chat["time"].as_u64().unwrap() > 0);
    }

    // A late joiner sees the history before its init
    let mut carol = ws_connect(&server.ws_url()).await;
    ws_send_json(&mut carol, json!({"name": "Carol"})).await;
    let mut texts = Vec::new();
    loop {
        let frame = ws_read_json(&mut carol).await;
        if frame["type"] == "init" {
            break;
        }
        if frame["type"] == "chat" {
            texts.push(frame["text"].as_str().unwrap().to_string());
        }
    }
    assert!(texts.contains(&"hello arena".to_string()));
}

#[tokio::test]
async fn leaving_frees_the_color() {
    let server = TestServer::new().await;
    let (alice, _) = ws_join_with(
        &server,
        json!({"name": "Alice", "color": {"r": 120, "g": 40, "b": 200, "a": 255}}),
    )
    .await;
    let used = server.state.server.used_colors();
    assert_eq!(used.len(), 1);
    assert_eq!((used[0].r, used[0].g, used[0].b), (120, 40, 200));

    drop(alice);
    for _ in 0..50 {
        if server.state.server.used_colors().is_empty() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("color still reserved after disconnect");
}
