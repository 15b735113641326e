use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use arena_server::{build_router, AppState, Config};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const READ_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: AppState,
    _shutdown: tokio::task::JoinHandle<()>,
}

impl TestServer {
    /// Small fixed map with a fast turn check
    pub fn config() -> Config {
        Config {
            map_width: 20,
            map_height: 20,
            map_seed: Some(7),
            turn_check_interval: Duration::from_millis(50),
            ..Config::default()
        }
    }

    pub async fn new() -> Self {
        Self::from_config(Self::config()).await
    }

    pub async fn from_config(config: Config) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let state = AppState::new(config);
        state.spawn_background_tasks();
        let app = build_router(state.clone());

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Give the server a moment to start accepting
        tokio::time::sleep(Duration::from_millis(20)).await;

        Self {
            addr,
            state,
            _shutdown: handle,
        }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }
}

/// Connect a WebSocket client to the given URL.
pub async fn ws_connect(url: &str) -> WsStream {
    let (stream, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    stream
}

pub async fn ws_send_json(stream: &mut WsStream, value: Value) {
    stream
        .send(Message::Text(value.to_string()))
        .await
        .unwrap();
}

/// Next JSON text frame, or `None` once the server closed the socket
pub async fn ws_try_read_json(stream: &mut WsStream) -> Option<Value> {
    loop {
        let frame = tokio::time::timeout(READ_TIMEOUT, stream.next())
            .await
            .expect("timed out waiting for a frame");
        match frame {
            Some(Ok(Message::Text(text))) => return Some(serde_json::from_str(&text).unwrap()),
            Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return None,
            Some(Ok(_)) => continue,
        }
    }
}

pub async fn ws_read_json(stream: &mut WsStream) -> Value {
    ws_try_read_json(stream).await.expect("socket closed")
}

/// Skip frames until one matches
pub async fn ws_read_until(stream: &mut WsStream, pred: impl Fn(&Value) -> bool) -> Value {
    loop {
        let value = ws_read_json(stream).await;
        if pred(&value) {
            return value;
        }
    }
}

/// Join with a plain handshake; returns the socket and the assigned id
pub async fn ws_join(server: &TestServer, name: &str) -> (WsStream, String) {
    ws_join_with(server, serde_json::json!({ "name": name })).await
}

pub async fn ws_join_with(server: &TestServer, handshake: Value) -> (WsStream, String) {
    let mut stream = ws_connect(&server.ws_url()).await;
    ws_send_json(&mut stream, handshake).await;
    let init = ws_read_until(&mut stream, |v| v["type"] == "init").await;
    let id = init["id"].as_str().unwrap().to_string();
    (stream, id)
}

/// Wait for a snapshot naming `id` as turn holder
pub async fn ws_wait_for_turn(stream: &mut WsStream, id: &str) -> Value {
    ws_read_until(stream, |v| v["type"] == "state" && v["current_turn"] == id).await
}
