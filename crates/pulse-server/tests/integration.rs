//! End-to-end tests using a real `WebSocket` client.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use pulse_core::Channel;
use pulse_hub::{Hub, HubConfig};
use pulse_server::{PulseServer, ServerConfig};
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

struct TestServer {
    url: String,
    server: PulseServer,
    handle: Option<JoinHandle<()>>,
}

impl TestServer {
    async fn boot(hub_config: HubConfig) -> Self {
        let hub = Arc::new(Hub::new(hub_config));
        hub.start();
        let server = PulseServer::new(ServerConfig::default(), hub);
        let (addr, handle) = server.listen().await.unwrap();
        Self {
            url: format!("ws://{addr}/ws"),
            server,
            handle: Some(handle),
        }
    }

    fn hub(&self) -> &Arc<Hub> {
        self.server.hub()
    }

    async fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.server.stop(handle).await;
        }
    }

    /// Connect and consume the welcome, returning the connection id.
    async fn connect(&self) -> (WsStream, String) {
        let (mut ws, _) = connect_async(self.url.as_str()).await.unwrap();
        let welcome = recv_json(&mut ws).await;
        assert_eq!(welcome["type"], "data");
        assert_eq!(welcome["channel"], "system");
        assert_eq!(welcome["data"]["action"], "connected");
        let id = welcome["data"]["connectionId"].as_str().unwrap().to_owned();
        (ws, id)
    }
}

fn quiet() -> HubConfig {
    HubConfig {
        feed_enabled: false,
        ..HubConfig::default()
    }
}

async fn send_json(ws: &mut WsStream, value: Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

/// Next text frame as JSON, skipping server pings.
async fn recv_json(ws: &mut WsStream) -> Value {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for message")
            .expect("stream ended")
            .expect("ws error");
        if let Message::Text(text) = msg {
            let value: Value = serde_json::from_str(text.as_str()).unwrap();
            if value["type"] != "ping" {
                return value;
            }
        }
    }
}

/// Wait for the server to close the socket.
async fn expect_closed(ws: &mut WsStream) {
    let closed = timeout(TIMEOUT, async {
        loop {
            match ws.next().await {
                None | Some(Err(_) | Ok(Message::Close(_))) => return,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "socket was not closed");
}

async fn wait_for(mut cond: impl FnMut() -> bool) {
    timeout(TIMEOUT, async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not met in time");
}

#[tokio::test]
async fn subscribe_receives_ack_snapshot_and_broadcast() {
    let mut srv = TestServer::boot(quiet()).await;
    let (mut ws, _) = srv.connect().await;

    send_json(&mut ws, json!({"type": "subscribe", "channel": "market-data"})).await;
    let ack = recv_json(&mut ws).await;
    assert_eq!(ack["data"]["action"], "subscribed");
    assert_eq!(ack["data"]["channel"], "market-data");

    let snapshot = recv_json(&mut ws).await;
    assert_eq!(snapshot["channel"], "market-data");
    assert!(snapshot["data"]["usdt"]["price"].is_number());

    assert_eq!(srv.hub().to_channel(Channel::MarketData, json!({"price": 1})), 1);
    let pushed = recv_json(&mut ws).await;
    assert_eq!(pushed["type"], "data");
    assert_eq!(pushed["channel"], "market-data");
    assert_eq!(pushed["data"], json!({"price": 1}));

    srv.stop().await;
}

#[tokio::test]
async fn protocol_errors_keep_connection_open() {
    let mut srv = TestServer::boot(quiet()).await;
    let (mut ws, _) = srv.connect().await;

    ws.send(Message::Text("definitely not json".into())).await.unwrap();
    let err = recv_json(&mut ws).await;
    assert_eq!(err["type"], "error");
    assert_eq!(err["data"]["message"], "invalid message format");

    send_json(&mut ws, json!({"type": "subscribe", "channel": "not-a-channel"})).await;
    let err = recv_json(&mut ws).await;
    assert_eq!(err["type"], "error");
    assert_eq!(srv.hub().connection_count(), 1);

    send_json(&mut ws, json!({"type": "ping"})).await;
    let pong = recv_json(&mut ws).await;
    assert_eq!(pong["type"], "pong");
    assert!(pong["timestamp"].is_i64());

    srv.stop().await;
}

#[tokio::test]
async fn binary_utf8_frames_are_routed() {
    let mut srv = TestServer::boot(quiet()).await;
    let (mut ws, _) = srv.connect().await;

    let frame = json!({"type": "ping"}).to_string().into_bytes();
    ws.send(Message::Binary(frame.into())).await.unwrap();
    assert_eq!(recv_json(&mut ws).await["type"], "pong");

    srv.stop().await;
}

#[tokio::test]
async fn non_utf8_binary_frame_gets_error_and_stays_open() {
    let mut srv = TestServer::boot(quiet()).await;
    let (mut ws, _) = srv.connect().await;

    ws.send(Message::Binary(vec![0xff, 0xfe, 0x00].into())).await.unwrap();
    let err = recv_json(&mut ws).await;
    assert_eq!(err["type"], "error");
    assert_eq!(err["data"]["message"], "invalid message format");

    send_json(&mut ws, json!({"type": "ping"})).await;
    assert_eq!(recv_json(&mut ws).await["type"], "pong");
    assert_eq!(srv.hub().connection_count(), 1);

    srv.stop().await;
}

#[tokio::test]
async fn user_push_reaches_bound_connection_only() {
    let mut srv = TestServer::boot(quiet()).await;
    let (mut alice, alice_id) = srv.connect().await;
    let (mut other, _) = srv.connect().await;

    for ws in [&mut alice, &mut other] {
        send_json(ws, json!({"type": "subscribe", "channel": "notifications"})).await;
        let _ack = recv_json(ws).await;
    }
    assert!(srv.hub().bind_user(&alice_id.as_str().into(), "alice"));

    assert_eq!(srv.hub().notify("alice", json!({"title": "hello"})), 1);
    let msg = recv_json(&mut alice).await;
    assert_eq!(msg["channel"], "notifications");
    assert_eq!(msg["data"]["title"], "hello");

    // other only sees its own pong, nothing from the push
    send_json(&mut other, json!({"type": "ping"})).await;
    assert_eq!(recv_json(&mut other).await["type"], "pong");

    srv.stop().await;
}

#[tokio::test]
async fn client_disconnect_deregisters() {
    let mut srv = TestServer::boot(quiet()).await;
    let (mut ws, _) = srv.connect().await;
    assert_eq!(srv.hub().connection_count(), 1);

    ws.close(None).await.unwrap();
    let hub = srv.hub().clone();
    wait_for(|| hub.connection_count() == 0).await;

    srv.stop().await;
}

#[tokio::test]
async fn silent_client_is_evicted() {
    let config = HubConfig {
        ping_interval: Duration::from_millis(50),
        liveness_timeout: Duration::from_millis(150),
        feed_interval: Duration::from_secs(60),
        feed_enabled: false,
    };
    let mut srv = TestServer::boot(config).await;
    let (mut ws, _) = srv.connect().await;

    expect_closed(&mut ws).await;
    let hub = srv.hub().clone();
    wait_for(|| hub.connection_count() == 0).await;

    srv.stop().await;
}

#[tokio::test]
async fn answering_client_survives_pings() {
    let config = HubConfig {
        ping_interval: Duration::from_millis(50),
        liveness_timeout: Duration::from_millis(150),
        feed_interval: Duration::from_secs(60),
        feed_enabled: false,
    };
    let mut srv = TestServer::boot(config).await;
    let (mut ws, _) = srv.connect().await;

    // Answer each server ping with a client ping for ~400ms.
    let deadline = tokio::time::Instant::now() + Duration::from_millis(400);
    while tokio::time::Instant::now() < deadline {
        match timeout(Duration::from_millis(100), ws.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => {
                let v: Value = serde_json::from_str(text.as_str()).unwrap();
                if v["type"] == "ping" {
                    send_json(&mut ws, json!({"type": "ping"})).await;
                }
            }
            Ok(Some(Ok(Message::Close(_)))) | Ok(None) => panic!("evicted while answering"),
            _ => {}
        }
    }
    assert_eq!(srv.hub().connection_count(), 1);

    srv.stop().await;
}

#[tokio::test]
async fn feed_pushes_to_subscribers() {
    let config = HubConfig {
        feed_interval: Duration::from_millis(50),
        ..HubConfig::default()
    };
    let mut srv = TestServer::boot(config).await;
    let (mut ws, _) = srv.connect().await;

    send_json(&mut ws, json!({"type": "subscribe", "channel": "system-status"})).await;
    let _ack = recv_json(&mut ws).await;
    let snapshot = recv_json(&mut ws).await;
    assert_eq!(snapshot["channel"], "system-status");

    let tick = recv_json(&mut ws).await;
    assert_eq!(tick["channel"], "system-status");
    assert_eq!(tick["data"]["status"], "healthy");
    assert_eq!(tick["data"]["connections"], 1);

    srv.stop().await;
}

#[tokio::test]
async fn shutdown_closes_live_clients() {
    let mut srv = TestServer::boot(quiet()).await;
    let (mut a, _) = srv.connect().await;
    let (mut b, _) = srv.connect().await;
    assert_eq!(srv.hub().connection_count(), 2);

    srv.stop().await;

    expect_closed(&mut a).await;
    expect_closed(&mut b).await;
    assert_eq!(srv.hub().connection_count(), 0);
}
