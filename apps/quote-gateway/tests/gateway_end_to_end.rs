//! Gateway End-to-End Tests
//!
//! Runs the full gateway against a fake feed bridge and talks to it with
//! real WebSocket clients.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::collections::HashMap;
use std::time::Duration;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, accept_async, connect_async};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use quote_gateway::infrastructure::http::router;
use quote_gateway::{AppState, Gateway, GatewayConfig};

const WAIT: Duration = Duration::from_secs(5);

type Bridge = WebSocketStream<TcpStream>;
type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

// =============================================================================
// Harness
// =============================================================================

struct Harness {
    bridge: Bridge,
    state: AppState,
    ws_url: String,
    cancel: CancellationToken,
    _watchlist_dir: tempfile::TempDir,
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn start() -> Harness {
    let bridge_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let bridge_url = format!("ws://{}", bridge_listener.local_addr().unwrap());
    let watchlist_dir = tempfile::tempdir().unwrap();

    let vars: HashMap<&str, String> = HashMap::from([
        ("QUOTE_FEED_APP_KEY", "key".to_string()),
        ("QUOTE_FEED_APP_SECRET", "secret".to_string()),
        ("QUOTE_FEED_ACCESS_TOKEN", "token".to_string()),
        ("QUOTE_FEED_URL", bridge_url),
        ("QUOTE_FEED_COMMAND_TIMEOUT_MS", "3000".to_string()),
        (
            "WATCHLIST_PATH",
            watchlist_dir
                .path()
                .join("watchlist.json")
                .display()
                .to_string(),
        ),
    ]);
    let config = GatewayConfig::from_lookup(|key: &str| vars.get(key).cloned()).unwrap();

    let cancel = CancellationToken::new();
    let gateway = Gateway::new(config, cancel.clone());
    let state = gateway.state().clone();

    let http_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let ws_url = format!("ws://{}/ws/quotes", http_listener.local_addr().unwrap());
    tokio::spawn(gateway.serve(http_listener));

    let (stream, _) = timeout(WAIT, bridge_listener.accept())
        .await
        .unwrap()
        .unwrap();
    let mut bridge = accept_async(stream).await.unwrap();
    let auth = recv_json(&mut bridge).await;
    assert_eq!(auth["action"], "auth");
    assert_eq!(auth["access_token"], "token");
    send_json(&mut bridge, json!({"type": "ack", "id": auth["id"].clone()})).await;

    wait_until(|| state.feed.is_connected()).await;

    Harness {
        bridge,
        state,
        ws_url,
        cancel,
        _watchlist_dir: watchlist_dir,
    }
}

async fn wait_until(condition: impl Fn() -> bool) {
    timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

async fn recv_json<S>(stream: &mut WebSocketStream<S>) -> Value
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    loop {
        match timeout(WAIT, stream.next()).await.unwrap() {
            Some(Ok(Message::Text(text))) => return serde_json::from_str(&text).unwrap(),
            Some(Ok(_)) => {}
            other => panic!("stream ended: {other:?}"),
        }
    }
}

async fn send_json<S>(stream: &mut WebSocketStream<S>, value: Value)
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    stream
        .send(Message::Text(value.to_string().into()))
        .await
        .unwrap();
}

async fn connect_client(harness: &Harness) -> Client {
    let before = harness.state.hub.connection_count();
    let (client, _) = connect_async(harness.ws_url.as_str()).await.unwrap();
    wait_until(|| harness.state.hub.connection_count() > before).await;
    client
}

/// Ack every command the bridge receives until `count` were acked.
async fn ack_commands(bridge: &mut Bridge, count: usize) -> Vec<Value> {
    let mut frames = Vec::with_capacity(count);
    for _ in 0..count {
        let frame = recv_json(bridge).await;
        send_json(bridge, json!({"type": "ack", "id": frame["id"].clone()})).await;
        frames.push(frame);
    }
    frames
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn subscribe_then_receive_normalized_quote() {
    let mut harness = start().await;
    let mut watcher = connect_client(&harness).await;
    let mut subscriber = connect_client(&harness).await;

    send_json(
        &mut subscriber,
        json!({"action": "subscribe", "symbols": ["AAA.US"]}),
    )
    .await;

    let frames = ack_commands(&mut harness.bridge, 2).await;
    assert_eq!(
        frames[0]["action"], "subscribe",
        "primary channels go first"
    );
    assert_eq!(frames[0]["symbols"], json!(["AAA.US"]));
    assert_eq!(frames[0]["channels"], json!(["quote", "trade", "depth"]));
    assert_eq!(frames[1]["action"], "subscribe_candlesticks");
    assert_eq!(frames[1]["period"], "day");

    assert_eq!(
        recv_json(&mut subscriber).await,
        json!({
            "type": "ack",
            "action": "subscribe",
            "symbols": ["AAA.US"],
            "subscribed": ["AAA.US"]
        })
    );

    send_json(
        &mut harness.bridge,
        json!({
            "type": "push",
            "kind": "quote",
            "symbol": "AAA.US",
            "event": {"last_done": "123.456", "prev_close": "120.000", "volume": 1000}
        }),
    )
    .await;

    for client in [&mut subscriber, &mut watcher] {
        let envelope = recv_json(client).await;
        assert_eq!(envelope["type"], "quote");
        assert_eq!(envelope["symbol"], "AAA.US");
        assert_eq!(envelope["data"]["last_done"], "123.456");
        assert_eq!(envelope["data"]["change"], "3.456");
        assert_eq!(envelope["data"]["change_pct"], "2.88");
        assert_eq!(envelope["data"]["is_up"], true);
        assert_eq!(envelope["data"]["volume"], 1000);
    }
}

#[tokio::test]
async fn repeated_subscribe_sends_no_upstream_command() {
    let mut harness = start().await;
    let mut client = connect_client(&harness).await;

    send_json(&mut client, json!({"action": "subscribe", "symbols": ["AAA.US"]})).await;
    ack_commands(&mut harness.bridge, 2).await;
    recv_json(&mut client).await;

    send_json(
        &mut client,
        json!({"action": "subscribe", "symbols": ["AAA.US", "BBB.US"]}),
    )
    .await;
    let frames = ack_commands(&mut harness.bridge, 2).await;
    assert_eq!(frames[0]["symbols"], json!(["BBB.US"]));
    assert_eq!(frames[1]["symbol"], "BBB.US");

    let reply = recv_json(&mut client).await;
    assert_eq!(reply["subscribed"], json!(["AAA.US", "BBB.US"]));
}

#[tokio::test]
async fn malformed_command_is_answered_only_to_sender() {
    let mut harness = start().await;
    let mut sender = connect_client(&harness).await;
    let mut bystander = connect_client(&harness).await;

    sender
        .send(Message::Text("{not json".into()))
        .await
        .unwrap();
    let reply = recv_json(&mut sender).await;
    assert_eq!(reply["type"], "error");

    send_json(&mut sender, json!({"action": "dance", "symbols": ["AAA.US"]})).await;
    assert_eq!(
        recv_json(&mut sender).await,
        json!({"type": "error", "message": "unknown action: dance"})
    );

    send_json(
        &mut harness.bridge,
        json!({"type": "push", "kind": "depth", "symbol": "AAA.US", "event": {}}),
    )
    .await;
    let first = recv_json(&mut bystander).await;
    assert_eq!(first["type"], "depth", "bystander saw no error replies");
    assert_eq!(recv_json(&mut sender).await["type"], "depth");
}

#[tokio::test]
async fn upstream_rejection_keeps_set_unchanged() {
    let mut harness = start().await;
    let mut client = connect_client(&harness).await;

    send_json(&mut client, json!({"action": "subscribe", "symbols": ["BAD.US"]})).await;
    let frame = recv_json(&mut harness.bridge).await;
    send_json(
        &mut harness.bridge,
        json!({"type": "error", "id": frame["id"].clone(), "code": 301_600, "message": "invalid symbol"}),
    )
    .await;

    let reply = recv_json(&mut client).await;
    assert_eq!(reply["type"], "error");
    assert_eq!(
        reply["message"],
        "upstream rejected command (301600): invalid symbol"
    );
    assert!(harness.state.registry.is_empty());
}

#[tokio::test]
async fn closed_client_is_removed_and_others_keep_receiving() {
    let mut harness = start().await;
    let mut leaving = connect_client(&harness).await;
    let mut staying = connect_client(&harness).await;

    leaving.close(None).await.unwrap();
    wait_until(|| harness.state.hub.connection_count() == 1).await;

    send_json(
        &mut harness.bridge,
        json!({
            "type": "push",
            "kind": "trades",
            "symbol": "AAA.US",
            "event": {"trades": [{"price": "9.99", "volume": 5, "direction": "TradeDirection.Down"}]}
        }),
    )
    .await;

    let envelope = recv_json(&mut staying).await;
    assert_eq!(envelope["type"], "trades");
    assert_eq!(envelope["data"]["trades"][0]["is_up"], false);
}

#[tokio::test]
async fn health_reflects_subscriptions_and_clients() {
    let mut harness = start().await;
    let mut client = connect_client(&harness).await;

    send_json(&mut client, json!({"action": "subscribe", "symbols": ["AAA.US"]})).await;
    ack_commands(&mut harness.bridge, 2).await;
    recv_json(&mut client).await;

    let response = router(harness.state.clone(), &[])
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();

    assert_eq!(body["status"], "ok");
    assert_eq!(body["subscribed"], json!(["AAA.US"]));
    assert_eq!(body["ws_clients"], 1);
    assert_eq!(body["feed"]["connected"], true);
}
