#![allow(clippy::unwrap_used)]
// End-to-end tests for the realtime loop against an in-process fake hub
// speaking Engine.IO over a plain WebSocket.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, accept_async};
use tokio_util::sync::CancellationToken;
use url::Url;

use scrybridge_api::{HubEvent, RealtimeConfig, RealtimeHandle, ReconnectConfig, Token, realtime_url};

type Ws = WebSocketStream<TcpStream>;

const OPEN: &str = r#"0{"sid":"s1","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#;

// ── Helpers ─────────────────────────────────────────────────────────

async fn listen() -> (TcpListener, Url) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let base = Url::parse(&format!("http://{addr}/")).unwrap();
    (listener, realtime_url(&base, "/socket.io/").unwrap())
}

async fn accept(listener: &TcpListener) -> Ws {
    let (stream, _) = listener.accept().await.unwrap();
    accept_async(stream).await.unwrap()
}

async fn send(ws: &mut Ws, frame: &str) {
    ws.send(Message::text(frame.to_owned())).await.unwrap();
}

/// Read frames until one equals `expected`, skipping anything else.
async fn expect_frame(ws: &mut Ws, expected: &str) {
    loop {
        let msg = ws.next().await.expect("client hung up").unwrap();
        if let Message::Text(text) = msg {
            if text.as_str() == expected {
                return;
            }
        }
    }
}

/// Run the handshake a well-behaved hub performs.
async fn handshake(ws: &mut Ws) {
    send(ws, OPEN).await;
    expect_frame(ws, r#"40{"token":"tok"}"#).await;
    send(ws, r#"40{"sid":"n1"}"#).await;
    expect_frame(ws, r#"42["getSystemState"]"#).await;
}

fn fast_config(url: Url) -> RealtimeConfig {
    let mut config = RealtimeConfig::new(url);
    config.keepalive_interval = Duration::from_millis(100);
    config.handshake_timeout = Duration::from_secs(2);
    config.reconnect = ReconnectConfig {
        initial_delay: Duration::from_millis(20),
        max_delay: Duration::from_millis(100),
        max_retries: None,
    };
    config
}

async fn next(rx: &mut mpsc::Receiver<HubEvent>) -> HubEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for hub event")
        .expect("event channel closed")
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_full_session_delivers_state_and_keepalive() {
    let (listener, url) = listen().await;

    let hub = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        handshake(&mut ws).await;

        send(
            &mut ws,
            r#"42["systemState",{"cam1":{"interfaces":["Camera"],"on":true}}]"#,
        )
        .await;
        send(&mut ws, r#"42["stateChange","cam1","on",false]"#).await;

        // Engine.IO heartbeat must be answered.
        send(&mut ws, "2").await;
        expect_frame(&mut ws, "3").await;

        // Application keepalive arrives on its own.
        expect_frame(&mut ws, r#"42["ping"]"#).await;
        ws.close(None).await.unwrap();
    });

    let cancel = CancellationToken::new();
    let (handle, mut rx) =
        RealtimeHandle::spawn(fast_config(url), Token::new("tok"), None, cancel.clone());

    assert_eq!(next(&mut rx).await, HubEvent::Connecting { attempt: 0 });
    assert_eq!(next(&mut rx).await, HubEvent::Connected);

    let HubEvent::SystemState(devices) = next(&mut rx).await else {
        panic!("expected SystemState");
    };
    assert_eq!(devices["cam1"]["interfaces"], json!(["Camera"]));

    assert_eq!(
        next(&mut rx).await,
        HubEvent::StateChange {
            device_id: "cam1".into(),
            property: "on".into(),
            value: json!(false),
        }
    );

    assert!(matches!(next(&mut rx).await, HubEvent::Disconnected { .. }));

    hub.await.unwrap();
    handle.shutdown();
    handle.join().await;
}

#[tokio::test]
async fn test_reconnects_after_drop() {
    let (listener, url) = listen().await;

    let hub = tokio::spawn(async move {
        // First connection dies right after the Engine.IO open.
        let mut first = accept(&listener).await;
        send(&mut first, OPEN).await;
        drop(first);

        let mut second = accept(&listener).await;
        handshake(&mut second).await;
        send(&mut second, r#"42["systemState",{"lamp":{"on":false}}]"#).await;
        // Hold the connection open until the client goes away.
        while second.next().await.is_some() {}
    });

    let cancel = CancellationToken::new();
    let (handle, mut rx) =
        RealtimeHandle::spawn(fast_config(url), Token::new("tok"), None, cancel.clone());

    assert_eq!(next(&mut rx).await, HubEvent::Connecting { attempt: 0 });
    assert!(matches!(next(&mut rx).await, HubEvent::Disconnected { .. }));
    assert_eq!(next(&mut rx).await, HubEvent::Connecting { attempt: 1 });
    assert_eq!(next(&mut rx).await, HubEvent::Connected);
    assert!(matches!(next(&mut rx).await, HubEvent::SystemState(_)));

    handle.shutdown();
    handle.join().await;
    hub.await.unwrap();
}

#[tokio::test]
async fn test_connect_error_gives_up_at_retry_limit() {
    let (listener, url) = listen().await;

    let hub = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        send(&mut ws, OPEN).await;
        expect_frame(&mut ws, r#"40{"token":"tok"}"#).await;
        send(&mut ws, r#"44{"message":"Not authorized"}"#).await;
        while ws.next().await.is_some() {}
    });

    let mut config = fast_config(url);
    config.reconnect.max_retries = Some(0);

    let (handle, mut rx) =
        RealtimeHandle::spawn(config, Token::new("tok"), None, CancellationToken::new());

    assert_eq!(next(&mut rx).await, HubEvent::Connecting { attempt: 0 });
    match next(&mut rx).await {
        HubEvent::Disconnected { reason } => {
            assert!(reason.contains("Not authorized"), "reason: {reason}");
        }
        other => panic!("expected Disconnected, got {other:?}"),
    }

    // Retry budget exhausted: the loop ends and closes the channel.
    let end = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
    assert!(end.is_none());

    handle.join().await;
    hub.await.unwrap();
}
