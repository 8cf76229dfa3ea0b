//! Realtime hub event stream with auto-reconnect.
//!
//! Connects to the hub's Engine.IO endpoint over a WebSocket, joins the
//! default Socket.IO namespace with the login token, requests a full state
//! dump and then streams parsed [`HubEvent`]s through an `mpsc` channel.
//! Reconnection uses exponential backoff + jitter.
//!
//! The channel is bounded and the reader awaits capacity, so a slow
//! consumer applies backpressure to the socket instead of losing events.
//!
//! # Example
//!
//! ```rust,ignore
//! use scrybridge_api::realtime::{RealtimeConfig, RealtimeHandle, HubEvent};
//!
//! let config = RealtimeConfig::new(realtime_url(&base, DEFAULT_ENGINE_IO_PATH)?);
//! let (handle, mut events) = RealtimeHandle::spawn(config, token, None, cancel.clone());
//!
//! while let Some(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! handle.shutdown();
//! ```

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use serde_json::{Map, Value, json};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder, Message};
use tokio_tungstenite::{Connector, connect_async_tls_with_config};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::auth::Token;
use crate::engineio::{DEFAULT_NAMESPACE, EnginePacket, SocketMessage, SocketPacket};
use crate::error::Error;

/// Engine.IO endpoint path on a Scrypted hub.
pub const DEFAULT_ENGINE_IO_PATH: &str = "/endpoint/@scrypted/core/engine.io/api/";

const EVENT_CHANNEL_CAPACITY: usize = 1024;

const SYSTEM_STATE_REQUEST: &str = "getSystemState";
const SYSTEM_STATE_EVENT: &str = "systemState";
const STATE_CHANGE_EVENT: &str = "stateChange";
const KEEPALIVE_EVENT: &str = "ping";

// ── HubEvent ─────────────────────────────────────────────────────────

/// Everything the realtime loop reports to its consumer.
///
/// Connection lifecycle transitions are delivered in-band, in order with
/// the data events they bracket.
#[derive(Debug, Clone, PartialEq)]
pub enum HubEvent {
    /// A connection attempt is starting. `attempt` counts consecutive failures.
    Connecting { attempt: u32 },
    /// Namespace joined; a full state request has been sent.
    Connected,
    /// The connection ended, cleanly or not.
    Disconnected { reason: String },
    /// Full state dump: device id → attribute object.
    SystemState(Map<String, Value>),
    /// A single property change on a single device.
    StateChange {
        device_id: String,
        property: String,
        value: Value,
    },
}

// ── Configuration ────────────────────────────────────────────────────

/// Exponential backoff configuration for reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Maximum consecutive failed attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

/// Settings for one realtime stream.
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Full `ws://` / `wss://` URL, see [`realtime_url`].
    pub url: Url,
    /// Interval between application-level `ping` events while connected.
    pub keepalive_interval: Duration,
    /// How long to wait for the Engine.IO open + namespace acknowledgement.
    pub handshake_timeout: Duration,
    pub reconnect: ReconnectConfig,
}

impl RealtimeConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            keepalive_interval: Duration::from_secs(30),
            handshake_timeout: Duration::from_secs(10),
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Build the WebSocket URL for the hub's Engine.IO endpoint.
pub fn realtime_url(base: &Url, engine_io_path: &str) -> Result<Url, Error> {
    let mut url = base.join(engine_io_path)?;
    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => {
            return Err(Error::WebSocketConnect(format!(
                "unsupported hub URL scheme '{other}'"
            )));
        }
    };
    url.set_scheme(scheme)
        .map_err(|()| Error::WebSocketConnect(format!("cannot use scheme {scheme} for {base}")))?;
    url.set_query(Some("EIO=4&transport=websocket"));
    Ok(url)
}

// ── RealtimeHandle ───────────────────────────────────────────────────

/// Handle to a running realtime stream.
///
/// The background task owns the socket; the handle only signals it.
pub struct RealtimeHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl RealtimeHandle {
    /// Spawn the connection loop and return the event receiver.
    ///
    /// Returns immediately; the first connection attempt happens on the
    /// spawned task. The loop exits when `cancel` fires, when the receiver
    /// is dropped, or when `max_retries` is exhausted.
    pub fn spawn(
        config: RealtimeConfig,
        token: Token,
        connector: Option<Connector>,
        cancel: CancellationToken,
    ) -> (Self, mpsc::Receiver<HubEvent>) {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            session_loop(config, token, connector, event_tx, task_cancel).await;
        });

        (Self { cancel, task }, event_rx)
    }

    /// Signal the background task to close the socket and stop.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Wait for the background task to finish.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            warn!(error = %e, "realtime task panicked");
        }
    }
}

// ── Background reconnection loop ─────────────────────────────────────

/// Main loop: connect → read → on end, backoff → reconnect.
///
/// A single task runs every attempt in sequence, so connection attempts
/// never overlap.
async fn session_loop(
    config: RealtimeConfig,
    token: Token,
    connector: Option<Connector>,
    event_tx: mpsc::Sender<HubEvent>,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;

    loop {
        if event_tx.send(HubEvent::Connecting { attempt }).await.is_err() {
            break;
        }

        let mut reached_connected = false;
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = run_session(&config, &token, connector.clone(), &event_tx, &cancel, &mut reached_connected) => result,
        };

        if cancel.is_cancelled() || event_tx.is_closed() {
            break;
        }

        // A session that made it to `connected` earns a fresh backoff.
        if reached_connected {
            attempt = 0;
        }

        let reason = match result {
            Ok(()) => {
                info!("realtime connection closed by hub, reconnecting");
                "connection closed".to_owned()
            }
            Err(e) => {
                warn!(error = %e, attempt, transient = e.is_transient(), "realtime connection error");
                e.to_string()
            }
        };

        if event_tx.send(HubEvent::Disconnected { reason }).await.is_err() {
            break;
        }

        if let Some(max) = config.reconnect.max_retries {
            if attempt >= max {
                tracing::error!(max_retries = max, "realtime reconnection limit reached, giving up");
                break;
            }
        }

        let delay = calculate_backoff(attempt, &config.reconnect);
        info!(
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            attempt,
            "waiting before reconnect"
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }

        attempt = attempt.saturating_add(1);
    }

    debug!("realtime loop exiting");
}

// ── Single connection lifecycle ──────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    AwaitOpen,
    AwaitNamespace,
    Connected,
}

/// Establish one connection and pump frames until it ends.
///
/// `Ok(())` means the hub closed the connection (or we were cancelled);
/// `Err` is a transport or protocol failure.
async fn run_session(
    config: &RealtimeConfig,
    token: &Token,
    connector: Option<Connector>,
    event_tx: &mpsc::Sender<HubEvent>,
    cancel: &CancellationToken,
    reached_connected: &mut bool,
) -> Result<(), Error> {
    info!(url = %config.url, "connecting to hub event stream");

    let uri: tungstenite::http::Uri = config
        .url
        .as_str()
        .parse()
        .map_err(|e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()))?;

    let request = ClientRequestBuilder::new(uri)
        .with_header("Authorization", token.bearer_header())
        .with_header("Cookie", token.cookie_header());

    let (ws_stream, _response) = connect_async_tls_with_config(request, None, false, connector)
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

    debug!("WebSocket upgraded, awaiting Engine.IO handshake");

    let (mut write, mut read) = ws_stream.split();
    let mut phase = Phase::AwaitOpen;

    let handshake_deadline = tokio::time::sleep(config.handshake_timeout);
    tokio::pin!(handshake_deadline);

    let mut keepalive = tokio::time::interval_at(
        Instant::now() + config.keepalive_interval,
        config.keepalive_interval,
    );
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                return Ok(());
            }
            () = &mut handshake_deadline, if phase != Phase::Connected => {
                return Err(Error::Timeout {
                    timeout_secs: config.handshake_timeout.as_secs(),
                });
            }
            _ = keepalive.tick(), if phase == Phase::Connected => {
                trace!("sending keepalive");
                send_frame(&mut write, SocketMessage::event(KEEPALIVE_EVENT, Vec::new()).to_frame()).await?;
            }
            frame = read.next() => {
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Ping(_))) => {
                        // tungstenite handles pong replies automatically
                        trace!("WebSocket ping");
                        continue;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        if let Some(ref cf) = frame {
                            info!(code = %cf.code, reason = %cf.reason, "WebSocket close frame received");
                        } else {
                            info!("WebSocket close frame received (no payload)");
                        }
                        return Ok(());
                    }
                    Some(Err(e)) => return Err(Error::WebSocketConnect(e.to_string())),
                    None => {
                        info!("WebSocket stream ended");
                        return Ok(());
                    }
                    // Binary, Pong, Frame -- ignore
                    Some(Ok(_)) => continue,
                };

                match EnginePacket::decode(&text)? {
                    EnginePacket::Open(open) => {
                        debug!(sid = %open.sid, ping_interval = open.ping_interval, "Engine.IO open");
                        if phase == Phase::AwaitOpen {
                            let connect = SocketMessage::connect(json!({ "token": token.expose() }));
                            send_frame(&mut write, connect.to_frame()).await?;
                            phase = Phase::AwaitNamespace;
                        }
                    }
                    EnginePacket::Ping(data) => {
                        send_frame(&mut write, EnginePacket::Pong(data).encode()).await?;
                    }
                    EnginePacket::Close => {
                        info!("Engine.IO close packet received");
                        return Ok(());
                    }
                    EnginePacket::Message(payload) => {
                        let msg = match SocketMessage::decode(&payload) {
                            Ok(msg) => msg,
                            Err(e) => {
                                debug!(error = %e, "skipping undecodable Socket.IO packet");
                                continue;
                            }
                        };
                        if msg.namespace != DEFAULT_NAMESPACE {
                            trace!(namespace = %msg.namespace, "ignoring packet for other namespace");
                            continue;
                        }

                        match msg.packet {
                            SocketPacket::Connect(_) => {
                                if phase == Phase::AwaitNamespace {
                                    phase = Phase::Connected;
                                    *reached_connected = true;
                                    info!("hub event stream connected");
                                    if event_tx.send(HubEvent::Connected).await.is_err() {
                                        return Ok(());
                                    }
                                    let request = SocketMessage::event(SYSTEM_STATE_REQUEST, Vec::new());
                                    send_frame(&mut write, request.to_frame()).await?;
                                    keepalive.reset();
                                }
                            }
                            SocketPacket::ConnectError(data) => {
                                let message = data
                                    .get("message")
                                    .and_then(Value::as_str)
                                    .map_or_else(|| data.to_string(), String::from);
                                return Err(Error::ConnectRejected { message });
                            }
                            SocketPacket::Disconnect => {
                                info!("hub closed the Socket.IO namespace");
                                return Ok(());
                            }
                            SocketPacket::Event { name, args, .. } => {
                                if let Some(event) = event_from_socket(&name, args) {
                                    if event_tx.send(event).await.is_err() {
                                        return Ok(());
                                    }
                                }
                            }
                            SocketPacket::Ack { id, .. } => trace!(id, "ignoring ack"),
                        }
                    }
                    EnginePacket::Pong(_) | EnginePacket::Upgrade | EnginePacket::Noop => {}
                }
            }
        }
    }
}

async fn send_frame<S>(write: &mut S, frame: String) -> Result<(), Error>
where
    S: futures_util::Sink<Message, Error = tungstenite::Error> + Unpin,
{
    write
        .send(Message::Text(frame.into()))
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))
}

// ── Event parsing ────────────────────────────────────────────────────

/// Map a Socket.IO event onto a [`HubEvent`].
///
/// Unknown events and malformed arguments yield `None`.
fn event_from_socket(name: &str, args: Vec<Value>) -> Option<HubEvent> {
    match name {
        SYSTEM_STATE_EVENT => match args.into_iter().next() {
            Some(Value::Object(devices)) => Some(HubEvent::SystemState(devices)),
            other => {
                debug!(payload = ?other, "systemState without an object payload");
                None
            }
        },
        STATE_CHANGE_EVENT => {
            let mut args = args.into_iter();
            let (Some(Value::String(device_id)), Some(Value::String(property))) =
                (args.next(), args.next())
            else {
                debug!("stateChange without string id and property");
                return None;
            };
            let value = args.next().unwrap_or(Value::Null);
            Some(HubEvent::StateChange {
                device_id,
                property,
                value,
            })
        }
        other => {
            trace!(event = other, "ignoring hub event");
            None
        }
    }
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) * (1 ± 0.25)`
fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt.min(30)).unwrap_or(30);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    let jitter_factor = rand::thread_rng().gen_range(0.75..=1.25);
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter)
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn default_reconnect_config() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert!(config.max_retries.is_none());
    }

    #[test]
    fn backoff_increases_exponentially() {
        let config = ReconnectConfig::default();

        let d0 = calculate_backoff(0, &config);
        let d1 = calculate_backoff(1, &config);
        let d2 = calculate_backoff(2, &config);

        assert!(d1 > d0, "d1 ({d1:?}) should be greater than d0 ({d0:?})");
        assert!(d2 > d1, "d2 ({d2:?}) should be greater than d1 ({d1:?})");
    }

    #[test]
    fn backoff_caps_at_max_delay() {
        let config = ReconnectConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            max_retries: None,
        };

        // With jitter factor up to 1.25, max effective is 12.5s
        for attempt in [10, 31, u32::MAX] {
            let delay = calculate_backoff(attempt, &config);
            assert!(
                delay <= Duration::from_millis(12_500),
                "delay at attempt {attempt} ({delay:?}) should be capped near max_delay"
            );
        }
    }

    #[test]
    fn backoff_jitter_stays_within_a_quarter() {
        let config = ReconnectConfig::default();
        let delays: Vec<Duration> = (0..64).map(|_| calculate_backoff(2, &config)).collect();

        for delay in &delays {
            assert!(
                (Duration::from_secs(3)..=Duration::from_secs(5)).contains(delay),
                "{delay:?} outside 4s +/- 25%"
            );
        }
        assert!(
            delays.iter().any(|d| *d != delays[0]),
            "64 draws produced one delay"
        );
    }

    #[test]
    fn realtime_url_switches_scheme_and_adds_query() {
        let base = Url::parse("https://hub.local:10443/").unwrap();
        let url = realtime_url(&base, DEFAULT_ENGINE_IO_PATH).unwrap();
        assert_eq!(
            url.as_str(),
            "wss://hub.local:10443/endpoint/@scrypted/core/engine.io/api/?EIO=4&transport=websocket"
        );

        let plain = realtime_url(&Url::parse("http://127.0.0.1:8080").unwrap(), "/socket.io/").unwrap();
        assert_eq!(plain.as_str(), "ws://127.0.0.1:8080/socket.io/?EIO=4&transport=websocket");
    }

    #[test]
    fn realtime_url_rejects_other_schemes() {
        let base = Url::parse("ftp://hub.local/").unwrap();
        assert!(realtime_url(&base, DEFAULT_ENGINE_IO_PATH).is_err());
    }

    #[test]
    fn parses_system_state() {
        let event = event_from_socket(
            "systemState",
            vec![json!({"cam1": {"interfaces": ["Camera"], "on": true}})],
        )
        .unwrap();
        let HubEvent::SystemState(devices) = event else {
            panic!("expected SystemState");
        };
        assert_eq!(devices["cam1"]["on"], json!(true));
    }

    #[test]
    fn parses_state_change() {
        let event = event_from_socket("stateChange", vec![json!("cam1"), json!("on"), json!(false)]);
        assert_eq!(
            event,
            Some(HubEvent::StateChange {
                device_id: "cam1".into(),
                property: "on".into(),
                value: json!(false),
            })
        );
    }

    #[test]
    fn state_change_without_value_is_null() {
        let event = event_from_socket("stateChange", vec![json!("lamp"), json!("brightness")]);
        assert_eq!(
            event,
            Some(HubEvent::StateChange {
                device_id: "lamp".into(),
                property: "brightness".into(),
                value: Value::Null,
            })
        );
    }

    #[test]
    fn malformed_events_are_dropped() {
        assert_eq!(event_from_socket("systemState", vec![json!([1, 2])]), None);
        assert_eq!(event_from_socket("systemState", vec![]), None);
        assert_eq!(event_from_socket("stateChange", vec![json!("cam1")]), None);
        assert_eq!(
            event_from_socket("stateChange", vec![json!(1), json!("on"), json!(true)]),
            None
        );
        assert_eq!(event_from_socket("pong", vec![]), None);
    }
}
