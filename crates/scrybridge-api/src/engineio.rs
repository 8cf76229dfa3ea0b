//! Engine.IO v4 / Socket.IO v5 text framing.
//!
//! The hub's realtime endpoint speaks Socket.IO over a WebSocket. Each
//! text frame is one Engine.IO packet (`<type><payload>`); Engine.IO
//! `message` packets carry one Socket.IO packet
//! (`<type>[<namespace>,][<ack id>][<json>]`).
//!
//! Binary attachments are not used by the hub's state events and are
//! rejected as protocol errors.

use serde::Deserialize;
use serde_json::Value;

use crate::error::Error;

/// The default Socket.IO namespace.
pub const DEFAULT_NAMESPACE: &str = "/";

// ── Engine.IO ────────────────────────────────────────────────────────

/// Handshake payload of the Engine.IO `open` packet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenInfo {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    #[serde(default = "default_ping_interval")]
    pub ping_interval: u64,
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout: u64,
    #[serde(default)]
    pub max_payload: Option<u64>,
}

fn default_ping_interval() -> u64 {
    25_000
}

fn default_ping_timeout() -> u64 {
    20_000
}

/// A single Engine.IO packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnginePacket {
    Open(OpenInfo),
    Close,
    Ping(String),
    Pong(String),
    Message(String),
    Upgrade,
    Noop,
}

impl EnginePacket {
    /// Decode a WebSocket text frame.
    pub fn decode(text: &str) -> Result<Self, Error> {
        let mut chars = text.chars();
        let kind = chars
            .next()
            .ok_or_else(|| Error::Protocol("empty Engine.IO frame".into()))?;
        let payload = chars.as_str();

        match kind {
            '0' => serde_json::from_str(payload).map(Self::Open).map_err(|e| {
                Error::Deserialization {
                    message: format!("invalid Engine.IO open packet: {e}"),
                    body: payload.to_owned(),
                }
            }),
            '1' => Ok(Self::Close),
            '2' => Ok(Self::Ping(payload.to_owned())),
            '3' => Ok(Self::Pong(payload.to_owned())),
            '4' => Ok(Self::Message(payload.to_owned())),
            '5' => Ok(Self::Upgrade),
            '6' => Ok(Self::Noop),
            other => Err(Error::Protocol(format!(
                "unknown Engine.IO packet type '{other}'"
            ))),
        }
    }

    /// Encode for sending. `Open` is server-only and encodes as a bare `0`.
    pub fn encode(&self) -> String {
        match self {
            Self::Open(_) => "0".into(),
            Self::Close => "1".into(),
            Self::Ping(data) => format!("2{data}"),
            Self::Pong(data) => format!("3{data}"),
            Self::Message(data) => format!("4{data}"),
            Self::Upgrade => "5".into(),
            Self::Noop => "6".into(),
        }
    }
}

// ── Socket.IO ────────────────────────────────────────────────────────

/// A Socket.IO packet, minus its namespace.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect(Option<Value>),
    Disconnect,
    Event {
        name: String,
        args: Vec<Value>,
        ack: Option<u64>,
    },
    Ack {
        id: u64,
        args: Vec<Value>,
    },
    ConnectError(Value),
}

/// A Socket.IO packet addressed to a namespace.
#[derive(Debug, Clone, PartialEq)]
pub struct SocketMessage {
    pub namespace: String,
    pub packet: SocketPacket,
}

impl SocketMessage {
    /// A packet on the default namespace.
    pub fn new(packet: SocketPacket) -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.into(),
            packet,
        }
    }

    /// `CONNECT` to the default namespace with an auth payload.
    pub fn connect(auth: Value) -> Self {
        Self::new(SocketPacket::Connect(Some(auth)))
    }

    /// Fire-and-forget event on the default namespace.
    pub fn event(name: impl Into<String>, args: Vec<Value>) -> Self {
        Self::new(SocketPacket::Event {
            name: name.into(),
            args,
            ack: None,
        })
    }

    /// Decode the payload of an Engine.IO `message` packet.
    pub fn decode(payload: &str) -> Result<Self, Error> {
        let mut rest = payload;
        let kind = take_char(&mut rest)
            .ok_or_else(|| Error::Protocol("empty Socket.IO packet".into()))?;

        if matches!(kind, '5' | '6') {
            return Err(Error::Protocol(
                "binary Socket.IO packets are not supported".into(),
            ));
        }

        let namespace = if rest.starts_with('/') {
            let (nsp, tail) = rest.split_once(',').unwrap_or((rest, ""));
            rest = tail;
            nsp.to_owned()
        } else {
            DEFAULT_NAMESPACE.to_owned()
        };

        let digits = rest.chars().take_while(char::is_ascii_digit).count();
        let (ack_digits, json) = rest.split_at(digits);
        let ack = if ack_digits.is_empty() {
            None
        } else {
            Some(ack_digits.parse::<u64>().map_err(|e| {
                Error::Protocol(format!("invalid Socket.IO ack id '{ack_digits}': {e}"))
            })?)
        };

        let data = if json.is_empty() {
            None
        } else {
            Some(
                serde_json::from_str::<Value>(json).map_err(|e| Error::Deserialization {
                    message: format!("invalid Socket.IO payload: {e}"),
                    body: json.to_owned(),
                })?,
            )
        };

        let packet = match kind {
            '0' => SocketPacket::Connect(data),
            '1' => SocketPacket::Disconnect,
            '2' => {
                let Some(Value::Array(mut items)) = data else {
                    return Err(Error::Protocol("Socket.IO event without array payload".into()));
                };
                if items.is_empty() {
                    return Err(Error::Protocol("Socket.IO event without a name".into()));
                }
                let Value::String(name) = items.remove(0) else {
                    return Err(Error::Protocol("Socket.IO event name is not a string".into()));
                };
                SocketPacket::Event {
                    name,
                    args: items,
                    ack,
                }
            }
            '3' => {
                let id = ack.ok_or_else(|| Error::Protocol("Socket.IO ack without id".into()))?;
                let args = match data {
                    Some(Value::Array(items)) => items,
                    Some(other) => vec![other],
                    None => Vec::new(),
                };
                SocketPacket::Ack { id, args }
            }
            '4' => SocketPacket::ConnectError(data.unwrap_or(Value::Null)),
            other => {
                return Err(Error::Protocol(format!(
                    "unknown Socket.IO packet type '{other}'"
                )));
            }
        };

        Ok(Self { namespace, packet })
    }

    /// Encode as the payload of an Engine.IO `message` packet.
    pub fn encode(&self) -> String {
        let nsp = if self.namespace == DEFAULT_NAMESPACE {
            String::new()
        } else {
            format!("{},", self.namespace)
        };

        match &self.packet {
            SocketPacket::Connect(auth) => match auth {
                Some(v) => format!("0{nsp}{v}"),
                None => format!("0{nsp}"),
            },
            SocketPacket::Disconnect => format!("1{nsp}"),
            SocketPacket::Event { name, args, ack } => {
                let mut items = Vec::with_capacity(args.len() + 1);
                items.push(Value::String(name.clone()));
                items.extend(args.iter().cloned());
                let ack = ack.map(|id| id.to_string()).unwrap_or_default();
                format!("2{nsp}{ack}{}", Value::Array(items))
            }
            SocketPacket::Ack { id, args } => {
                format!("3{nsp}{id}{}", Value::Array(args.clone()))
            }
            SocketPacket::ConnectError(data) => format!("4{nsp}{data}"),
        }
    }

    /// Encode wrapped in an Engine.IO `message` packet, ready for the wire.
    pub fn to_frame(&self) -> String {
        EnginePacket::Message(self.encode()).encode()
    }
}

fn take_char(s: &mut &str) -> Option<char> {
    let mut chars = s.chars();
    let c = chars.next()?;
    *s = chars.as_str();
    Some(c)
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn decode_open_packet() {
        let packet = EnginePacket::decode(
            r#"0{"sid":"abc","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#,
        )
        .unwrap();
        let EnginePacket::Open(info) = packet else {
            panic!("expected open packet, got {packet:?}");
        };
        assert_eq!(info.sid, "abc");
        assert_eq!(info.ping_interval, 25_000);
        assert_eq!(info.max_payload, Some(1_000_000));
    }

    #[test]
    fn ping_pong_echo_payload() {
        assert_eq!(
            EnginePacket::decode("2probe").unwrap(),
            EnginePacket::Ping("probe".into())
        );
        assert_eq!(EnginePacket::Pong("probe".into()).encode(), "3probe");
        assert_eq!(EnginePacket::decode("2").unwrap(), EnginePacket::Ping(String::new()));
    }

    #[test]
    fn unknown_engine_packet_is_protocol_error() {
        assert!(matches!(EnginePacket::decode("9"), Err(Error::Protocol(_))));
        assert!(matches!(EnginePacket::decode(""), Err(Error::Protocol(_))));
    }

    #[test]
    fn decode_state_change_event() {
        let msg = SocketMessage::decode(r#"2["stateChange","cam1","on",false]"#).unwrap();
        assert_eq!(msg.namespace, "/");
        assert_eq!(
            msg.packet,
            SocketPacket::Event {
                name: "stateChange".into(),
                args: vec![json!("cam1"), json!("on"), json!(false)],
                ack: None,
            }
        );
    }

    #[test]
    fn decode_event_with_namespace_and_ack() {
        let msg = SocketMessage::decode(r#"2/admin,13["systemState",{}]"#).unwrap();
        assert_eq!(msg.namespace, "/admin");
        let SocketPacket::Event { name, ack, .. } = msg.packet else {
            panic!("expected event");
        };
        assert_eq!(name, "systemState");
        assert_eq!(ack, Some(13));
    }

    #[test]
    fn decode_connect_ack_and_error() {
        let ok = SocketMessage::decode(r#"0{"sid":"xyz"}"#).unwrap();
        assert_eq!(ok.packet, SocketPacket::Connect(Some(json!({"sid": "xyz"}))));

        let err = SocketMessage::decode(r#"4{"message":"Not authorized"}"#).unwrap();
        assert_eq!(
            err.packet,
            SocketPacket::ConnectError(json!({"message": "Not authorized"}))
        );
    }

    #[test]
    fn binary_packets_rejected() {
        assert!(matches!(
            SocketMessage::decode(r#"51-["snap",{"_placeholder":true,"num":0}]"#),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn event_without_name_rejected() {
        assert!(SocketMessage::decode("2[]").is_err());
        assert!(SocketMessage::decode("2[42]").is_err());
        assert!(SocketMessage::decode(r#"2{"a":1}"#).is_err());
    }

    #[test]
    fn encode_outgoing_frames() {
        assert_eq!(
            SocketMessage::connect(json!({"token": "t"})).to_frame(),
            r#"40{"token":"t"}"#
        );
        assert_eq!(
            SocketMessage::event("getSystemState", vec![]).to_frame(),
            r#"42["getSystemState"]"#
        );
        let namespaced = SocketMessage {
            namespace: "/admin".into(),
            packet: SocketPacket::Disconnect,
        };
        assert_eq!(namespaced.to_frame(), "41/admin,");
    }
}
