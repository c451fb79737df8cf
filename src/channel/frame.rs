//! Engine.IO v4 / Socket.IO v5 text frame codec
//!
//! Engine.IO framing (first char): `0` open, `1` close, `2` ping, `3` pong,
//! `4` message, `6` noop. A `4` message carries a Socket.IO packet whose
//! first char is the packet type: `0` connect, `1` disconnect, `2` event,
//! `3` ack, `4` connect_error. Events look like `42["name",{...}]`, with an
//! optional `/nsp,` prefix and numeric ack id before the JSON array.

use serde::Deserialize;
use serde_json::Value;

use crate::error::ClientError;

/// Engine.IO pong, sent in reply to a server ping.
pub const PONG: &str = "3";
/// Socket.IO disconnect from the default namespace.
pub const DISCONNECT: &str = "41";

/// Parameters announced by the server in the Engine.IO open packet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenInfo {
    pub sid: String,
    #[serde(default)]
    pub ping_interval: u64,
    #[serde(default)]
    pub ping_timeout: u64,
}

/// A decoded text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Open(OpenInfo),
    Close,
    Ping,
    Pong,
    Noop,
    Connect(Option<Value>),
    Disconnect,
    Event {
        name: String,
        data: Value,
        ack_id: Option<u64>,
    },
    Ack {
        ack_id: u64,
        data: Value,
    },
    ConnectError(Value),
}

fn malformed(frame: &str, why: &str) -> ClientError {
    ClientError::Transport(format!("malformed frame ({}): {}", why, frame))
}

/// Decode one WebSocket text frame.
pub fn decode(frame: &str) -> Result<Packet, ClientError> {
    let mut chars = frame.chars();
    match chars.next() {
        Some('0') => {
            let info: OpenInfo =
                serde_json::from_str(&frame[1..]).map_err(|_| malformed(frame, "open"))?;
            Ok(Packet::Open(info))
        }
        Some('1') => Ok(Packet::Close),
        Some('2') => Ok(Packet::Ping),
        Some('3') => Ok(Packet::Pong),
        Some('6') => Ok(Packet::Noop),
        Some('4') => decode_socketio(&frame[1..]).map_err(|why| malformed(frame, why)),
        _ => Err(malformed(frame, "unknown engine.io type")),
    }
}

fn decode_socketio(packet: &str) -> Result<Packet, &'static str> {
    let kind = packet.chars().next().ok_or("empty packet")?;
    if !kind.is_ascii_digit() {
        return Err("unknown socket.io type");
    }
    let mut rest = &packet[1..];

    // Namespace prefix: "/nsp," (only the default namespace is used).
    if rest.starts_with('/') {
        rest = match rest.find(',') {
            Some(pos) => &rest[pos + 1..],
            None => "",
        };
    }

    let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
    let ack_id = if digits > 0 {
        rest[..digits].parse().ok()
    } else {
        None
    };
    let body = &rest[digits..];

    let json = || -> Result<Value, &'static str> {
        if body.is_empty() {
            Ok(Value::Null)
        } else {
            serde_json::from_str(body).map_err(|_| "invalid json")
        }
    };

    match kind {
        '0' => {
            let v = json()?;
            Ok(Packet::Connect(if v.is_null() { None } else { Some(v) }))
        }
        '1' => Ok(Packet::Disconnect),
        '2' => {
            let mut args = match json()? {
                Value::Array(args) => args.into_iter(),
                _ => return Err("event is not an array"),
            };
            let name = match args.next() {
                Some(Value::String(name)) => name,
                _ => return Err("event without name"),
            };
            Ok(Packet::Event {
                name,
                data: args.next().unwrap_or(Value::Null),
                ack_id,
            })
        }
        '3' => Ok(Packet::Ack {
            ack_id: ack_id.ok_or("ack without id")?,
            data: json()?,
        }),
        '4' => Ok(Packet::ConnectError(json()?)),
        _ => Err("unknown socket.io type"),
    }
}

/// Encode a Socket.IO CONNECT carrying the auth payload.
pub fn encode_connect(auth: &Value) -> String {
    format!("40{}", auth)
}

/// Encode a Socket.IO EVENT on the default namespace.
pub fn encode_event(name: &str, data: &Value) -> String {
    format!("42{}", Value::Array(vec![Value::String(name.to_string()), data.clone()]))
}

/// Human-readable reason from a connect_error payload.
pub fn connect_error_message(v: &Value) -> String {
    v.get("message")
        .and_then(|m| m.as_str())
        .map(String::from)
        .unwrap_or_else(|| v.to_string())
}
