//! Discord gateway (v10, JSON encoding) frames.
//!
//! Only the opcodes a member-join and interaction listener needs are
//! modelled: HELLO starts the heartbeat, IDENTIFY opens the session,
//! dispatches carry events and the rest steer the connection.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::wire::WireError;

pub const OP_DISPATCH: u8 = 0;
pub const OP_HEARTBEAT: u8 = 1;
pub const OP_IDENTIFY: u8 = 2;
pub const OP_RECONNECT: u8 = 7;
pub const OP_INVALID_SESSION: u8 = 9;
pub const OP_HELLO: u8 = 10;
pub const OP_HEARTBEAT_ACK: u8 = 11;

pub const INTENT_GUILDS: u64 = 1 << 0;
pub const INTENT_GUILD_MEMBERS: u64 = 1 << 1;

/// `GUILD_MEMBERS` is privileged and must be enabled for the application.
pub const DEFAULT_INTENTS: u64 = INTENT_GUILDS | INTENT_GUILD_MEMBERS;

pub const INTERACTION_CREATE: &str = "INTERACTION_CREATE";
pub const READY: &str = "READY";

/// Interaction id and token needed to answer a gateway interaction over REST.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallbackTarget {
    pub interaction_id: String,
    pub token: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    Hello { heartbeat_interval: Duration },
    Dispatch { sequence: Option<u64>, event_type: String, callback: Option<CallbackTarget> },
    HeartbeatRequest,
    HeartbeatAck,
    Reconnect,
    InvalidSession,
    Other(u8),
}

#[derive(Deserialize)]
struct RawFrame {
    op: u8,
    #[serde(default)]
    d: Value,
    s: Option<u64>,
    t: Option<String>,
}

#[derive(Deserialize)]
struct RawHello {
    heartbeat_interval: u64,
}

#[derive(Deserialize)]
struct RawCallback {
    id: String,
    token: String,
}

pub fn decode_frame(text: &str) -> Result<Frame, WireError> {
    let raw: RawFrame = serde_json::from_str(text)?;
    let frame = match raw.op {
        OP_DISPATCH => {
            let event_type = raw.t.unwrap_or_default();
            let callback = if event_type == INTERACTION_CREATE {
                let target: RawCallback = serde_json::from_value(raw.d)?;
                Some(CallbackTarget { interaction_id: target.id, token: target.token })
            } else {
                None
            };
            Frame::Dispatch { sequence: raw.s, event_type, callback }
        }
        OP_HELLO => {
            let hello: RawHello = serde_json::from_value(raw.d)?;
            Frame::Hello { heartbeat_interval: Duration::from_millis(hello.heartbeat_interval) }
        }
        OP_HEARTBEAT => Frame::HeartbeatRequest,
        OP_HEARTBEAT_ACK => Frame::HeartbeatAck,
        OP_RECONNECT => Frame::Reconnect,
        OP_INVALID_SESSION => Frame::InvalidSession,
        other => Frame::Other(other),
    };
    Ok(frame)
}

pub fn identify(token: &SecretString, intents: u64) -> Value {
    json!({
        "op": OP_IDENTIFY,
        "d": {
            "token": token.expose_secret(),
            "intents": intents,
            "properties": {
                "os": std::env::consts::OS,
                "browser": "switchdesk",
                "device": "switchdesk"
            }
        }
    })
}

pub fn heartbeat(sequence: Option<u64>) -> Value {
    json!({ "op": OP_HEARTBEAT, "d": sequence })
}

/// Close codes after which reconnecting cannot succeed: bad token, invalid
/// shard or version, and invalid or disallowed intents.
pub fn is_fatal_close(code: u16) -> bool {
    matches!(code, 4004 | 4010 | 4011 | 4012 | 4013 | 4014)
}
