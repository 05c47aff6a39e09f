//! Wire messages exchanged with a backend node.
//!
//! Every frame is a JSON object discriminated by its `op` field.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::NodeError;
use crate::node::stats::NodeStats;
use crate::player::voice::VoiceServerUpdate;

pub const OP_STATS: &str = "stats";
pub const OP_PLAYER_UPDATE: &str = "playerUpdate";

/// Last playback position reported for a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlayerPosition {
    /// Node timestamp in milliseconds.
    pub time: u64,
    /// Track position in milliseconds.
    pub position: Option<u64>,
    /// Whether the node's voice connection is up.
    pub connected: bool,
    pub ping: Option<i64>,
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Stats(NodeStats),
    PlayerUpdate {
        guild_id: String,
        state: PlayerPosition,
    },
    /// Any other op. Routed to a session when it names a guild.
    Dispatch {
        op: String,
        guild_id: Option<String>,
        payload: Value,
    },
}

impl Inbound {
    pub fn op(&self) -> &str {
        match self {
            Inbound::Stats(_) => OP_STATS,
            Inbound::PlayerUpdate { .. } => OP_PLAYER_UPDATE,
            Inbound::Dispatch { op, .. } => op,
        }
    }

    /// Decode a text frame.
    pub fn decode(text: &str) -> Result<Self, NodeError> {
        let payload: Value = serde_json::from_str(text)
            .map_err(|e| NodeError::Protocol(format!("invalid JSON: {}", e)))?;

        let op = payload
            .get("op")
            .and_then(Value::as_str)
            .ok_or_else(|| NodeError::Protocol("frame without op".to_string()))?
            .to_string();
        let guild_id = payload
            .get("guildId")
            .and_then(Value::as_str)
            .map(str::to_string);

        match op.as_str() {
            OP_STATS => {
                let stats = serde_json::from_value(payload)
                    .map_err(|e| NodeError::Protocol(format!("invalid stats: {}", e)))?;
                Ok(Inbound::Stats(stats))
            }
            OP_PLAYER_UPDATE => {
                let guild_id = guild_id.ok_or_else(|| {
                    NodeError::Protocol("playerUpdate without guildId".to_string())
                })?;
                let state = match payload.get("state") {
                    Some(state) => serde_json::from_value(state.clone())
                        .map_err(|e| NodeError::Protocol(format!("invalid player state: {}", e)))?,
                    None => PlayerPosition::default(),
                };
                Ok(Inbound::PlayerUpdate { guild_id, state })
            }
            _ => Ok(Inbound::Dispatch {
                op,
                guild_id,
                payload,
            }),
        }
    }
}

/// Frames sent to a backend node.
#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Outbound<'a> {
    ConfigureResuming {
        key: &'a str,
        timeout: u64,
    },
    #[serde(rename_all = "camelCase")]
    VoiceUpdate {
        guild_id: &'a str,
        session_id: &'a str,
        event: &'a VoiceServerUpdate,
    },
    #[serde(rename_all = "camelCase")]
    Destroy {
        guild_id: &'a str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_player_update() {
        let frame = r#"{"op":"playerUpdate","guildId":"1","state":{"time":5,"position":10,"connected":true}}"#;
        match Inbound::decode(frame).unwrap() {
            Inbound::PlayerUpdate { guild_id, state } => {
                assert_eq!(guild_id, "1");
                assert_eq!(state.position, Some(10));
                assert!(state.connected);
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn unknown_ops_are_dispatched_with_payload() {
        let frame = r#"{"op":"event","type":"TrackEndEvent","guildId":"7"}"#;
        let inbound = Inbound::decode(frame).unwrap();
        assert_eq!(inbound.op(), "event");
        match inbound {
            Inbound::Dispatch { guild_id, payload, .. } => {
                assert_eq!(guild_id.as_deref(), Some("7"));
                assert_eq!(payload["type"], "TrackEndEvent");
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn rejects_malformed_frames() {
        assert!(matches!(Inbound::decode("not json"), Err(NodeError::Protocol(_))));
        assert!(matches!(Inbound::decode(r#"{"guildId":"1"}"#), Err(NodeError::Protocol(_))));
        assert!(matches!(
            Inbound::decode(r#"{"op":"playerUpdate"}"#),
            Err(NodeError::Protocol(_))
        ));
        assert!(matches!(
            Inbound::decode(r#"{"op":"stats","players":"many"}"#),
            Err(NodeError::Protocol(_))
        ));
    }

    #[test]
    fn outbound_frames_use_wire_names() {
        let resume = serde_json::to_value(Outbound::ConfigureResuming {
            key: "abc",
            timeout: 60,
        })
        .unwrap();
        assert_eq!(resume, json!({"op": "configureResuming", "key": "abc", "timeout": 60}));

        let server = VoiceServerUpdate {
            guild_id: "1".into(),
            token: "t".into(),
            endpoint: Some("voice.example".into()),
        };
        let update = serde_json::to_value(Outbound::VoiceUpdate {
            guild_id: "1",
            session_id: "s",
            event: &server,
        })
        .unwrap();
        assert_eq!(update["op"], "voiceUpdate");
        assert_eq!(update["guildId"], "1");
        assert_eq!(update["sessionId"], "s");
        assert_eq!(update["event"]["endpoint"], "voice.example");

        let destroy = serde_json::to_value(Outbound::Destroy { guild_id: "1" }).unwrap();
        assert_eq!(destroy, json!({"op": "destroy", "guildId": "1"}));
    }
}
