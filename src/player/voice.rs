//! Voice gateway packets and commands.
//!
//! Packets originate from the parent platform's gateway connection and are
//! forwarded by the registry to the node owning the guild. Commands flow the
//! other way: the pool asks the application to join or leave a channel.

use serde::{Deserialize, Serialize};

/// Voice server credentials for a guild.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct VoiceServerUpdate {
    pub guild_id: String,
    pub token: String,
    /// `None` while the voice server is being reallocated.
    pub endpoint: Option<String>,
}

/// Voice state of the client user in a guild.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct VoiceStateUpdate {
    pub guild_id: String,
    /// `None` once the user has left the channel.
    pub channel_id: Option<String>,
    pub user_id: String,
    pub session_id: String,
}

/// A routing packet forwarded from the platform gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoicePacket {
    StateUpdate(VoiceStateUpdate),
    ServerUpdate(VoiceServerUpdate),
}

impl VoicePacket {
    pub fn guild_id(&self) -> &str {
        match self {
            VoicePacket::StateUpdate(update) => &update.guild_id,
            VoicePacket::ServerUpdate(update) => &update.guild_id,
        }
    }
}

/// Request for the application to update the client's voice state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCommand {
    Join {
        guild_id: String,
        channel_id: String,
        self_mute: bool,
        self_deaf: bool,
    },
    Leave {
        guild_id: String,
    },
}
