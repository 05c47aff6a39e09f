//! Packet router for gateway voice packets.
//!
//! # Data Flow
//! ```text
//! NodeRegistry::dispatch_packet
//!     → PacketRoutes::forward (typed channel of the owning node)
//!     → pump task
//!     → route (only guilds the node hosts)
//!     → Player::handle_packet
//! ```
//!
//! A node's channel exists from `connect` until `on_close`; packets for a
//! node without a registered channel are dropped.

use std::sync::Weak;

use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::node::NodeConnection;
use crate::player::VoicePacket;

/// Per-node packet channels owned by the registry.
#[derive(Debug, Default)]
pub struct PacketRoutes {
    channels: DashMap<String, mpsc::UnboundedSender<VoicePacket>>,
}

impl PacketRoutes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a channel for `node`, replacing any previous one.
    pub fn register(&self, node: &str) -> mpsc::UnboundedReceiver<VoicePacket> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.channels.insert(node.to_string(), tx);
        rx
    }

    /// Drop the channel of `node`. Its pump task exits once drained.
    pub fn unregister(&self, node: &str) {
        self.channels.remove(node);
    }

    pub fn is_registered(&self, node: &str) -> bool {
        self.channels.contains_key(node)
    }

    /// Send `packet` to `node`. Returns false if the node has no open channel.
    pub fn forward(&self, node: &str, packet: VoicePacket) -> bool {
        match self.channels.get(node) {
            Some(tx) => tx.send(packet).is_ok(),
            None => false,
        }
    }
}

/// Hand a packet to the session it belongs to, if this node hosts it.
pub fn route(node: &NodeConnection, packet: VoicePacket) -> bool {
    let Some(player) = node.session(packet.guild_id()) else {
        tracing::trace!(node = %node.name(), guild_id = %packet.guild_id(), "Dropping packet for unowned guild");
        return false;
    };
    player.handle_packet(node, packet);
    true
}

/// Drain a node's packet channel until it is unregistered.
pub(crate) async fn pump(node: Weak<NodeConnection>, mut packets: mpsc::UnboundedReceiver<VoicePacket>) {
    while let Some(packet) = packets.recv().await {
        let Some(node) = node.upgrade() else {
            break;
        };
        route(&node, packet);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::voice::VoiceServerUpdate;
    use crate::testing::{self, TestPool};

    fn server_update(guild_id: &str) -> VoicePacket {
        VoicePacket::ServerUpdate(VoiceServerUpdate {
            guild_id: guild_id.into(),
            token: "token".into(),
            endpoint: Some("voice.example".into()),
        })
    }

    #[test]
    fn forward_requires_registration() {
        let routes = PacketRoutes::new();
        assert!(!routes.forward("a", server_update("1")));

        let mut rx = routes.register("a");
        assert!(routes.forward("a", server_update("1")));
        assert_eq!(rx.try_recv().unwrap().guild_id(), "1");

        routes.unregister("a");
        assert!(!routes.forward("a", server_update("1")));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn route_only_reaches_owned_sessions() {
        let pool = TestPool::new(&["a"], true);
        let node = pool.node("a");
        let _socket = testing::open(&node);
        let _player = pool.player(&node, "owned");

        assert!(route(&node, server_update("owned")));
        assert!(!route(&node, server_update("someone-else")));
    }
}
