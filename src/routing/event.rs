//! Event router for backend-originated frames.
//!
//! Frames naming a guild go to the session hosting it. Frames for guilds this
//! node does not host are dropped; the session may have just been removed.

use crate::node::NodeConnection;
use crate::routing::protocol::Inbound;

/// Dispatch a decoded frame. Returns true if a session received it.
pub fn dispatch(node: &NodeConnection, inbound: Inbound) -> bool {
    match inbound {
        // Consumed by the connection itself.
        Inbound::Stats(_) => false,
        Inbound::PlayerUpdate { guild_id, state } => match node.session(&guild_id) {
            Some(player) => {
                player.handle_position(state);
                true
            }
            None => {
                tracing::trace!(node = %node.name(), %guild_id, "Dropping update for unknown session");
                false
            }
        },
        Inbound::Dispatch {
            op,
            guild_id: Some(guild_id),
            payload,
        } => match node.session(&guild_id) {
            Some(player) => {
                player.handle_backend_event(op, payload);
                true
            }
            None => {
                tracing::trace!(node = %node.name(), %guild_id, %op, "Dropping event for unknown session");
                false
            }
        },
        Inbound::Dispatch { op, guild_id: None, .. } => {
            tracing::trace!(node = %node.name(), %op, "Dropping frame without guild");
            false
        }
    }
}
