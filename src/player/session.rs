//! Per-guild session hosted on a node.
//!
//! # Responsibilities
//! - Collect voice credentials from gateway packets and forward them to the
//!   hosting node as a `voiceUpdate`
//! - Publish position updates and backend events to subscribers
//! - Move between nodes during failover, or tear down when it cannot
//!
//! # States
//! ```text
//! Connecting → Connected:    voiceUpdate accepted by the node
//! Connecting → Disconnected: join failed, left, or dropped by failover
//! Connected  → Disconnected: left or dropped by failover
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};

use serde_json::Value;
use tokio::sync::{broadcast, mpsc, watch};

use crate::error::SessionError;
use crate::node::NodeConnection;
use crate::player::voice::{GatewayCommand, VoicePacket, VoiceServerUpdate};
use crate::routing::protocol::{Outbound, PlayerPosition};

const EVENT_CAPACITY: usize = 64;

/// Connection sub-state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Connecting,
    Connected,
    Disconnected,
}

/// Notification published to session subscribers.
#[derive(Debug, Clone)]
pub enum PlayerEvent {
    /// Periodic `playerUpdate` from the node.
    Position(PlayerPosition),
    /// Any other backend frame addressed to this guild.
    Backend { op: String, payload: Value },
    /// Session migrated after its node disconnected.
    Moved { from: String, to: String },
    /// Session torn down.
    Disconnected { reason: String },
}

#[derive(Debug, Default)]
struct VoiceCredentials {
    session_id: Option<String>,
    server: Option<VoiceServerUpdate>,
}

#[derive(Debug)]
struct Host {
    node: Weak<NodeConnection>,
    name: String,
}

/// A voice session for one guild.
#[derive(Debug)]
pub struct Player {
    guild_id: String,
    channel_id: Mutex<String>,
    host: RwLock<Host>,
    state: watch::Sender<PlayerState>,
    voice: Mutex<VoiceCredentials>,
    position: Mutex<PlayerPosition>,
    events: broadcast::Sender<PlayerEvent>,
    gateway: mpsc::UnboundedSender<GatewayCommand>,
}

impl Player {
    pub fn new(
        guild_id: impl Into<String>,
        channel_id: impl Into<String>,
        node: &Arc<NodeConnection>,
        gateway: mpsc::UnboundedSender<GatewayCommand>,
    ) -> Arc<Self> {
        let (state, _) = watch::channel(PlayerState::Connecting);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Arc::new(Self {
            guild_id: guild_id.into(),
            channel_id: Mutex::new(channel_id.into()),
            host: RwLock::new(Host {
                node: Arc::downgrade(node),
                name: node.name().to_string(),
            }),
            state,
            voice: Mutex::new(VoiceCredentials::default()),
            position: Mutex::new(PlayerPosition::default()),
            events,
            gateway,
        })
    }

    pub fn guild_id(&self) -> &str {
        &self.guild_id
    }

    pub fn channel_id(&self) -> String {
        lock(&self.channel_id).clone()
    }

    pub(crate) fn set_channel_id(&self, channel_id: &str) {
        *lock(&self.channel_id) = channel_id.to_string();
    }

    /// Node currently hosting the session.
    pub fn node(&self) -> Option<Arc<NodeConnection>> {
        self.host
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .node
            .upgrade()
    }

    pub fn node_name(&self) -> String {
        self.host
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .name
            .clone()
    }

    pub fn state(&self) -> PlayerState {
        *self.state.borrow()
    }

    pub fn position(&self) -> PlayerPosition {
        *lock(&self.position)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.events.subscribe()
    }

    /// Wait until the session leaves `Connecting`.
    pub async fn wait_connected(&self) -> Result<(), SessionError> {
        let mut rx = self.state.subscribe();
        let state = rx
            .wait_for(|s| *s != PlayerState::Connecting)
            .await
            .map(|s| *s)
            .unwrap_or(PlayerState::Disconnected);
        match state {
            PlayerState::Connected => Ok(()),
            _ => Err(SessionError::JoinFailed(self.guild_id.clone())),
        }
    }

    // --- Inbound ---

    pub(crate) fn handle_packet(&self, node: &NodeConnection, packet: VoicePacket) {
        match packet {
            VoicePacket::StateUpdate(update) => {
                let Some(channel_id) = update.channel_id else {
                    self.mark_disconnected("left voice channel");
                    return;
                };
                self.set_channel_id(&channel_id);
                lock(&self.voice).session_id = Some(update.session_id);
            }
            VoicePacket::ServerUpdate(update) => {
                lock(&self.voice).server = Some(update);
            }
        }
        self.flush_voice_update(node);
    }

    pub(crate) fn handle_position(&self, position: PlayerPosition) {
        *lock(&self.position) = position;
        let _ = self.events.send(PlayerEvent::Position(position));
    }

    pub(crate) fn handle_backend_event(&self, op: String, payload: Value) {
        let _ = self.events.send(PlayerEvent::Backend { op, payload });
    }

    /// Complete voice credentials, if both halves have arrived.
    fn credentials(&self) -> Option<(String, VoiceServerUpdate)> {
        let voice = lock(&self.voice);
        match (&voice.session_id, &voice.server) {
            (Some(session_id), Some(server)) if server.endpoint.is_some() => {
                Some((session_id.clone(), server.clone()))
            }
            _ => None,
        }
    }

    /// Send collected credentials to `node`. Returns true if accepted.
    fn flush_voice_update(&self, node: &NodeConnection) -> bool {
        if self.state() == PlayerState::Disconnected {
            return false;
        }
        let Some((session_id, server)) = self.credentials() else {
            return false;
        };

        let update = Outbound::VoiceUpdate {
            guild_id: &self.guild_id,
            session_id: &session_id,
            event: &server,
        };
        match node.send(&update) {
            Ok(true) => {
                self.state.send_if_modified(|state| {
                    let changed = *state == PlayerState::Connecting;
                    if changed {
                        *state = PlayerState::Connected;
                    }
                    changed
                });
                true
            }
            Ok(false) => {
                tracing::debug!(node = %node.name(), guild_id = %self.guild_id, "Voice update not sent, socket closed");
                false
            }
            Err(e) => {
                tracing::warn!(node = %node.name(), guild_id = %self.guild_id, error = %e, "Voice update failed");
                false
            }
        }
    }

    // --- Lifecycle ---

    /// Move the session from `from` to `target`.
    ///
    /// The session is attached to `target` first, then collected credentials
    /// are re-sent there. If that send fails the attach is rolled back and the
    /// session stays on `from`.
    pub fn move_to(
        self: &Arc<Self>,
        from: &NodeConnection,
        target: &Arc<NodeConnection>,
    ) -> Result<(), SessionError> {
        if !target.is_connected() {
            return Err(SessionError::NodeNotReady(target.name().to_string()));
        }
        target.attach_session(Arc::clone(self))?;

        if self.credentials().is_some() && !self.flush_voice_update(target) {
            target.detach_session(self);
            return Err(SessionError::MoveFailed {
                guild_id: self.guild_id.clone(),
                node: target.name().to_string(),
            });
        }

        from.detach_session(self);
        {
            let mut host = self.host.write().unwrap_or_else(PoisonError::into_inner);
            host.node = Arc::downgrade(target);
            host.name = target.name().to_string();
        }

        tracing::info!(
            guild_id = %self.guild_id,
            from = %from.name(),
            to = %target.name(),
            "Session migrated"
        );
        let _ = self.events.send(PlayerEvent::Moved {
            from: from.name().to_string(),
            to: target.name().to_string(),
        });
        Ok(())
    }

    /// Tear the session down without talking to the node.
    ///
    /// Detaches from whichever node hosts the session now, which may differ
    /// from the node it started on.
    pub fn mark_disconnected(&self, reason: &str) {
        if let Some(node) = self.node() {
            node.detach_session(self);
        }

        let previous = self.state.send_replace(PlayerState::Disconnected);
        if previous == PlayerState::Disconnected {
            return;
        }

        tracing::info!(guild_id = %self.guild_id, node = %self.node_name(), %reason, "Session disconnected");
        let _ = self.events.send(PlayerEvent::Disconnected {
            reason: reason.to_string(),
        });
        let _ = self.gateway.send(GatewayCommand::Leave {
            guild_id: self.guild_id.clone(),
        });
    }

    /// Leave the voice channel and destroy the session on its node.
    pub fn disconnect(&self) {
        if self.state() == PlayerState::Disconnected {
            return;
        }
        if let Some(node) = self.node() {
            if let Err(e) = node.send(&Outbound::Destroy {
                guild_id: &self.guild_id,
            }) {
                tracing::warn!(node = %node.name(), guild_id = %self.guild_id, error = %e, "Destroy failed");
            }
        }
        self.mark_disconnected("disconnected by client");
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
