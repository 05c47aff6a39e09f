//! A persistent connection to one backend node.
//!
//! # Responsibilities
//! - Own the socket lifecycle (connect, upgrade, open, message, error, close)
//! - Track health state, statistics and reconnect attempts
//! - Hold the set of sessions hosted on this node
//! - Hand inbound traffic to the routers and trigger failover on close
//!
//! A `NodeConnection` lives for the whole process; it is reconnected, never
//! recreated.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arc_swap::ArcSwap;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use crate::config::{ClientConfig, NodeConfig};
use crate::error::{NodeError, NodeResult, SessionError};
use crate::failover::{Cleaner, FailoverOutcome};
use crate::node::events::NodeEvent;
use crate::node::socket::{self, Handshake, SocketHandle, SocketId};
use crate::node::state::{ConnectionState, StateCell};
use crate::node::stats::NodeStats;
use crate::observability::metrics;
use crate::player::Player;
use crate::routing::protocol::{Inbound, Outbound, OP_PLAYER_UPDATE};
use crate::routing::{event, packet, PacketRoutes};

/// Shared collaborators handed to every node by the registry.
#[derive(Debug, Clone)]
pub struct NodeContext {
    pub events: broadcast::Sender<NodeEvent>,
    pub routes: Arc<PacketRoutes>,
    pub cleaner: Cleaner,
}

/// Resumption settings with a resolved key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeSettings {
    pub key: String,
    pub timeout_secs: u64,
}

/// Connection to a single backend node.
#[derive(Debug)]
pub struct NodeConnection {
    name: String,
    url: Url,
    password: String,
    resume: Option<ResumeSettings>,

    state: StateCell,
    stats: ArcSwap<NodeStats>,
    reconnect_attempts: AtomicU32,
    resumed: AtomicBool,
    cleaner_armed: AtomicBool,

    socket: Mutex<Option<SocketHandle>>,
    sessions: DashMap<String, Arc<Player>>,

    events: broadcast::Sender<NodeEvent>,
    routes: Arc<PacketRoutes>,
    cleaner: Cleaner,
}

impl NodeConnection {
    /// Create a disconnected node from its configuration.
    pub fn new(config: &NodeConfig, context: NodeContext) -> Result<Self, url::ParseError> {
        let url = Url::parse(&format!("ws://{}", config.address))?;
        let resume = config.resume.enabled.then(|| ResumeSettings {
            key: config
                .resume
                .key
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            timeout_secs: config.resume.timeout_secs,
        });

        Ok(Self {
            name: config.name.clone(),
            url,
            password: config.password.clone(),
            resume,
            state: StateCell::default(),
            stats: ArcSwap::from_pointee(NodeStats::default()),
            reconnect_attempts: AtomicU32::new(0),
            resumed: AtomicBool::new(false),
            cleaner_armed: AtomicBool::new(false),
            socket: Mutex::new(None),
            sessions: DashMap::new(),
            events: context.events,
            routes: context.routes,
            cleaner: context.cleaner,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Latest statistics snapshot.
    pub fn stats(&self) -> Arc<NodeStats> {
        self.stats.load_full()
    }

    /// Load penalty derived from the latest statistics; lower is healthier.
    pub fn penalty(&self) -> u64 {
        self.stats.load().penalty()
    }

    /// Whether the backend reported the last socket as a resumed session.
    pub fn resumed(&self) -> bool {
        self.resumed.load(Ordering::Acquire)
    }

    /// Resume key sent on connect, when resumption is enabled.
    pub fn resume_key(&self) -> Option<&str> {
        self.resume.as_ref().map(|r| r.key.as_str())
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts.load(Ordering::Acquire)
    }

    /// Count a reconnect attempt and return the new total.
    pub fn record_reconnect_attempt(&self) -> u32 {
        self.reconnect_attempts.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Set the one-shot failover flag, returning whether it was already set.
    pub(crate) fn arm_cleaner(&self) -> bool {
        self.cleaner_armed.swap(true, Ordering::AcqRel)
    }

    // --- Sessions ---

    pub fn session(&self, guild_id: &str) -> Option<Arc<Player>> {
        self.sessions.get(guild_id).map(|p| Arc::clone(p.value()))
    }

    pub fn has_session(&self, guild_id: &str) -> bool {
        self.sessions.contains_key(guild_id)
    }

    /// Snapshot of the hosted sessions.
    pub fn sessions(&self) -> Vec<Arc<Player>> {
        self.sessions.iter().map(|p| Arc::clone(p.value())).collect()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Add a session, refusing a second one for the same guild.
    pub(crate) fn attach_session(&self, player: Arc<Player>) -> Result<(), SessionError> {
        match self.sessions.entry(player.guild_id().to_string()) {
            Entry::Occupied(_) => Err(SessionError::DuplicateSession {
                guild_id: player.guild_id().to_string(),
                node: self.name.clone(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(player);
                metrics::record_node_sessions(&self.name, self.sessions.len());
                Ok(())
            }
        }
    }

    /// Remove `player` if it is the session registered for its guild.
    pub(crate) fn detach_session(&self, player: &Player) -> bool {
        let removed = self
            .sessions
            .remove_if(player.guild_id(), |_, p| std::ptr::eq(p.as_ref(), player))
            .is_some();
        if removed {
            metrics::record_node_sessions(&self.name, self.sessions.len());
        }
        removed
    }

    // --- Socket lifecycle ---

    /// Open a socket to the node.
    ///
    /// Ignored unless the node is disconnected. Failures are reported through
    /// `NodeEvent::Error` and `NodeEvent::Close`, never returned.
    pub fn connect(self: &Arc<Self>, client: &ClientConfig, resume_key: Option<&str>) {
        let Some((id, outbound)) = self.begin_connect() else {
            tracing::debug!(node = %self.name, state = %self.state(), "Connect ignored");
            return;
        };

        tracing::info!(node = %self.name, url = %self.url, %id, "Connecting to node");

        let handshake = Handshake {
            password: &self.password,
            user_id: &client.user_id,
            shard_count: client.shard_count,
            client_name: &client.client_name,
            resume_key,
        };

        match socket::build_request(&self.url, &handshake) {
            Ok(request) => socket::spawn_driver(Arc::clone(self), request, id, outbound),
            Err(e) => {
                let reason = e.to_string();
                self.on_error(id, e);
                self.on_close(id, socket::CLOSE_ABNORMAL, reason);
            }
        }
    }

    /// Move to `Connecting`, install a socket handle and register the packet route.
    pub(crate) fn begin_connect(
        self: &Arc<Self>,
    ) -> Option<(SocketId, mpsc::UnboundedReceiver<Message>)> {
        if !self
            .state
            .transition(ConnectionState::Disconnected, ConnectionState::Connecting)
        {
            return None;
        }
        metrics::record_node_state(&self.name, ConnectionState::Connecting);

        let (handle, outbound) = SocketHandle::new();
        let id = handle.id();
        *self.socket_slot() = Some(handle);

        let packets = self.routes.register(&self.name);
        tokio::spawn(packet::pump(Arc::downgrade(self), packets));

        Some((id, outbound))
    }

    pub(crate) fn on_upgrade(&self, id: SocketId, resumed: bool) {
        if !self.is_current(id) {
            return;
        }
        self.resumed.store(resumed, Ordering::Release);
        tracing::debug!(node = %self.name, resumed, "Socket upgraded");
    }

    pub(crate) fn on_open(&self, id: SocketId) {
        {
            let slot = self.socket_slot();
            match slot.as_ref() {
                Some(handle) if handle.id() == id => handle.mark_open(),
                _ => return,
            }
        }

        if let Some(resume) = &self.resume {
            let configure = Outbound::ConfigureResuming {
                key: &resume.key,
                timeout: resume.timeout_secs,
            };
            let failure = match self.send(&configure) {
                Ok(true) => None,
                Ok(false) => Some("socket is not open".to_string()),
                Err(e) => Some(e.to_string()),
            };
            if let Some(reason) = failure {
                tracing::warn!(node = %self.name, %reason, "Failed to configure resuming");
                self.emit(NodeEvent::Error {
                    node: self.name.clone(),
                    error: Arc::new(NodeError::Configuration(reason)),
                });
                self.force_close(socket::CLOSE_ON_CONFIGURE_FAILURE, "failed to configure resuming");
                return;
            }
        }

        self.reconnect_attempts.store(0, Ordering::Release);
        if !self
            .state
            .transition(ConnectionState::Connecting, ConnectionState::Connected)
        {
            return;
        }
        metrics::record_node_state(&self.name, ConnectionState::Connected);

        let resumed = self.resumed();
        tracing::info!(node = %self.name, resumed, "Node ready");
        self.emit(NodeEvent::Ready {
            node: self.name.clone(),
            resumed,
        });
    }

    pub(crate) fn on_message(&self, id: SocketId, text: &str) {
        if !self.is_current(id) {
            return;
        }

        let inbound = match Inbound::decode(text) {
            Ok(inbound) => inbound,
            Err(e) => {
                tracing::warn!(node = %self.name, error = %e, "Dropping malformed frame");
                self.emit(NodeEvent::Error {
                    node: self.name.clone(),
                    error: Arc::new(e),
                });
                return;
            }
        };

        if inbound.op() != OP_PLAYER_UPDATE {
            self.emit(NodeEvent::Debug {
                node: self.name.clone(),
                message: text.to_string(),
            });
        }

        match inbound {
            Inbound::Stats(stats) => self.apply_stats(stats),
            other => {
                event::dispatch(self, other);
            }
        }
    }

    pub(crate) fn on_error(&self, id: SocketId, error: NodeError) {
        if !self.is_current(id) {
            return;
        }
        tracing::warn!(node = %self.name, error = %error, "Socket error");
        let reason = error.to_string();
        self.emit(NodeEvent::Error {
            node: self.name.clone(),
            error: Arc::new(error),
        });
        self.force_close(socket::CLOSE_ON_ERROR, &reason);
    }

    pub(crate) fn on_close(&self, id: SocketId, code: u16, reason: String) {
        let handle = {
            let mut slot = self.socket_slot();
            match slot.as_ref() {
                Some(handle) if handle.id() == id => slot.take(),
                _ => None,
            }
        };
        if handle.is_none() {
            tracing::trace!(node = %self.name, %id, "Ignoring close for stale socket");
            return;
        }
        // Dropping the handle stops the writer task.
        drop(handle);

        self.state.set(ConnectionState::Disconnected);
        self.routes.unregister(&self.name);
        metrics::record_node_state(&self.name, ConnectionState::Disconnected);

        tracing::warn!(node = %self.name, code, %reason, "Node disconnected");
        self.emit(NodeEvent::Close {
            node: self.name.clone(),
            code,
            reason,
        });

        match self.cleaner.run(self) {
            FailoverOutcome::Armed => {
                tracing::debug!(node = %self.name, "Failover armed; sessions kept");
            }
            FailoverOutcome::Completed(report) => {
                tracing::info!(
                    node = %self.name,
                    target = ?report.target,
                    migrated = report.migrated,
                    dropped = report.dropped,
                    "Failover completed"
                );
            }
        }
    }

    /// Close the socket with `code`. The close is reported through `on_close`.
    pub fn close(&self, code: u16, reason: &str) {
        self.force_close(code, reason);
    }

    fn force_close(&self, code: u16, reason: &str) {
        if let Some(handle) = self.socket_slot().as_ref() {
            handle.close(code, reason);
        }
    }

    /// Serialize and queue `payload`.
    ///
    /// Returns `Ok(false)` when there is no open socket. Serialization happens
    /// before the socket is inspected.
    pub fn send<T: Serialize>(&self, payload: &T) -> NodeResult<bool> {
        let text = serde_json::to_string(payload)?;
        let slot = self.socket_slot();
        match slot.as_ref() {
            Some(handle) if handle.is_open() => {
                handle.write(Message::text(text))?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Replace the statistics snapshot.
    pub(crate) fn apply_stats(&self, stats: NodeStats) {
        let penalty = stats.penalty();
        self.stats.store(Arc::new(stats));
        metrics::record_node_penalty(&self.name, penalty);
        tracing::trace!(node = %self.name, penalty, "Stats updated");
    }

    fn is_current(&self, id: SocketId) -> bool {
        matches!(self.socket_slot().as_ref(), Some(handle) if handle.id() == id)
    }

    fn socket_slot(&self) -> MutexGuard<'_, Option<SocketHandle>> {
        self.socket.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: NodeEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
