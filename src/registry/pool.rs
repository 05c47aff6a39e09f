//! Node registry and session placement.
//!
//! # Join flow
//! ```text
//! join(options)
//!     → pick node (explicit, or least penalty)
//!     → attach Connecting session, emit GatewayCommand::Join
//!     → gateway packets arrive via dispatch_packet → node packet route
//!     → voiceUpdate accepted → Connected (or timeout → Disconnected)
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::config::{ClientConfig, PoolConfig};
use crate::error::SessionError;
use crate::failover::{Cleaner, LeastPenalty, NodeSelector};
use crate::node::{NodeConnection, NodeContext, NodeEvent, NodeMap};
use crate::observability::metrics;
use crate::player::{GatewayCommand, Player, PlayerState, VoicePacket};
use crate::resilience::ReconnectPolicy;
use crate::routing::PacketRoutes;

const EVENT_CAPACITY: usize = 1024;
/// Close code sent to nodes on shutdown.
const CLOSE_NORMAL: u16 = 1000;

/// Parameters of a voice channel join.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinOptions {
    pub guild_id: String,
    pub channel_id: String,
    /// Host the session on this node instead of the least loaded one.
    pub node: Option<String>,
    pub self_mute: bool,
    pub self_deaf: bool,
}

impl JoinOptions {
    pub fn new(guild_id: impl Into<String>, channel_id: impl Into<String>) -> Self {
        Self {
            guild_id: guild_id.into(),
            channel_id: channel_id.into(),
            ..Default::default()
        }
    }

    pub fn on_node(mut self, node: impl Into<String>) -> Self {
        self.node = Some(node.into());
        self
    }
}

/// Registry of backend nodes.
#[derive(Debug)]
pub struct NodeRegistry {
    client: ClientConfig,
    nodes: Arc<NodeMap>,
    routes: Arc<PacketRoutes>,
    events: broadcast::Sender<NodeEvent>,
    gateway: mpsc::UnboundedSender<GatewayCommand>,
    selector: LeastPenalty,
    reconnect: ReconnectPolicy,
    join_timeout: Duration,
    join_lock: Mutex<()>,
    closing: AtomicBool,
}

impl NodeRegistry {
    /// Build the registry. The receiver yields voice state changes the
    /// application must send through its gateway connection.
    pub fn new(config: &PoolConfig) -> (Arc<Self>, mpsc::UnboundedReceiver<GatewayCommand>) {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (gateway, gateway_rx) = mpsc::unbounded_channel();
        let nodes = Arc::new(NodeMap::new());
        let routes = Arc::new(PacketRoutes::new());

        let context = NodeContext {
            events: events.clone(),
            routes: Arc::clone(&routes),
            cleaner: Cleaner::new(Arc::downgrade(&nodes), config.failover.auto_migrate),
        };

        for node_config in &config.nodes {
            match NodeConnection::new(node_config, context.clone()) {
                Ok(node) => {
                    nodes.insert(node_config.name.clone(), Arc::new(node));
                }
                Err(e) => {
                    tracing::warn!(
                        node = %node_config.name,
                        address = %node_config.address,
                        error = %e,
                        "Invalid node address, skipping"
                    );
                }
            }
        }

        tracing::info!(nodes = nodes.len(), "Node registry created");

        let registry = Arc::new(Self {
            client: config.client.clone(),
            nodes,
            routes,
            events,
            gateway,
            selector: LeastPenalty::new(),
            reconnect: ReconnectPolicy::from(&config.reconnect),
            join_timeout: Duration::from_secs(config.sessions.join_timeout_secs),
            join_lock: Mutex::new(()),
            closing: AtomicBool::new(false),
        });
        (registry, gateway_rx)
    }

    pub fn node(&self, name: &str) -> Option<Arc<NodeConnection>> {
        self.nodes.get(name).map(|n| Arc::clone(n.value()))
    }

    /// All nodes, sorted by name.
    pub fn nodes(&self) -> Vec<Arc<NodeConnection>> {
        let mut nodes: Vec<_> = self.nodes.iter().map(|n| Arc::clone(n.value())).collect();
        nodes.sort_by(|a, b| a.name().cmp(b.name()));
        nodes
    }

    /// Subscribe to lifecycle events of every node.
    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.events.subscribe()
    }

    /// Connected node with the lowest penalty.
    pub fn ideal_node(&self) -> Option<Arc<NodeConnection>> {
        self.selector.select(&self.nodes())
    }

    /// Start connecting every disconnected node.
    pub fn connect_all(&self) {
        for node in self.nodes() {
            node.connect(&self.client, node.resume_key());
        }
    }

    /// Session for `guild_id`, on whichever node hosts it.
    pub fn player(&self, guild_id: &str) -> Option<Arc<Player>> {
        self.nodes.iter().find_map(|n| n.value().session(guild_id))
    }

    fn host_of(&self, guild_id: &str) -> Option<Arc<NodeConnection>> {
        self.nodes
            .iter()
            .find(|n| n.value().has_session(guild_id))
            .map(|n| Arc::clone(n.value()))
    }

    fn pick_node(&self, requested: Option<&str>) -> Result<Arc<NodeConnection>, SessionError> {
        match requested {
            Some(name) => {
                let node = self
                    .node(name)
                    .ok_or_else(|| SessionError::UnknownNode(name.to_string()))?;
                if !node.is_connected() {
                    return Err(SessionError::NodeNotReady(name.to_string()));
                }
                Ok(node)
            }
            None => self.ideal_node().ok_or(SessionError::NoAvailableNode),
        }
    }

    /// Join a voice channel and wait for the session to connect.
    ///
    /// Joining a guild that already has a connected session moves it to the
    /// requested channel on its current node.
    pub async fn join(&self, options: JoinOptions) -> Result<Arc<Player>, SessionError> {
        if options.guild_id.is_empty() || options.channel_id.is_empty() {
            return Err(SessionError::MissingTarget);
        }

        let (player, node) = {
            let _guard = self.join_lock.lock().unwrap_or_else(PoisonError::into_inner);

            if let Some(existing) = self.player(&options.guild_id) {
                match existing.state() {
                    PlayerState::Connecting => {
                        return Err(SessionError::AlreadyConnecting(options.guild_id));
                    }
                    PlayerState::Connected => {
                        existing.set_channel_id(&options.channel_id);
                        self.send_join(&options);
                        return Ok(existing);
                    }
                    // A torn-down session still attached somewhere is replaced.
                    PlayerState::Disconnected => {
                        if let Some(host) = self.host_of(&options.guild_id) {
                            host.detach_session(&existing);
                        }
                    }
                }
            }

            let node = self.pick_node(options.node.as_deref())?;
            let player = Player::new(
                options.guild_id.clone(),
                options.channel_id.clone(),
                &node,
                self.gateway.clone(),
            );
            node.attach_session(Arc::clone(&player))?;
            self.send_join(&options);
            (player, node)
        };

        tracing::info!(
            guild_id = %options.guild_id,
            channel_id = %options.channel_id,
            node = %node.name(),
            "Joining voice channel"
        );

        let outcome = tokio::time::timeout(self.join_timeout, player.wait_connected()).await;
        match outcome {
            Ok(result) => result.map(|()| player),
            Err(_) => {
                tracing::warn!(guild_id = %options.guild_id, node = %player.node_name(), "Join timed out");
                player.mark_disconnected("join timed out");
                Err(SessionError::JoinTimeout(options.guild_id))
            }
        }
    }

    fn send_join(&self, options: &JoinOptions) {
        let command = GatewayCommand::Join {
            guild_id: options.guild_id.clone(),
            channel_id: options.channel_id.clone(),
            self_mute: options.self_mute,
            self_deaf: options.self_deaf,
        };
        if self.gateway.send(command).is_err() {
            tracing::warn!(guild_id = %options.guild_id, "Gateway command receiver dropped");
        }
    }

    /// Leave the voice channel of `guild_id` and destroy its session.
    pub fn leave(&self, guild_id: &str) -> Result<(), SessionError> {
        let player = self
            .player(guild_id)
            .ok_or_else(|| SessionError::UnknownSession(guild_id.to_string()))?;
        player.disconnect();
        Ok(())
    }

    /// Forward a gateway voice packet to the node hosting its guild.
    ///
    /// State updates for other users are ignored. Returns true if the packet
    /// was queued.
    pub fn dispatch_packet(&self, packet: VoicePacket) -> bool {
        if let VoicePacket::StateUpdate(update) = &packet {
            if update.user_id != self.client.user_id {
                return false;
            }
        }
        match self.host_of(packet.guild_id()) {
            Some(node) => self.routes.forward(node.name(), packet),
            None => {
                tracing::trace!(guild_id = %packet.guild_id(), "No session for voice packet");
                false
            }
        }
    }

    /// Reconnect nodes after unexpected closes until `shutdown` fires.
    pub fn spawn_reconnector(
        self: &Arc<Self>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let registry = Arc::downgrade(self);
        let mut events = self.subscribe();
        let policy = self.reconnect;

        tokio::spawn(async move {
            if !policy.enabled {
                tracing::info!("Reconnects disabled");
                return;
            }

            loop {
                tokio::select! {
                    _ = shutdown.recv() => {
                        tracing::info!("Reconnector received shutdown signal, exiting loop");
                        break;
                    }
                    event = events.recv() => match event {
                        Ok(NodeEvent::Close { node, code, .. }) => {
                            schedule_reconnect(&registry, &node, code, policy);
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Reconnector lagged behind node events");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        })
    }

    /// Close every node socket. Closed nodes are not reconnected afterwards.
    pub fn close_all(&self) {
        self.closing.store(true, Ordering::Release);
        for node in self.nodes() {
            node.close(CLOSE_NORMAL, "shutting down");
        }
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }
}

fn schedule_reconnect(registry: &Weak<NodeRegistry>, name: &str, code: u16, policy: ReconnectPolicy) {
    let Some(strong) = registry.upgrade() else {
        return;
    };
    if strong.is_closing() {
        return;
    }
    let Some(node) = strong.node(name) else {
        return;
    };

    let attempt = node.record_reconnect_attempt();
    metrics::record_reconnect_attempt(name);
    let Some(delay) = policy.delay_for(attempt) else {
        tracing::error!(node = %name, attempts = attempt - 1, "Giving up on node");
        return;
    };

    tracing::info!(node = %name, code, attempt, delay_ms = delay.as_millis() as u64, "Scheduling reconnect");
    let registry = Weak::clone(registry);
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let Some(registry) = registry.upgrade() else {
            return;
        };
        if registry.is_closing() {
            return;
        }
        node.connect(&registry.client, node.resume_key());
    });
}
