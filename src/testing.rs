//! Fixtures shared by unit tests.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::Message;

use crate::config::{NodeConfig, ResumeConfig};
use crate::failover::Cleaner;
use crate::node::socket::SocketId;
use crate::node::{CpuStats, FrameStats, NodeConnection, NodeContext, NodeEvent, NodeMap, NodeStats};
use crate::player::{GatewayCommand, Player, VoicePacket, VoiceServerUpdate, VoiceStateUpdate};
use crate::routing::PacketRoutes;

pub const USER_ID: &str = "100";

/// A set of disconnected nodes wired to shared routes, events and failover.
pub struct TestPool {
    nodes: Arc<NodeMap>,
    pub routes: Arc<PacketRoutes>,
    events_tx: broadcast::Sender<NodeEvent>,
    events: broadcast::Receiver<NodeEvent>,
    gateway_tx: mpsc::UnboundedSender<GatewayCommand>,
    gateway_rx: mpsc::UnboundedReceiver<GatewayCommand>,
    auto_migrate: bool,
}

impl TestPool {
    pub fn new(names: &[&str], auto_migrate: bool) -> Self {
        Self::build(names, auto_migrate, |_| {})
    }

    pub fn with_resume(names: &[&str], key: &str, timeout_secs: u64) -> Self {
        Self::build(names, true, |config| {
            config.resume = ResumeConfig {
                enabled: true,
                key: Some(key.to_string()),
                timeout_secs,
            };
        })
    }

    fn build(names: &[&str], auto_migrate: bool, customize: impl Fn(&mut NodeConfig)) -> Self {
        let (events_tx, events) = broadcast::channel(256);
        let (gateway_tx, gateway_rx) = mpsc::unbounded_channel();
        let mut pool = Self {
            nodes: Arc::new(NodeMap::new()),
            routes: Arc::new(PacketRoutes::new()),
            events_tx,
            events,
            gateway_tx,
            gateway_rx,
            auto_migrate,
        };

        for name in names {
            let mut config = node_config(name);
            customize(&mut config);
            let node = NodeConnection::new(&config, pool.context()).unwrap();
            pool.nodes.insert(name.to_string(), Arc::new(node));
        }
        pool.drain_events();
        pool
    }

    pub fn context(&self) -> NodeContext {
        NodeContext {
            events: self.events_tx.clone(),
            routes: Arc::clone(&self.routes),
            cleaner: self.cleaner(),
        }
    }

    pub fn cleaner(&self) -> Cleaner {
        Cleaner::new(Arc::downgrade(&self.nodes), self.auto_migrate)
    }

    pub fn node(&self, name: &str) -> Arc<NodeConnection> {
        Arc::clone(self.nodes.get(name).expect("unknown test node").value())
    }

    /// Attach a new `Connecting` session to `node`, bypassing the gateway join.
    pub fn player(&self, node: &Arc<NodeConnection>, guild_id: &str) -> Arc<Player> {
        let player = Player::new(guild_id, "channel", node, self.gateway_tx.clone());
        node.attach_session(Arc::clone(&player)).unwrap();
        player
    }

    pub fn gateway(&self) -> mpsc::UnboundedSender<GatewayCommand> {
        self.gateway_tx.clone()
    }

    pub fn next_event(&mut self) -> NodeEvent {
        self.events.try_recv().expect("expected a node event")
    }

    pub fn try_event(&mut self) -> Option<NodeEvent> {
        self.events.try_recv().ok()
    }

    pub fn drain_events(&mut self) {
        while self.events.try_recv().is_ok() {}
    }

    pub fn next_gateway_command(&mut self) -> GatewayCommand {
        self.gateway_rx.try_recv().expect("expected a gateway command")
    }
}

pub fn node_config(name: &str) -> NodeConfig {
    NodeConfig {
        name: name.to_string(),
        address: "127.0.0.1:2333".to_string(),
        password: "youshallnotpass".to_string(),
        resume: ResumeConfig::default(),
    }
}

/// Drive `node` through connect and open without a real socket.
pub fn open(node: &Arc<NodeConnection>) -> (SocketId, mpsc::UnboundedReceiver<Message>) {
    let (id, rx) = node.begin_connect().expect("node is not disconnected");
    node.on_open(id);
    (id, rx)
}

pub fn stats(players: u64, system_load: f64) -> NodeStats {
    NodeStats {
        players,
        cpu: CpuStats {
            system_load,
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn stats_with_frames(players: u64, system_load: f64, deficit: u64, nulled: u64) -> NodeStats {
    NodeStats {
        frame_stats: Some(FrameStats {
            sent: 3000,
            nulled,
            deficit,
        }),
        ..stats(players, system_load)
    }
}

/// Deliver both voice packets so `player` sends its voice update on `node`.
pub fn give_voice_credentials(node: &NodeConnection, player: &Player) {
    player.handle_packet(
        node,
        VoicePacket::StateUpdate(VoiceStateUpdate {
            guild_id: player.guild_id().to_string(),
            channel_id: Some("channel".to_string()),
            user_id: USER_ID.to_string(),
            session_id: format!("session-{}", player.guild_id()),
        }),
    );
    player.handle_packet(
        node,
        VoicePacket::ServerUpdate(VoiceServerUpdate {
            guild_id: player.guild_id().to_string(),
            token: "token".to_string(),
            endpoint: Some("voice.example".to_string()),
        }),
    );
}
