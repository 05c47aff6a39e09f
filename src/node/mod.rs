//! Node connection subsystem.
//!
//! # Data Flow
//! ```text
//! NodeRegistry
//!     → connection.rs (one NodeConnection per configured node)
//!     → socket.rs (websocket driver: upgrade, open, message, error, close)
//!     → state.rs (Disconnected → Connecting → Connected → Disconnected)
//!     → stats.rs (snapshot + penalty)
//!     → events.rs (Ready / Close / Error / Debug to subscribers)
//! ```

use std::sync::Arc;

use dashmap::DashMap;

pub mod connection;
pub mod events;
pub mod socket;
pub mod state;
pub mod stats;

pub use connection::{NodeConnection, NodeContext, ResumeSettings};
pub use events::NodeEvent;
pub use state::ConnectionState;
pub use stats::{CpuStats, FrameStats, MemoryStats, NodeStats};

/// All nodes of a registry, keyed by name.
pub type NodeMap = DashMap<String, Arc<NodeConnection>>;
