//! Inbound message routing.
//!
//! # Data Flow
//! ```text
//! Backend frame (socket)
//!     → protocol.rs (decode by op)
//!     → stats        → NodeConnection snapshot
//!     → everything else → event.rs → Player
//!
//! Gateway packet (registry)
//!     → packet.rs (typed per-node channel)
//!     → Player
//! ```
//!
//! Both routers are pure dispatch and never touch the socket.

pub mod event;
pub mod packet;
pub mod protocol;

pub use packet::PacketRoutes;
pub use protocol::{Inbound, Outbound, PlayerPosition};
