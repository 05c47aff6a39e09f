//! Connection pool for audio backend nodes.
//!
//! Keeps a websocket to every configured node, scores nodes by load, routes
//! inbound frames and gateway voice packets to per-guild sessions, and moves
//! sessions off nodes that disconnect.

// Core subsystems
pub mod config;
pub mod error;
pub mod node;
pub mod player;
pub mod registry;
pub mod routing;

// Session management
pub mod failover;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;

#[cfg(test)]
mod testing;

pub use config::schema::PoolConfig;
pub use lifecycle::Shutdown;
pub use registry::{JoinOptions, NodeRegistry};
