//! Node registry.
//!
//! # Responsibilities
//! - Own one `NodeConnection` per configured node
//! - Pick nodes for new sessions and join voice channels
//! - Forward gateway voice packets to the node hosting the guild
//! - Reconnect nodes after unexpected closes

pub mod pool;

pub use pool::{JoinOptions, NodeRegistry};
