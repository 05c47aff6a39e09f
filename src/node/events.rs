//! Lifecycle events emitted by node connections.

use std::sync::Arc;

use crate::error::NodeError;

/// Event published on the registry-wide node event channel.
#[derive(Debug, Clone)]
pub enum NodeEvent {
    /// Socket open and resumption configured.
    Ready { node: String, resumed: bool },
    /// Socket closed.
    Close { node: String, code: u16, reason: String },
    /// Protocol, transport or configuration failure.
    Error { node: String, error: Arc<NodeError> },
    /// Raw inbound frame, for observability.
    Debug { node: String, message: String },
}

impl NodeEvent {
    /// Name of the node that emitted the event.
    pub fn node(&self) -> &str {
        match self {
            NodeEvent::Ready { node, .. }
            | NodeEvent::Close { node, .. }
            | NodeEvent::Error { node, .. }
            | NodeEvent::Debug { node, .. } => node,
        }
    }
}
