//! Error taxonomy for node connections and sessions.
//!
//! # Propagation
//! ```text
//! NodeError    → converted to NodeEvent::Error inside socket callbacks
//! SessionError → returned to the caller of join/leave/move
//! ```

use thiserror::Error;

/// Errors raised by a node connection.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Malformed inbound message. The socket stays open.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Socket connect or write failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The resumption handshake could not be sent.
    #[error("Failed to configure resuming: {0}")]
    Configuration(String),

    /// Outbound payload could not be encoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors surfaced to callers of session operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Join request without a guild or channel id.
    #[error("No guild or channel specified")]
    MissingTarget,

    /// Requested node is not configured.
    #[error("Node {0} is unknown")]
    UnknownNode(String),

    /// Requested node exists but is not connected.
    #[error("Node {0} is not ready")]
    NodeNotReady(String),

    /// No node is currently connected.
    #[error("No connected node available")]
    NoAvailableNode,

    /// A session for the guild is still waiting on voice credentials.
    #[error("Session for guild {0} is currently connecting")]
    AlreadyConnecting(String),

    /// The target node already hosts a session for the guild.
    #[error("Node {node} already hosts a session for guild {guild_id}")]
    DuplicateSession { guild_id: String, node: String },

    /// No session exists for the guild.
    #[error("No session for guild {0}")]
    UnknownSession(String),

    /// Voice credentials did not arrive in time.
    #[error("Timed out joining guild {0}")]
    JoinTimeout(String),

    /// The session was closed before it finished connecting.
    #[error("Session for guild {0} was closed while connecting")]
    JoinFailed(String),

    /// The target node did not accept the migrated voice state.
    #[error("Failed to move session for guild {guild_id} to node {node}")]
    MoveFailed { guild_id: String, node: String },
}

pub type NodeResult<T> = Result<T, NodeError>;
