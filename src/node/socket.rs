//! Websocket driver for a node connection.
//!
//! # Data Flow
//! ```text
//! connect_async ──▶ on_upgrade ──▶ on_open
//!       │                              │
//!       ▼                              ▼
//!   on_error/on_close          reader loop ──▶ on_message
//!                                      │
//!                              close frame / error / EOF ──▶ on_close
//!
//! NodeConnection::send ──▶ SocketHandle (mpsc) ──▶ writer task ──▶ sink
//! ```
//!
//! The reader invokes callbacks one at a time, so callbacks for a single
//! socket never run concurrently.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use crate::error::NodeError;
use crate::node::connection::NodeConnection;

/// Close code used when a socket error forces the connection down.
pub const CLOSE_ON_ERROR: u16 = 4001;
/// Close code used when the resumption handshake could not be sent.
pub const CLOSE_ON_CONFIGURE_FAILURE: u16 = 4002;
/// Reported when the socket ends without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;
/// Reported when a close frame carries no status.
pub const CLOSE_NO_STATUS: u16 = 1005;

pub const SESSION_RESUMED_HEADER: &str = "Session-Resumed";

static SOCKET_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Identifies one socket of a node. Callbacks from an older socket are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SocketId(u64);

impl SocketId {
    fn next() -> Self {
        Self(SOCKET_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for SocketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "socket-{}", self.0)
    }
}

/// Write side of a live socket.
#[derive(Debug)]
pub struct SocketHandle {
    id: SocketId,
    outbound: mpsc::UnboundedSender<Message>,
    open: Arc<AtomicBool>,
}

impl SocketHandle {
    /// Create a handle and the receiver the writer task drains.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        let handle = Self {
            id: SocketId::next(),
            outbound,
            open: Arc::new(AtomicBool::new(false)),
        };
        (handle, rx)
    }

    pub fn id(&self) -> SocketId {
        self.id
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    pub(crate) fn mark_open(&self) {
        self.open.store(true, Ordering::Release);
    }

    /// Queue a frame for the writer task.
    pub(crate) fn write(&self, message: Message) -> Result<(), NodeError> {
        self.outbound
            .send(message)
            .map_err(|_| NodeError::Transport("socket writer has stopped".to_string()))
    }

    /// Queue a close frame. Later sends are rejected.
    pub(crate) fn close(&self, code: u16, reason: &str) {
        self.open.store(false, Ordering::Release);
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_string().into(),
        };
        // The writer may already be gone; the reader reports the close either way.
        let _ = self.outbound.send(Message::Close(Some(frame)));
    }
}

/// Handshake parameters for one connection attempt.
#[derive(Debug, Clone)]
pub struct Handshake<'a> {
    pub password: &'a str,
    pub user_id: &'a str,
    pub shard_count: u32,
    pub client_name: &'a str,
    pub resume_key: Option<&'a str>,
}

/// Build the upgrade request with authentication and resume headers.
pub fn build_request(url: &Url, handshake: &Handshake<'_>) -> Result<Request, NodeError> {
    let mut request = url
        .as_str()
        .into_client_request()
        .map_err(|e| NodeError::Transport(format!("invalid node url: {}", e)))?;

    let header = |value: &str| {
        HeaderValue::from_str(value)
            .map_err(|e| NodeError::Transport(format!("invalid header value: {}", e)))
    };

    let headers = request.headers_mut();
    headers.insert("Authorization", header(handshake.password)?);
    headers.insert("Num-Shards", header(&handshake.shard_count.to_string())?);
    headers.insert("User-Id", header(handshake.user_id)?);
    headers.insert("Client-Name", header(handshake.client_name)?);
    if let Some(key) = handshake.resume_key {
        headers.insert("Resume-Key", header(key)?);
    }

    Ok(request)
}

/// Spawn the driver for a freshly registered socket.
pub(crate) fn spawn_driver(
    node: Arc<NodeConnection>,
    request: Request,
    id: SocketId,
    outbound: mpsc::UnboundedReceiver<Message>,
) {
    tokio::spawn(drive(node, request, id, outbound));
}

async fn drive(
    node: Arc<NodeConnection>,
    request: Request,
    id: SocketId,
    mut outbound: mpsc::UnboundedReceiver<Message>,
) {
    let (ws, response) = match connect_async(request).await {
        Ok(pair) => pair,
        Err(e) => {
            let reason = e.to_string();
            node.on_error(id, NodeError::Transport(reason.clone()));
            node.on_close(id, CLOSE_ABNORMAL, reason);
            return;
        }
    };

    let resumed = response
        .headers()
        .get(SESSION_RESUMED_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    node.on_upgrade(id, resumed);

    let (mut sink, mut stream) = ws.split();

    let node_name = node.name().to_string();
    let writer = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            let closing = matches!(message, Message::Close(_));
            if let Err(e) = sink.send(message).await {
                tracing::debug!(node = %node_name, error = %e, "Socket write failed");
                break;
            }
            if closing {
                break;
            }
        }
    });

    node.on_open(id);

    let (code, reason) = loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => node.on_message(id, text.as_str()),
            Some(Ok(Message::Close(frame))) => {
                break match frame {
                    Some(frame) => (u16::from(frame.code), frame.reason.as_str().to_string()),
                    None => (CLOSE_NO_STATUS, String::new()),
                };
            }
            // Ping/pong are answered by tungstenite; binary frames are not part of the protocol.
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                let reason = e.to_string();
                node.on_error(id, NodeError::Transport(reason.clone()));
                break (CLOSE_ON_ERROR, reason);
            }
            None => break (CLOSE_ABNORMAL, "connection dropped".to_string()),
        }
    };

    writer.abort();
    node.on_close(id, code, reason);
}
