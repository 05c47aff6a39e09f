//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{HeaderMap, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use audio_node_pool::config::{NodeConfig, PoolConfig, ResumeConfig};
use audio_node_pool::node::NodeEvent;

pub const USER_ID: &str = "100";
pub const PASSWORD: &str = "youshallnotpass";
const WAIT: Duration = Duration::from_secs(5);

/// A websocket server standing in for a backend node.
pub struct MockBackend {
    pub addr: SocketAddr,
    connections: mpsc::UnboundedReceiver<MockConnection>,
}

/// One accepted client socket.
pub struct MockConnection {
    pub headers: HeaderMap,
    inbound: mpsc::UnboundedReceiver<String>,
    outbound: mpsc::UnboundedSender<Message>,
}

/// Start a mock backend on a random port. `resumed` is reported in the
/// upgrade response.
pub async fn start_mock_backend(resumed: bool) -> MockBackend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, connections) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                break;
            };
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut captured = HeaderMap::new();
                let callback = |request: &Request, mut response: Response| {
                    captured = request.headers().clone();
                    let value = if resumed { "true" } else { "false" };
                    response
                        .headers_mut()
                        .insert("Session-Resumed", HeaderValue::from_static(value));
                    Ok::<_, ErrorResponse>(response)
                };
                let Ok(ws) = tokio_tungstenite::accept_hdr_async(socket, callback).await else {
                    return;
                };

                let (mut sink, mut stream) = ws.split();
                let (in_tx, inbound) = mpsc::unbounded_channel();
                let (outbound, mut out_rx) = mpsc::unbounded_channel::<Message>();

                tokio::spawn(async move {
                    while let Some(message) = out_rx.recv().await {
                        if sink.send(message).await.is_err() {
                            break;
                        }
                    }
                });
                tokio::spawn(async move {
                    while let Some(Ok(message)) = stream.next().await {
                        if let Message::Text(text) = message {
                            let _ = in_tx.send(text.as_str().to_string());
                        }
                    }
                });

                let _ = tx.send(MockConnection {
                    headers: captured,
                    inbound,
                    outbound,
                });
            });
        }
    });

    MockBackend { addr, connections }
}

impl MockBackend {
    pub async fn next_connection(&mut self) -> MockConnection {
        tokio::time::timeout(WAIT, self.connections.recv())
            .await
            .expect("timed out waiting for a connection")
            .expect("backend stopped")
    }
}

impl MockConnection {
    pub fn send_text(&self, text: &str) {
        self.outbound.send(Message::text(text)).unwrap();
    }

    pub fn close(&self, code: u16, reason: &str) {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_string().into(),
        };
        self.outbound.send(Message::Close(Some(frame))).unwrap();
    }

    /// Next text frame sent by the client, decoded as JSON.
    pub async fn next_json(&mut self) -> serde_json::Value {
        let text = tokio::time::timeout(WAIT, self.inbound.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("client disconnected");
        serde_json::from_str(&text).unwrap()
    }
}

pub fn node_config(name: &str, addr: SocketAddr) -> NodeConfig {
    NodeConfig {
        name: name.to_string(),
        address: addr.to_string(),
        password: PASSWORD.to_string(),
        resume: ResumeConfig::default(),
    }
}

pub fn pool_config(nodes: Vec<NodeConfig>) -> PoolConfig {
    let mut config = PoolConfig::default();
    config.client.user_id = USER_ID.to_string();
    config.client.client_name = "pool-test".to_string();
    config.nodes = nodes;
    config.reconnect.enabled = false;
    config
}

/// Wait for the first event matching `predicate`.
pub async fn wait_for_event<F>(events: &mut broadcast::Receiver<NodeEvent>, predicate: F) -> NodeEvent
where
    F: Fn(&NodeEvent) -> bool,
{
    tokio::time::timeout(WAIT, async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for a node event")
}

/// Poll `condition` until it holds.
pub async fn eventually<F>(condition: F)
where
    F: Fn() -> bool,
{
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not met in time")
}
