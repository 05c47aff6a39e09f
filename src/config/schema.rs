//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the pool.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the node pool.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct PoolConfig {
    /// Identity presented to every node during the handshake.
    pub client: ClientConfig,

    /// Backend node definitions.
    pub nodes: Vec<NodeConfig>,

    /// Session migration settings.
    pub failover: FailoverConfig,

    /// Reconnect policy driven by the registry.
    pub reconnect: ReconnectConfig,

    /// Session join settings.
    pub sessions: SessionConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Client identity sent in the connection handshake.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Bot user id (`User-Id` header).
    pub user_id: String,

    /// Total shard count (`Num-Shards` header).
    pub shard_count: u32,

    /// Client name (`Client-Name` header).
    pub client_name: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_id: String::new(),
            shard_count: 1,
            client_name: concat!("audio-node-pool/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Backend node configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NodeConfig {
    /// Unique node identifier.
    pub name: String,

    /// Node address (e.g., "127.0.0.1:2333").
    pub address: String,

    /// Shared secret sent as the `Authorization` header.
    #[serde(default)]
    pub password: String,

    /// Session resumption settings.
    #[serde(default)]
    pub resume: ResumeConfig,
}

/// Resumption settings for a single node.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ResumeConfig {
    /// Ask the node to keep sessions alive across reconnects.
    pub enabled: bool,

    /// Resume key. A random key is generated when absent.
    pub key: Option<String>,

    /// Seconds the node keeps sessions after the socket drops.
    pub timeout_secs: u64,
}

impl Default for ResumeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            key: None,
            timeout_secs: 60,
        }
    }
}

/// Failover configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FailoverConfig {
    /// Move sessions to the healthiest connected node when their node drops.
    pub auto_migrate: bool,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self { auto_migrate: true }
    }
}

/// Reconnect configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Reconnect nodes after an unexpected close.
    pub enabled: bool,

    /// Maximum consecutive attempts before giving up (0 = unlimited).
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 10,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
        }
    }
}

/// Session configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Seconds to wait for voice credentials after a join request.
    pub join_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            join_timeout_secs: 10,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_fills_defaults() {
        let raw = r#"
            [client]
            user_id = "1234"

            [[nodes]]
            name = "main"
            address = "127.0.0.1:2333"
            password = "youshallnotpass"
        "#;

        let config: PoolConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.client.user_id, "1234");
        assert_eq!(config.client.shard_count, 1);
        assert_eq!(config.nodes.len(), 1);
        assert!(!config.nodes[0].resume.enabled);
        assert_eq!(config.nodes[0].resume.timeout_secs, 60);
        assert!(config.failover.auto_migrate);
        assert_eq!(config.sessions.join_timeout_secs, 10);
    }
}
