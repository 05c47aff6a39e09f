//! Metrics collection and exposition.
//!
//! # Metrics
//! - `node_pool_node_state` (gauge, node): 0=disconnected, 1=connecting, 2=connected
//! - `node_pool_node_penalty` (gauge, node): last computed penalty
//! - `node_pool_node_sessions` (gauge, node): sessions hosted
//! - `node_pool_failover_sessions_total` (counter, node, outcome): migrated or dropped
//! - `node_pool_reconnect_attempts_total` (counter, node)

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::node::ConnectionState;

pub const NODE_STATE: &str = "node_pool_node_state";
pub const NODE_PENALTY: &str = "node_pool_node_penalty";
pub const NODE_SESSIONS: &str = "node_pool_node_sessions";
pub const FAILOVER_SESSIONS_TOTAL: &str = "node_pool_failover_sessions_total";
pub const RECONNECT_ATTEMPTS_TOTAL: &str = "node_pool_reconnect_attempts_total";

/// Install the Prometheus recorder and serve it on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(%addr, "Prometheus metrics endpoint installed");
    Ok(())
}

pub fn record_node_state(node: &str, state: ConnectionState) {
    gauge!(NODE_STATE, "node" => node.to_string()).set(state as u8 as f64);
}

pub fn record_node_penalty(node: &str, penalty: u64) {
    gauge!(NODE_PENALTY, "node" => node.to_string()).set(penalty as f64);
}

pub fn record_node_sessions(node: &str, sessions: usize) {
    gauge!(NODE_SESSIONS, "node" => node.to_string()).set(sessions as f64);
}

pub fn record_failover(node: &str, migrated: usize, dropped: usize) {
    counter!(FAILOVER_SESSIONS_TOTAL, "node" => node.to_string(), "outcome" => "migrated")
        .increment(migrated as u64);
    counter!(FAILOVER_SESSIONS_TOTAL, "node" => node.to_string(), "outcome" => "dropped")
        .increment(dropped as u64);
}

pub fn record_reconnect_attempt(node: &str) {
    counter!(RECONNECT_ATTEMPTS_TOTAL, "node" => node.to_string()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_recorder_is_noop() {
        record_node_state("a", ConnectionState::Connected);
        record_node_penalty("a", 12);
        record_node_sessions("a", 3);
        record_failover("a", 1, 2);
        record_reconnect_attempt("a");
    }

    #[test]
    fn rendered_output_contains_node_gauges() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            record_node_penalty("main", 22);
        });
        let output = handle.render();
        assert!(output.contains(NODE_PENALTY));
        assert!(output.contains("node=\"main\""));
    }

    #[test]
    fn metric_names_are_snake_case() {
        for name in [
            NODE_STATE,
            NODE_PENALTY,
            NODE_SESSIONS,
            FAILOVER_SESSIONS_TOTAL,
            RECONNECT_ATTEMPTS_TOTAL,
        ] {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }
}
