//! Session failover ("cleaner") run when a node disconnects.
//!
//! # Algorithm
//! ```text
//! close(node)
//!     → first run since start: set the one-shot flag, keep sessions
//!     → later runs:
//!         candidates = other nodes in Connected
//!         auto_migrate && candidates? → move each session to least penalty
//!                                       (failed move → hard disconnect)
//!         otherwise                   → hard disconnect each session
//! ```
//!
//! Sessions are handled one at a time and independently; a failed move never
//! stops the remaining sessions from being processed.

use std::sync::{Arc, Weak};

use crate::failover::selector::{LeastPenalty, NodeSelector};
use crate::node::{NodeConnection, NodeMap};
use crate::observability::metrics;

/// Result of one failover run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailoverOutcome {
    /// First run for the node: only the one-shot flag was set.
    Armed,
    Completed(FailoverReport),
}

/// What happened to the sessions of the disconnected node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailoverReport {
    /// Node the sessions were moved to, if any.
    pub target: Option<String>,
    pub migrated: usize,
    pub dropped: usize,
}

/// Failover coordinator shared by all nodes of a registry.
#[derive(Debug, Clone)]
pub struct Cleaner {
    nodes: Weak<NodeMap>,
    auto_migrate: bool,
    selector: LeastPenalty,
}

impl Cleaner {
    pub fn new(nodes: Weak<NodeMap>, auto_migrate: bool) -> Self {
        Self {
            nodes,
            auto_migrate,
            selector: LeastPenalty::new(),
        }
    }

    /// Migrate or drop the sessions of `node`, which has just closed.
    pub fn run(&self, node: &NodeConnection) -> FailoverOutcome {
        // NOTE: the first close of a node only arms the flag and leaves its
        // sessions attached. Observed behaviour, not confirmed as intended.
        if !node.arm_cleaner() {
            return FailoverOutcome::Armed;
        }

        let target = if self.auto_migrate {
            let candidates = self.healthy_siblings(node);
            self.selector.select(&candidates)
        } else {
            None
        };

        let mut report = FailoverReport {
            target: target.as_ref().map(|t| t.name().to_string()),
            ..Default::default()
        };

        for player in node.sessions() {
            let moved = match &target {
                Some(target) => match player.move_to(node, target) {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!(
                            node = %node.name(),
                            guild_id = %player.guild_id(),
                            error = %e,
                            "Session migration failed, disconnecting"
                        );
                        false
                    }
                },
                None => false,
            };

            if moved {
                report.migrated += 1;
            } else {
                player.mark_disconnected("node disconnected");
                report.dropped += 1;
            }
        }

        metrics::record_failover(node.name(), report.migrated, report.dropped);
        FailoverOutcome::Completed(report)
    }

    fn healthy_siblings(&self, node: &NodeConnection) -> Vec<Arc<NodeConnection>> {
        let Some(nodes) = self.nodes.upgrade() else {
            return Vec::new();
        };
        nodes
            .iter()
            .filter(|entry| entry.key() != node.name() && entry.value().is_connected())
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }
}
