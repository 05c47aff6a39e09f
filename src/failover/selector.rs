//! Least-penalty node selection.

use std::sync::Arc;

use crate::node::NodeConnection;

/// Strategy for picking a node out of a candidate set.
pub trait NodeSelector: Send + Sync + std::fmt::Debug {
    fn select(&self, nodes: &[Arc<NodeConnection>]) -> Option<Arc<NodeConnection>>;
}

/// Least penalty selector.
/// Selects the connected node with the lowest penalty; ties go to the
/// lexicographically smallest node name.
#[derive(Debug, Default, Clone, Copy)]
pub struct LeastPenalty;

impl LeastPenalty {
    pub fn new() -> Self {
        Self
    }
}

impl NodeSelector for LeastPenalty {
    fn select(&self, nodes: &[Arc<NodeConnection>]) -> Option<Arc<NodeConnection>> {
        nodes
            .iter()
            .filter(|n| n.is_connected())
            .map(|n| (n.penalty(), n))
            .min_by(|(a_penalty, a), (b_penalty, b)| {
                a_penalty.cmp(b_penalty).then_with(|| a.name().cmp(b.name()))
            })
            .map(|(_, n)| Arc::clone(n))
    }
}
