//! Node statistics and penalty scoring.
//!
//! A stats frame from the backend replaces the previous snapshot wholesale.
//! The penalty derived from it ranks nodes for failover; lower is healthier.

use serde::{Deserialize, Serialize};

/// Last reported load metrics of a node.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeStats {
    /// Sessions hosted by the node.
    pub players: u64,
    /// Sessions currently producing audio.
    pub playing_players: u64,
    /// Node uptime in milliseconds.
    pub uptime: u64,
    pub memory: MemoryStats,
    pub cpu: CpuStats,
    /// Absent when the node has no audio frames to report.
    pub frame_stats: Option<FrameStats>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MemoryStats {
    pub free: u64,
    pub used: u64,
    pub allocated: u64,
    pub reservable: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CpuStats {
    pub cores: u32,
    /// Whole-system load in `[0, 1]`.
    pub system_load: f64,
    /// Load caused by the node process in `[0, 1]`.
    pub lavalink_load: f64,
}

/// Per-minute audio frame counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FrameStats {
    pub sent: u64,
    pub nulled: u64,
    pub deficit: u64,
}

impl NodeStats {
    /// Load penalty of the node.
    ///
    /// `players + round(1.05^(100 * system_load) * 10 - 10)` plus
    /// `deficit + 2 * nulled` when frame statistics were reported.
    pub fn penalty(&self) -> u64 {
        let cpu = (1.05f64.powf(100.0 * self.cpu.system_load) * 10.0 - 10.0)
            .round()
            .max(0.0) as u64;

        let frames = match self.frame_stats {
            Some(frames) => frames.deficit.saturating_add(frames.nulled.saturating_mul(2)),
            None => 0,
        };

        self.players.saturating_add(cpu).saturating_add(frames)
    }
}
