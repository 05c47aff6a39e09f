//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Node connections, failover, registry:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (per-node gauges and counters)
//!
//! Consumers:
//!     → stdout (tracing-subscriber fmt layer)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Metric updates are fire-and-forget; without an installed recorder they are no-ops
//! - Every log line carries the node name as a field

pub mod logging;
pub mod metrics;
