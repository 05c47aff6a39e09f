//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! NodeEvent::Close (unexpected)
//!     → registry reconnector
//!     → backoff.rs (exponential delay with jitter)
//!     → NodeConnection::connect
//! ```
//!
//! # Design Decisions
//! - Attempts are counted per node and reset once the node is ready
//! - Jitter keeps nodes that dropped together from reconnecting in lockstep

pub mod backoff;

pub use backoff::{calculate_backoff, ReconnectPolicy};
