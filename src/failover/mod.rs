//! Failover subsystem.
//!
//! # Data Flow
//! ```text
//! NodeConnection::on_close
//!     → cleaner.rs (one-shot guard, migrate or drop sessions)
//!     → selector.rs (rank connected siblings by penalty)
//!     → Player::move_to / Player::mark_disconnected
//! ```
//!
//! # Design Decisions
//! - Runs synchronously inside the close callback, once per close
//! - Sibling stats are read without locks; ranking is best effort
//! - Ties are broken by node name

pub mod cleaner;
pub mod selector;

pub use cleaner::{Cleaner, FailoverOutcome, FailoverReport};
pub use selector::{LeastPenalty, NodeSelector};
