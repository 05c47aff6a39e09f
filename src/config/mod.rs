//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → PoolConfig (validated, immutable)
//!     → handed to NodeRegistry at startup
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::ClientConfig;
pub use schema::FailoverConfig;
pub use schema::NodeConfig;
pub use schema::PoolConfig;
pub use schema::ReconnectConfig;
pub use schema::ResumeConfig;
pub use schema::ObservabilityConfig;
pub use schema::SessionConfig;
