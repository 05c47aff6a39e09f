//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Node names are unique and addresses parse
//! - Client identity is usable for the handshake
//!
//! Returns every error found, not just the first.

use std::collections::HashSet;
use std::fmt;

use crate::config::schema::PoolConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    MissingUserId,
    ZeroShardCount,
    NoNodes,
    EmptyNodeName,
    DuplicateNodeName(String),
    InvalidAddress { node: String, address: String },
    ZeroResumeTimeout(String),
    InvalidBackoff,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::MissingUserId => write!(f, "client.user_id must be set"),
            ValidationError::ZeroShardCount => write!(f, "client.shard_count must be at least 1"),
            ValidationError::NoNodes => write!(f, "at least one node must be configured"),
            ValidationError::EmptyNodeName => write!(f, "node name must not be empty"),
            ValidationError::DuplicateNodeName(name) => write!(f, "duplicate node name '{}'", name),
            ValidationError::InvalidAddress { node, address } => {
                write!(f, "node '{}' has invalid address '{}'", node, address)
            }
            ValidationError::ZeroResumeTimeout(node) => {
                write!(f, "node '{}' enables resuming with a zero timeout", node)
            }
            ValidationError::InvalidBackoff => {
                write!(f, "reconnect.base_delay_ms must not exceed reconnect.max_delay_ms")
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validate a parsed configuration.
pub fn validate_config(config: &PoolConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.client.user_id.trim().is_empty() {
        errors.push(ValidationError::MissingUserId);
    }
    if config.client.shard_count == 0 {
        errors.push(ValidationError::ZeroShardCount);
    }
    if config.nodes.is_empty() {
        errors.push(ValidationError::NoNodes);
    }

    let mut seen = HashSet::new();
    for node in &config.nodes {
        if node.name.trim().is_empty() {
            errors.push(ValidationError::EmptyNodeName);
        } else if !seen.insert(node.name.as_str()) {
            errors.push(ValidationError::DuplicateNodeName(node.name.clone()));
        }

        if url::Url::parse(&format!("ws://{}", node.address)).is_err() || node.address.is_empty() {
            errors.push(ValidationError::InvalidAddress {
                node: node.name.clone(),
                address: node.address.clone(),
            });
        }

        if node.resume.enabled && node.resume.timeout_secs == 0 {
            errors.push(ValidationError::ZeroResumeTimeout(node.name.clone()));
        }
    }

    if config.reconnect.base_delay_ms > config.reconnect.max_delay_ms {
        errors.push(ValidationError::InvalidBackoff);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{NodeConfig, ResumeConfig};

    fn node(name: &str, address: &str) -> NodeConfig {
        NodeConfig {
            name: name.into(),
            address: address.into(),
            password: "secret".into(),
            resume: ResumeConfig::default(),
        }
    }

    #[test]
    fn valid_config_passes() {
        let mut config = PoolConfig::default();
        config.client.user_id = "42".into();
        config.nodes.push(node("a", "127.0.0.1:2333"));
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn reports_all_errors() {
        let mut config = PoolConfig::default();
        config.client.shard_count = 0;
        config.nodes.push(node("a", "127.0.0.1:2333"));
        config.nodes.push(node("a", ""));
        config.reconnect.base_delay_ms = 10_000;
        config.reconnect.max_delay_ms = 100;

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::MissingUserId));
        assert!(errors.contains(&ValidationError::ZeroShardCount));
        assert!(errors.contains(&ValidationError::DuplicateNodeName("a".into())));
        assert!(errors.contains(&ValidationError::InvalidAddress {
            node: "a".into(),
            address: String::new(),
        }));
        assert!(errors.contains(&ValidationError::InvalidBackoff));
    }

    #[test]
    fn resume_requires_timeout() {
        let mut config = PoolConfig::default();
        config.client.user_id = "42".into();
        let mut n = node("a", "127.0.0.1:2333");
        n.resume.enabled = true;
        n.resume.timeout_secs = 0;
        config.nodes.push(n);

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors, vec![ValidationError::ZeroResumeTimeout("a".into())]);
    }
}
