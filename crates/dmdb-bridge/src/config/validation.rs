//! Configuration validation.

use super::Config;
use crate::error::{BridgeError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Target validation
    if config.target.host.is_empty() {
        return Err(BridgeError::Config("target.host is required".into()));
    }
    if config.target.user.is_empty() {
        return Err(BridgeError::Config("target.user is required".into()));
    }
    if config.target.tablespace.is_empty() {
        return Err(BridgeError::Config("target.tablespace is required".into()));
    }
    if config.target.pool.max_size == 0 {
        return Err(BridgeError::Config(
            "target.pool.max_size must be at least 1".into(),
        ));
    }
    if config.target.pool.min_idle > config.target.pool.max_size {
        return Err(BridgeError::Config(format!(
            "target.pool.min_idle ({}) cannot exceed max_size ({})",
            config.target.pool.min_idle, config.target.pool.max_size
        )));
    }

    // Source validation, only when a source is configured
    if let Some(source) = &config.source {
        if source.host.is_empty() {
            return Err(BridgeError::Config("source.host is required".into()));
        }
        if source.database.is_empty() {
            return Err(BridgeError::Config("source.database is required".into()));
        }
        if source.user.is_empty() {
            return Err(BridgeError::Config("source.user is required".into()));
        }
    }

    if config.migration.page_limit == 0 {
        return Err(BridgeError::Config(
            "migration.page_limit must be at least 1".into(),
        ));
    }

    Ok(())
}
