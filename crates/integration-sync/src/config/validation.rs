//! Configuration validation.

use super::{Config, IntegrationDescriptor};
use crate::drivers::DialectKind;
use crate::error::{Result, SyncError};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    if config.local.path.as_os_str().is_empty() {
        return Err(SyncError::Config("local.path is required".into()));
    }
    if config.connection.connect_timeout_secs == 0 {
        return Err(SyncError::Config(
            "connection.connect_timeout_secs must be at least 1".into(),
        ));
    }
    if let Some(target) = &config.target {
        validate_descriptor(target).map_err(|e| match e {
            SyncError::Config(msg) => SyncError::Config(format!("target.{}", msg)),
            other => other,
        })?;
    }
    Ok(())
}

/// Validate a single integration descriptor.
pub fn validate_descriptor(descriptor: &IntegrationDescriptor) -> Result<()> {
    if descriptor.database.trim().is_empty() {
        return Err(SyncError::Config("database is required".into()));
    }

    if descriptor.dialect == DialectKind::Sqlite {
        return Ok(());
    }

    if descriptor.host.as_deref().map_or(true, |h| h.trim().is_empty()) {
        return Err(SyncError::Config(format!(
            "host is required for {}",
            descriptor.dialect
        )));
    }
    if descriptor
        .username
        .as_deref()
        .map_or(true, |u| u.trim().is_empty())
    {
        return Err(SyncError::Config(format!(
            "username is required for {}",
            descriptor.dialect
        )));
    }
    if descriptor.port == Some(0) {
        return Err(SyncError::Config("port must be between 1 and 65535".into()));
    }

    Ok(())
}
