//! # Configuration
//!
//! Plain structs with sensible defaults. Loaded once at startup, either built
//! in code or parsed from TOML:
//!
//! ```toml
//! handle_capacity = 4096
//! event_log_capacity = 512
//!
//! [core_thread]
//! thread_name = "core"
//! slow_command_us = 2000
//!
//! [object_sync]
//! mode = "batched"
//! dirty_capacity = 1024
//! ```

use serde::Deserialize;

use crate::error::{ConfigError, ConfigResult};

/// Configuration for the core thread run loop.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CoreThreadConfig {
    /// OS-visible name of the core thread.
    pub thread_name: String,
    /// Commands running longer than this (microseconds) are logged as slow.
    /// Zero disables the check.
    pub slow_command_us: u64,
}

impl Default for CoreThreadConfig {
    fn default() -> Self {
        Self {
            thread_name: String::from("tandem-core"),
            slow_command_us: 4_000,
        }
    }
}

/// How dirty objects are shipped to the core thread each tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// One queue entry carrying every payload of the tick.
    #[default]
    Batched,
    /// One queue entry per dirty object.
    PerObject,
}

/// Configuration for the core object manager.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ObjectSyncConfig {
    /// Batching strategy for sync commands.
    pub mode: SyncMode,
    /// Initial capacity of the per-tick dirty set.
    pub dirty_capacity: usize,
}

impl Default for ObjectSyncConfig {
    fn default() -> Self {
        Self {
            mode: SyncMode::Batched,
            dirty_capacity: 256,
        }
    }
}

/// Top-level configuration for an engine instance.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Core thread settings.
    pub core_thread: CoreThreadConfig,
    /// Dirty sync settings.
    pub object_sync: ObjectSyncConfig,
    /// Initial capacity of the handle registry.
    pub handle_capacity: usize,
    /// Initial capacity of the resource listener registry.
    pub listener_capacity: usize,
    /// Most core-side events kept for inspection. Older ones are evicted.
    pub event_log_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            core_thread: CoreThreadConfig::default(),
            object_sync: ObjectSyncConfig::default(),
            handle_capacity: 1024,
            listener_capacity: 64,
            event_log_capacity: 1024,
        }
    }
}

impl EngineConfig {
    /// Parses and validates a TOML document. Missing keys take defaults.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] on malformed TOML, [`ConfigError::Invalid`] if
    /// validation fails.
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks values that parse fine but cannot be used.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] describing the first bad value.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.core_thread.thread_name.trim().is_empty() {
            return Err(ConfigError::Invalid("core_thread.thread_name is empty".into()));
        }
        if self.core_thread.thread_name.contains('\0') {
            return Err(ConfigError::Invalid(
                "core_thread.thread_name contains a NUL byte".into(),
            ));
        }
        if self.event_log_capacity == 0 {
            return Err(ConfigError::Invalid("event_log_capacity is zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_parse_partial_document() {
        let config = EngineConfig::from_toml_str(
            r#"
            handle_capacity = 16

            [object_sync]
            mode = "per_object"
            "#,
        )
        .unwrap();

        assert_eq!(config.handle_capacity, 16);
        assert_eq!(config.object_sync.mode, SyncMode::PerObject);
        assert_eq!(config.core_thread, CoreThreadConfig::default());
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            EngineConfig::from_toml_str("handle_capacity = \"lots\""),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("[core_thread]\nthread_name = \"  \""),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("event_log_capacity = 0"),
            Err(ConfigError::Invalid(_))
        ));
    }
}
