//! Hub Config - supervisor settings
//!
//! Every field is optional so that a project file can override a single
//! value of the global file. Accessors fall back to the defaults below.

use super::store::{load_file, ConfigStore};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Settings file names, probed in this order inside each store
pub const HUB_CONFIG_FILES: [&str; 2] = ["hub.toml", "hub.json"];

pub const DEFAULT_MAX_CHILDREN: usize = 20;
pub const DEFAULT_DRAIN_GRACE_MS: u64 = 2_000;
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 5_000;

/// Hub settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HubConfig {
    /// Registry capacity
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_children: Option<usize>,

    /// How long to keep draining output after the process has exited
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drain_grace_ms: Option<u64>,

    /// Bound on the second phase of shutdown
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shutdown_timeout_ms: Option<u64>,

    /// How long `example` waits for the target's Init envelope
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handshake_timeout_ms: Option<u64>,

    /// Node binary launched by the `spawn` shell command
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_program: Option<PathBuf>,
}

impl HubConfig {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Load
    // ========================================================================

    /// Global, then project, then `explicit` (later wins)
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = Self::new();

        if let Ok(global) = ConfigStore::global() {
            if let Some(global_config) = Self::load_from_store(&global)? {
                config.merge(global_config);
            }
        }

        if let Ok(project) = ConfigStore::current_project() {
            if let Some(project_config) = Self::load_from_store(&project)? {
                config.merge(project_config);
            }
        }

        if let Some(path) = explicit {
            config.merge(load_file(path)?);
        }

        Ok(config)
    }

    /// First hub settings file found in `store`
    pub fn load_from_store(store: &ConfigStore) -> Result<Option<Self>> {
        for filename in HUB_CONFIG_FILES {
            if let Some(config) = store.load_optional::<Self>(filename)? {
                debug!(path = %store.file_path(filename).display(), "Loaded hub config");
                return Ok(Some(config));
            }
        }
        Ok(None)
    }

    // ========================================================================
    // Merge
    // ========================================================================

    /// Merge with another config (other wins)
    pub fn merge(&mut self, other: HubConfig) {
        if other.max_children.is_some() {
            self.max_children = other.max_children;
        }
        if other.drain_grace_ms.is_some() {
            self.drain_grace_ms = other.drain_grace_ms;
        }
        if other.shutdown_timeout_ms.is_some() {
            self.shutdown_timeout_ms = other.shutdown_timeout_ms;
        }
        if other.handshake_timeout_ms.is_some() {
            self.handshake_timeout_ms = other.handshake_timeout_ms;
        }
        if other.node_program.is_some() {
            self.node_program = other.node_program;
        }
    }

    // ========================================================================
    // Resolved values
    // ========================================================================

    pub fn max_children(&self) -> usize {
        self.max_children.unwrap_or(DEFAULT_MAX_CHILDREN)
    }

    pub fn drain_grace(&self) -> Duration {
        Duration::from_millis(self.drain_grace_ms.unwrap_or(DEFAULT_DRAIN_GRACE_MS))
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(
            self.shutdown_timeout_ms
                .unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT_MS),
        )
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(
            self.handshake_timeout_ms
                .unwrap_or(DEFAULT_HANDSHAKE_TIMEOUT_MS),
        )
    }

    // ========================================================================
    // Builder
    // ========================================================================

    pub fn with_max_children(mut self, max: usize) -> Self {
        self.max_children = Some(max);
        self
    }

    pub fn with_node_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.node_program = Some(program.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HubConfig::default();
        assert_eq!(config.max_children(), 20);
        assert_eq!(config.drain_grace(), Duration::from_secs(2));
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(5));
        assert_eq!(config.handshake_timeout(), Duration::from_secs(5));
        assert!(config.node_program.is_none());
    }

    #[test]
    fn test_merge_keeps_unset_fields() {
        let mut base = HubConfig::new()
            .with_max_children(8)
            .with_node_program("/usr/local/bin/distrual-node");
        base.merge(HubConfig::new().with_max_children(4));

        assert_eq!(base.max_children(), 4);
        assert_eq!(
            base.node_program.as_deref(),
            Some(Path::new("/usr/local/bin/distrual-node"))
        );
    }

    #[test]
    fn test_load_from_store_prefers_toml() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hub.toml"), "maxChildren = 3\n").unwrap();
        std::fs::write(dir.path().join("hub.json"), r#"{"maxChildren": 9}"#).unwrap();

        let store = ConfigStore::new(dir.path());
        let config = HubConfig::load_from_store(&store).unwrap().unwrap();
        assert_eq!(config.max_children(), 3);
    }

    #[test]
    fn test_load_explicit_file_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.json");
        std::fs::write(&path, r#"{"handshakeTimeoutMs": 250, "drainGraceMs": 10}"#).unwrap();

        let config = HubConfig::load(Some(&path)).unwrap();
        assert_eq!(config.handshake_timeout(), Duration::from_millis(250));
        assert_eq!(config.drain_grace(), Duration::from_millis(10));
    }

    #[test]
    fn test_load_explicit_missing_file_errors() {
        let result = HubConfig::load(Some(Path::new("/nonexistent/distrual/hub.toml")));
        assert!(result.is_err());
    }
}
