//! Configuration types mapping to the TOML schema.
//!
//! ```toml
//! [store]
//! ttl_secs = 172800
//! prune_undecodable = false
//!
//! [persistence]
//! path = "sessions.json"
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default session lifetime: two days.
pub const DEFAULT_TTL_SECS: u64 = 48 * 3600;

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g., project-local
/// overrides) can be loaded and merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReuseConfig {
    /// Session store tuning.
    pub store: Option<StoreSection>,

    /// Where the raw store snapshot lives on disk.
    pub persistence: Option<PersistenceSection>,
}

impl ReuseConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> crate::Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> crate::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    pub fn merge(&mut self, other: ReuseConfig) {
        if other.store.is_some() {
            self.store = other.store;
        }
        if other.persistence.is_some() {
            self.persistence = other.persistence;
        }
    }

    /// The store section, or defaults when absent.
    pub fn store(&self) -> StoreSection {
        self.store.clone().unwrap_or_default()
    }

    /// The persistence section, or defaults when absent.
    pub fn persistence(&self) -> PersistenceSection {
        self.persistence.clone().unwrap_or_default()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Store Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Session store configuration.
///
/// ```toml
/// [store]
/// ttl_secs = 172800
/// prune_undecodable = false
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    /// Seconds a stored session stays eligible for reuse.
    pub ttl_secs: u64,
    /// Drop entries whose payload no longer decodes instead of keeping them
    /// for a future reader.
    pub prune_undecodable: bool,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_TTL_SECS,
            prune_undecodable: false,
        }
    }
}

impl StoreSection {
    /// TTL as a [`Duration`].
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Persistence Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Persistence configuration.
///
/// Without a `path` the store lives in memory only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceSection {
    /// Snapshot file for the raw store.
    pub path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config = ReuseConfig::from_toml(
            r#"
[store]
ttl_secs = 3600
prune_undecodable = true

[persistence]
path = "/var/lib/reuse/sessions.json"
"#,
        )
        .unwrap();

        let store = config.store();
        assert_eq!(store.ttl(), Duration::from_secs(3600));
        assert!(store.prune_undecodable);
        assert_eq!(
            config.persistence().path,
            Some(PathBuf::from("/var/lib/reuse/sessions.json"))
        );
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = ReuseConfig::from_toml("").unwrap();
        assert!(config.store.is_none());
        assert_eq!(config.store().ttl_secs, DEFAULT_TTL_SECS);
        assert!(!config.store().prune_undecodable);
        assert!(config.persistence().path.is_none());
    }

    #[test]
    fn test_partial_store_section() {
        let config = ReuseConfig::from_toml("[store]\nprune_undecodable = true\n").unwrap();
        let store = config.store();
        assert_eq!(store.ttl_secs, DEFAULT_TTL_SECS);
        assert!(store.prune_undecodable);
    }

    #[test]
    fn test_merge_overrides_present_sections() {
        let mut base = ReuseConfig::from_toml(
            r#"
[store]
ttl_secs = 10

[persistence]
path = "base.json"
"#,
        )
        .unwrap();
        let overlay = ReuseConfig::from_toml("[store]\nttl_secs = 20\n").unwrap();

        base.merge(overlay);

        assert_eq!(base.store().ttl_secs, 20);
        assert_eq!(base.persistence().path, Some(PathBuf::from("base.json")));
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = ReuseConfig {
            store: Some(StoreSection {
                ttl_secs: 42,
                prune_undecodable: true,
            }),
            persistence: Some(PersistenceSection {
                path: Some(PathBuf::from("snap.json")),
            }),
        };
        let text = config.to_toml().unwrap();
        assert_eq!(ReuseConfig::from_toml(&text).unwrap(), config);
    }
}
