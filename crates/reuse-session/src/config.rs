//! Configuration for the session store.

use std::time::Duration;

use reuse_config::StoreSection;

/// Default TTL for stored sessions: 48 hours.
///
/// Past this the remote side has most likely recycled the session on its own.
pub const DEFAULT_TTL: Duration = Duration::from_secs(48 * 3600);

/// Configuration for the session store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// How long a stored session stays eligible for `pull`.
    pub ttl: Duration,

    /// Whether rebuilds remove entries whose envelope or session payload
    /// fails to decode.
    ///
    /// Off by default: such entries stay in the raw store so that a reader
    /// with a compatible schema can still use them.
    pub prune_undecodable: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            prune_undecodable: false,
        }
    }
}

impl StoreConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the TTL for stored sessions.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Enable or disable pruning of undecodable entries.
    pub fn with_prune_undecodable(mut self, enabled: bool) -> Self {
        self.prune_undecodable = enabled;
        self
    }
}

impl From<&StoreSection> for StoreConfig {
    fn from(section: &StoreSection) -> Self {
        Self {
            ttl: section.ttl(),
            prune_undecodable: section.prune_undecodable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::new();
        assert_eq!(config.ttl, Duration::from_secs(172_800));
        assert!(!config.prune_undecodable);
    }

    #[test]
    fn test_from_section() {
        let section = StoreSection {
            ttl_secs: 90,
            prune_undecodable: true,
        };
        let config = StoreConfig::from(&section);
        assert_eq!(
            config,
            StoreConfig::new()
                .with_ttl(Duration::from_secs(90))
                .with_prune_undecodable(true)
        );
    }
}
