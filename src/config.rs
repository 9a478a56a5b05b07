//! Repository configuration (`spec.md`'s ambient config layer; the
//! concrete file-grammar parsing `spec.md` §1 excludes as a Non-goal is
//! out of scope, but the struct and its defaults are part of the ambient
//! stack carried regardless).

use serde::{Deserialize, Serialize};

/// Configuration for one repository instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// This repository's own authoritative `host:port`, as stamped into
    /// `master-repository` hints and compared against in mastership's A1.
    pub host_port: String,
    /// How long the mastership recovery driver sleeps between drains of
    /// an empty recovery queue (`spec.md` §4.2: "default 1 hour sleep when
    /// idle, immediate wakeup when new work arrives").
    #[serde(with = "duration_secs")]
    pub recovery_idle_sleep: std::time::Duration,
    /// Time-to-live for an entry in the replicator's `bad_readWhole_peers`
    /// map (`spec.md` §4.3, §5).
    #[serde(with = "duration_secs")]
    pub bad_peer_ttl: std::time::Duration,
    /// Constructor flag for this repository's [`crate::rwlock::RwLock`]
    /// (`spec.md` §4.4).
    pub favor_writers: bool,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            host_port: "localhost:0".to_string(),
            recovery_idle_sleep: std::time::Duration::from_secs(60 * 60),
            bad_peer_ttl: std::time::Duration::from_secs(60 * 60),
            favor_writers: false,
        }
    }
}

impl RepositoryConfig {
    /// Parses a TOML configuration document, falling back to
    /// [`RepositoryConfig::default`] for any field it omits.
    pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        d.as_secs().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_spec_idle_sleep() {
        let cfg = RepositoryConfig::default();
        assert_eq!(cfg.recovery_idle_sleep, std::time::Duration::from_secs(3600));
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let cfg = RepositoryConfig::from_toml("host_port = \"repo1.example.com:8080\"\n").unwrap();
        assert_eq!(cfg.host_port, "repo1.example.com:8080");
        assert_eq!(cfg.bad_peer_ttl, std::time::Duration::from_secs(3600));
    }
}
