//! Node configuration.
//!
//! Layers, lowest first: built-in defaults, an optional TOML file, the
//! `SWARM_*` environment variables, and finally command-line flags (applied by
//! the binary).

use crate::error::{Result, SwarmError};
use crate::gossip::Discovery;

use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Intervals and timeouts, all in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timings {
    /// Snapshot + heartbeat broadcast period; also the claim renewal period.
    pub gossip_interval_ms: u64,
    /// Reclaim and liveness check period.
    pub sweep_interval_ms: u64,
    /// Age after which another peer's claim is considered abandoned.
    pub reclaim_ttl_ms: u64,
    /// Silence after which a peer is dropped from the peer list.
    pub liveness_timeout_ms: u64,
    pub send_timeout_ms: u64,
    /// How long to listen for an existing Target before prompting.
    pub sync_wait_ms: u64,
    /// Worker back-off while there is no Target or no pending chunk.
    pub target_poll_ms: u64,
    pub status_interval_ms: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            gossip_interval_ms: 1_000,
            sweep_interval_ms: 1_000,
            reclaim_ttl_ms: 30_000,
            liveness_timeout_ms: 10_000,
            send_timeout_ms: 250,
            sync_wait_ms: 12_000,
            target_poll_ms: 500,
            status_interval_ms: 5_000,
        }
    }
}

impl Timings {
    pub fn gossip_interval(&self) -> Duration {
        Duration::from_millis(self.gossip_interval_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn reclaim_ttl(&self) -> Duration {
        Duration::from_millis(self.reclaim_ttl_ms)
    }

    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_millis(self.liveness_timeout_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn sync_wait(&self) -> Duration {
        Duration::from_millis(self.sync_wait_ms)
    }

    pub fn target_poll(&self) -> Duration {
        Duration::from_millis(self.target_poll_ms)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Fixed peer id; a random UUID when unset.
    pub peer_id: Option<String>,
    pub bind: SocketAddr,
    pub discovery: Discovery,
    /// Address of the HTTP status endpoint; disabled when unset.
    pub http: Option<SocketAddr>,
    pub workers: usize,
    /// Candidates tested between two cancellation checks.
    pub poll_interval: u64,
    pub timings: Timings,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            peer_id: None,
            bind: SocketAddr::from(([0, 0, 0, 0], 50001)),
            discovery: Discovery::default(),
            http: None,
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            poll_interval: 4096,
            timings: Timings::default(),
        }
    }
}

impl NodeConfig {
    /// Defaults, then `path` if given, then the environment. Not validated;
    /// call `validate` once command-line flags are applied.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            SwarmError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&contents).map_err(|e| {
            SwarmError::Config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Applies `SWARM_BIND`, `SWARM_PEERS` (comma-separated) and
    /// `SWARM_PEER_ID` as returned by `lookup`. Malformed values are logged
    /// and ignored.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(raw) = lookup("SWARM_BIND") {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                match trimmed.parse::<SocketAddr>() {
                    Ok(addr) => self.bind = addr,
                    Err(err) => tracing::warn!("invalid SWARM_BIND, ignoring: {err}"),
                }
            }
        }

        if let Some(raw) = lookup("SWARM_PEERS") {
            let parsed: std::result::Result<Vec<SocketAddr>, _> = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::parse)
                .collect();
            match parsed {
                Ok(seeds) if !seeds.is_empty() => self.discovery = Discovery::Peers { seeds },
                Ok(_) => {}
                Err(err) => tracing::warn!("invalid SWARM_PEERS, ignoring: {err}"),
            }
        }

        if let Some(raw) = lookup("SWARM_PEER_ID") {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                self.peer_id = Some(trimmed.to_string());
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let t = &self.timings;
        if self.workers == 0 {
            return Err(SwarmError::Config("workers must be at least 1".to_string()));
        }
        if self.poll_interval == 0 {
            return Err(SwarmError::Config(
                "poll_interval must be at least 1".to_string(),
            ));
        }
        if t.gossip_interval_ms == 0 || t.sweep_interval_ms == 0 || t.target_poll_ms == 0 {
            return Err(SwarmError::Config(
                "gossip, sweep and target poll intervals must be positive".to_string(),
            ));
        }
        if t.reclaim_ttl_ms <= t.gossip_interval_ms {
            return Err(SwarmError::Config(format!(
                "reclaim_ttl_ms ({}) must exceed gossip_interval_ms ({}) or live claims get reclaimed",
                t.reclaim_ttl_ms, t.gossip_interval_ms
            )));
        }
        if t.liveness_timeout_ms <= t.gossip_interval_ms {
            return Err(SwarmError::Config(format!(
                "liveness_timeout_ms ({}) must exceed gossip_interval_ms ({})",
                t.liveness_timeout_ms, t.gossip_interval_ms
            )));
        }
        if let Discovery::Multicast { group, port } = &self.discovery {
            if !group.is_multicast() {
                return Err(SwarmError::Config(format!("{} is not a multicast group", group)));
            }
            if *port != self.bind.port() {
                return Err(SwarmError::Config(format!(
                    "multicast port {} must match the bind port {}",
                    port,
                    self.bind.port()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = NodeConfig::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.poll_interval, 4096);
        assert_eq!(config.timings.reclaim_ttl(), Duration::from_secs(30));
        assert!(config.workers >= 1);
    }

    #[test]
    fn test_load_partial_toml_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
peer_id = "node-a"
bind = "127.0.0.1:6000"
workers = 2

[discovery]
mode = "peers"
seeds = ["127.0.0.1:6001", "127.0.0.1:6002"]

[timings]
reclaim_ttl_ms = 9000
"#
        )
        .unwrap();

        let config = NodeConfig::from_file(file.path()).unwrap();

        assert_eq!(config.peer_id.as_deref(), Some("node-a"));
        assert_eq!(config.workers, 2);
        assert_eq!(config.timings.reclaim_ttl_ms, 9000);
        assert_eq!(config.timings.gossip_interval_ms, 1_000);
        match &config.discovery {
            Discovery::Peers { seeds } => assert_eq!(seeds.len(), 2),
            other => panic!("unexpected discovery {:?}", other),
        }
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("swarm.toml");
        let mut config = NodeConfig::default();
        config.http = Some("127.0.0.1:8080".parse().unwrap());
        config.discovery = Discovery::Broadcast {
            addr: "192.168.1.255:50001".parse().unwrap(),
        };

        fs::write(&path, toml::to_string_pretty(&config).unwrap()).unwrap();

        assert_eq!(NodeConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "workers = \"many\"").unwrap();

        let err = NodeConfig::from_file(file.path()).unwrap_err();

        assert!(matches!(err, SwarmError::Config(_)));
        assert!(NodeConfig::from_file(Path::new("/nonexistent/swarm.toml")).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = NodeConfig::default();

        config.apply_overrides_from(env(&[
            ("SWARM_BIND", "127.0.0.1:7000"),
            ("SWARM_PEERS", "127.0.0.1:7001, 127.0.0.1:7002,"),
            ("SWARM_PEER_ID", " peer-7 "),
        ]));

        assert_eq!(config.bind, "127.0.0.1:7000".parse().unwrap());
        assert_eq!(
            config.discovery,
            Discovery::Peers {
                seeds: vec![
                    "127.0.0.1:7001".parse().unwrap(),
                    "127.0.0.1:7002".parse().unwrap()
                ]
            }
        );
        assert_eq!(config.peer_id.as_deref(), Some("peer-7"));
    }

    #[test]
    fn test_invalid_env_values_are_ignored() {
        let mut config = NodeConfig::default();

        config.apply_overrides_from(env(&[
            ("SWARM_BIND", "not-an-address"),
            ("SWARM_PEERS", "127.0.0.1:1,nope"),
            ("SWARM_PEER_ID", "   "),
        ]));

        assert_eq!(config, NodeConfig::default());
    }

    #[test]
    fn test_ttl_must_exceed_gossip_interval() {
        let mut config = NodeConfig::default();
        config.timings.reclaim_ttl_ms = config.timings.gossip_interval_ms;

        assert!(matches!(config.validate(), Err(SwarmError::Config(_))));
    }

    #[test]
    fn test_multicast_port_must_match_bind() {
        let mut config = NodeConfig::default();
        config.bind = "0.0.0.0:6000".parse().unwrap();

        assert!(config.validate().is_err());

        config.discovery = Discovery::Peers { seeds: vec![] };
        assert!(config.validate().is_ok());
    }
}
