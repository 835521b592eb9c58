//! Cluster and proposer configuration
//!
//! Configuration may be built in code, starting from `Config::default()`, or read from a
//! TOML document:
//!
//! ```toml
//! nodes = 5
//! proposers = [1, 4]
//! max_attempts = 20
//! phase_timeout_ms = 250
//!
//! [backoff]
//! initial_ms = 5
//! max_ms = 500
//! multiplier = 2.0
//!
//! [values]
//! 1 = 10
//! 4 = 40
//! ```

use std::collections::BTreeMap;
use std::convert::TryFrom;
use std::fs;
use std::path::Path;
use std::time::Duration;

use rand::Rng;

use crate::error::{Error, Result};
use crate::paxos::{NodeId, Value};

/// Exponential backoff with jitter applied between retried rounds
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64
}

impl Default for BackoffConfig {
    fn default() -> Self {
        BackoffConfig {
            initial: Duration::from_millis(10),
            max: Duration::from_secs(1),
            multiplier: 2.0
        }
    }
}

impl BackoffConfig {
    /// Delay before the retry following `failures` consecutive failed rounds.
    ///
    /// The exponential base is capped at `max` and then scaled by a random factor between
    /// 0.5 and 1.5 so competing proposers drift apart.
    pub fn duration<R: Rng>(&self, failures: u32, rng: &mut R) -> Duration {
        let exponent = failures.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base = self.initial.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = base.min(self.max.as_secs_f64());
        Duration::from_secs_f64(capped * rng.gen_range(0.5..1.5))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub num_nodes: usize,
    /// Nodes that run a proposer cycle. Every node is an acceptor.
    pub proposers: Vec<NodeId>,
    /// Explicit proposal values. Nodes without one propose one more than their last decided value.
    pub values: BTreeMap<NodeId, Value>,
    pub max_attempts: u32,
    /// Time to wait for responses in each phase. Missing responses count as rejections.
    pub phase_timeout: Duration,
    pub backoff: BackoffConfig
}

impl Default for Config {
    fn default() -> Self {
        Config::with_nodes(3)
    }
}

impl Config {
    /// Default settings for a cluster of `num_nodes` in which every node proposes
    pub fn with_nodes(num_nodes: usize) -> Config {
        Config {
            num_nodes,
            proposers: (1..=num_nodes as u32).map(NodeId).collect(),
            values: BTreeMap::new(),
            max_attempts: 16,
            phase_timeout: Duration::from_millis(500),
            backoff: BackoffConfig::default()
        }
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (1..=self.num_nodes as u32).map(NodeId)
    }

    pub fn load(path: &Path) -> Result<Config> {
        let content = fs::read_to_string(path)?;
        Config::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Config> {
        let doc = content.parse::<toml::Value>().map_err(|e| Error::Config(e.to_string()))?;

        let mut config = match doc.get("nodes") {
            Some(v) => Config::with_nodes(small_integer(v, "nodes")? as usize),
            None => Config::default()
        };

        if let Some(v) = doc.get("proposers") {
            let ids = v.as_array().ok_or_else(|| type_error("proposers", "an array"))?;
            config.proposers = ids.iter()
                .map(|id| small_integer(id, "proposers").map(NodeId))
                .collect::<Result<Vec<_>>>()?;
        }

        if let Some(v) = doc.get("max_attempts") {
            config.max_attempts = small_integer(v, "max_attempts")?;
        }

        if let Some(v) = doc.get("phase_timeout_ms") {
            config.phase_timeout = Duration::from_millis(positive_integer(v, "phase_timeout_ms")?);
        }

        if let Some(backoff) = doc.get("backoff") {
            if let Some(v) = backoff.get("initial_ms") {
                config.backoff.initial = Duration::from_millis(positive_integer(v, "backoff.initial_ms")?);
            }
            if let Some(v) = backoff.get("max_ms") {
                config.backoff.max = Duration::from_millis(positive_integer(v, "backoff.max_ms")?);
            }
            if let Some(v) = backoff.get("multiplier") {
                config.backoff.multiplier = v.as_float()
                    .or_else(|| v.as_integer().map(|i| i as f64))
                    .ok_or_else(|| type_error("backoff.multiplier", "a number"))?;
            }
        }

        if let Some(v) = doc.get("values") {
            let table = v.as_table().ok_or_else(|| type_error("values", "a table"))?;
            for (key, value) in table {
                let id = key.parse::<u32>()
                    .map_err(|_| Error::Config(format!("values: '{}' is not a node id", key)))?;
                let value = value.as_integer().ok_or_else(|| type_error("values", "integers"))?;
                config.values.insert(NodeId(id), value);
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_nodes == 0 {
            return Err(Error::Config("a cluster needs at least one node".into()));
        }
        if self.num_nodes > u32::MAX as usize {
            return Err(Error::Config(format!("{} nodes is too many", self.num_nodes)));
        }
        let valid = |id: &NodeId| id.0 >= 1 && id.0 as usize <= self.num_nodes;
        if let Some(id) = self.proposers.iter().find(|id| !valid(id)) {
            return Err(Error::Config(format!("proposer {} is not a cluster member", id.0)));
        }
        if let Some(id) = self.values.keys().find(|id| !valid(id)) {
            return Err(Error::Config(format!("value given for unknown node {}", id.0)));
        }
        if self.max_attempts == 0 {
            return Err(Error::Config("max_attempts must be at least 1".into()));
        }
        if !(self.backoff.multiplier >= 1.0) {
            return Err(Error::Config("backoff multiplier must be at least 1".into()));
        }
        if self.backoff.initial > self.backoff.max {
            return Err(Error::Config("initial backoff exceeds the maximum".into()));
        }
        Ok(())
    }
}

fn type_error(key: &str, expected: &str) -> Error {
    Error::Config(format!("{} must be {}", key, expected))
}

fn positive_integer(v: &toml::Value, key: &str) -> Result<u64> {
    match v.as_integer() {
        Some(i) if i > 0 => Ok(i as u64),
        _ => Err(type_error(key, "a positive integer"))
    }
}

fn small_integer(v: &toml::Value, key: &str) -> Result<u32> {
    let i = positive_integer(v, key)?;
    u32::try_from(i).map_err(|_| Error::Config(format!("{} must not exceed {}", key, u32::MAX)))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempdir::TempDir;

    use super::*;

    #[test]
    fn defaults() {
        let c = Config::default();
        assert_eq!(c.num_nodes, 3);
        assert_eq!(c.proposers, vec![NodeId(1), NodeId(2), NodeId(3)]);
        assert!(c.values.is_empty());
        assert!(c.validate().is_ok());
    }

    #[test]
    fn parse_full_document() {
        let c = Config::from_toml_str(r#"
            nodes = 5
            proposers = [1, 4]
            max_attempts = 20
            phase_timeout_ms = 250

            [backoff]
            initial_ms = 5
            max_ms = 500
            multiplier = 3

            [values]
            1 = 10
            4 = -40
        "#).unwrap();

        assert_eq!(c.num_nodes, 5);
        assert_eq!(c.proposers, vec![NodeId(1), NodeId(4)]);
        assert_eq!(c.max_attempts, 20);
        assert_eq!(c.phase_timeout, Duration::from_millis(250));
        assert_eq!(c.backoff, BackoffConfig {
            initial: Duration::from_millis(5),
            max: Duration::from_millis(500),
            multiplier: 3.0
        });
        assert_eq!(c.values.get(&NodeId(1)), Some(&10));
        assert_eq!(c.values.get(&NodeId(4)), Some(&-40));
    }

    #[test]
    fn nodes_alone_makes_everyone_a_proposer() {
        let c = Config::from_toml_str("nodes = 4").unwrap();
        assert_eq!(c.proposers.len(), 4);
    }

    #[test]
    fn rejects_bad_documents() {
        assert!(Config::from_toml_str("nodes = 0").is_err());
        assert!(Config::from_toml_str("nodes = \"three\"").is_err());
        assert!(Config::from_toml_str("nodes = 3\nproposers = [4]").is_err());
        assert!(Config::from_toml_str("max_attempts = 0").is_err());
        assert!(Config::from_toml_str("max_attempts = 4294967297").is_err());
        assert!(Config::from_toml_str("nodes = 4294967297").is_err());
        assert!(Config::from_toml_str("nodes = 3\nproposers = [4294967297]").is_err());
        assert!(Config::from_toml_str("[values]\nfoo = 1").is_err());
        assert!(Config::from_toml_str("[values]\n7 = 1").is_err());
        assert!(Config::from_toml_str("[backoff]\nmultiplier = 0.5").is_err());
        assert!(Config::from_toml_str("nodes = [").is_err());
    }

    #[test]
    fn load_from_file() {
        let tdir = TempDir::new("config").unwrap();
        let path = tdir.path().join("synod.toml");
        let mut f = fs::File::create(&path).unwrap();
        writeln!(f, "nodes = 7").unwrap();
        writeln!(f, "proposers = [2]").unwrap();
        drop(f);

        let c = Config::load(&path).unwrap();
        assert_eq!(c.num_nodes, 7);
        assert_eq!(c.proposers, vec![NodeId(2)]);

        match Config::load(&tdir.path().join("missing.toml")) {
            Err(Error::Io(_)) => (),
            other => panic!("unexpected {:?}", other)
        }
    }

    #[test]
    fn backoff_grows_and_is_capped() {
        let b = BackoffConfig {
            initial: Duration::from_millis(10),
            max: Duration::from_millis(100),
            multiplier: 2.0
        };
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..100 {
            let first = b.duration(1, &mut rng);
            assert!(first >= Duration::from_millis(5) && first <= Duration::from_millis(15));

            let third = b.duration(3, &mut rng);
            assert!(third >= Duration::from_millis(20) && third <= Duration::from_millis(60));

            let late = b.duration(30, &mut rng);
            assert!(late <= Duration::from_millis(150));
        }
    }
}
