//! Configuration for the orchestrator service.
//!
//! Read from `ECO_*` environment variables. Unparseable numbers fall back to
//! their defaults; an unknown strategy name or a malformed seed node is an
//! error.

use std::time::Duration;

use anyhow::Result;
use eco_id::{IdError, NodeId};
use thiserror::Error;

use crate::load_balancer::{Strategy, StrategyError};
use crate::orchestrator::OrchestratorConfig;
use crate::resources::ResourceConfig;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Strategy(#[from] StrategyError),

    #[error("invalid seed node '{entry}': {reason}")]
    InvalidSeedNode { entry: String, reason: String },

    #[error("invalid seed node id '{entry}': {source}")]
    InvalidSeedNodeId {
        entry: String,
        #[source]
        source: IdError,
    },
}

/// A node registered at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSeed {
    pub node_id: NodeId,
    pub node_type: String,
    pub capabilities: Vec<String>,
    pub max_tasks: u32,
}

impl NodeSeed {
    /// Parse `id=type:cap1|cap2:max`.
    pub fn parse(entry: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidSeedNode {
            entry: entry.to_string(),
            reason: reason.to_string(),
        };

        let (id, rest) = entry.split_once('=').ok_or_else(|| invalid("missing '='"))?;
        let node_id = NodeId::parse(id.trim()).map_err(|source| ConfigError::InvalidSeedNodeId {
            entry: entry.to_string(),
            source,
        })?;

        let mut parts = rest.split(':');
        let (Some(node_type), Some(caps), Some(max), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid("expected type:capabilities:max_tasks"));
        };

        let max_tasks = max
            .trim()
            .parse()
            .map_err(|_| invalid("max_tasks is not a non-negative integer"))?;

        Ok(Self {
            node_id,
            node_type: node_type.trim().to_string(),
            capabilities: caps
                .split('|')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(String::from)
                .collect(),
            max_tasks,
        })
    }
}

/// Orchestrator service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Log filter used when `RUST_LOG` is unset.
    pub log_level: String,

    /// Period of the cycle worker.
    pub tick_interval: Duration,

    /// Orchestrator actor mailbox capacity.
    pub mailbox_size: usize,

    pub orchestrator: OrchestratorConfig,

    /// Nodes to register at startup.
    pub seed_nodes: Vec<NodeSeed>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let number = |key: &str, default: u64| -> u64 {
            lookup(key)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default)
        };

        let defaults = OrchestratorConfig::default();

        let default_strategy = match lookup("ECO_STRATEGY") {
            Some(name) => name.parse::<Strategy>().map_err(ConfigError::from)?,
            None => defaults.default_strategy,
        };

        let rebalance_accelerators = lookup("ECO_REBALANCE_ACCELERATORS")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let seed_nodes = lookup("ECO_NODES")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|entry| !entry.is_empty())
                    .map(NodeSeed::parse)
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?
            .unwrap_or_default();

        // A zero batch would never pop anything off the queue.
        let drain_batch_size =
            number("ECO_DRAIN_BATCH", defaults.drain_batch_size as u64).max(1) as usize;

        let orchestrator = OrchestratorConfig {
            default_strategy,
            drain_batch_size,
            health_check_interval: Duration::from_secs(number(
                "ECO_HEALTH_INTERVAL_SECS",
                defaults.health_check_interval.as_secs(),
            )),
            resource_check_interval: Duration::from_secs(number(
                "ECO_RESOURCE_INTERVAL_SECS",
                defaults.resource_check_interval.as_secs(),
            )),
            resources: ResourceConfig {
                rebalance_accelerators,
                ..ResourceConfig::default()
            },
            ..defaults
        };

        Ok(Self {
            log_level: lookup("ECO_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            tick_interval: Duration::from_millis(number("ECO_TICK_INTERVAL_MS", 1000).max(1)),
            mailbox_size: number("ECO_MAILBOX_SIZE", 256).max(1) as usize,
            orchestrator,
            seed_nodes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Instant;

    use crate::model::{CapabilitySet, TaskRequest, TaskStatus};
    use crate::orchestrator::Orchestrator;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.tick_interval, Duration::from_secs(1));
        assert_eq!(config.mailbox_size, 256);
        assert_eq!(config.orchestrator.default_strategy, Strategy::Intelligent);
        assert_eq!(config.orchestrator.drain_batch_size, 10);
        assert_eq!(config.orchestrator.health_check_interval, Duration::from_secs(300));
        assert_eq!(config.orchestrator.resource_check_interval, Duration::from_secs(60));
        assert!(!config.orchestrator.resources.rebalance_accelerators);
        assert!(config.seed_nodes.is_empty());
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("ECO_STRATEGY", "least_loaded"),
            ("ECO_DRAIN_BATCH", "25"),
            ("ECO_HEALTH_INTERVAL_SECS", "10"),
            ("ECO_REBALANCE_ACCELERATORS", "true"),
            ("ECO_TICK_INTERVAL_MS", "not-a-number"),
        ]))
        .unwrap();
        assert_eq!(config.orchestrator.default_strategy, Strategy::LeastLoaded);
        assert_eq!(config.orchestrator.drain_batch_size, 25);
        assert_eq!(config.orchestrator.health_check_interval, Duration::from_secs(10));
        assert!(config.orchestrator.resources.rebalance_accelerators);
        assert_eq!(config.tick_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_zero_drain_batch_still_drains() {
        let config = Config::from_lookup(lookup(&[("ECO_DRAIN_BATCH", "0")])).unwrap();
        assert_eq!(config.orchestrator.drain_batch_size, 1);

        let mut orch = Orchestrator::new(config.orchestrator);
        let task_id = orch.submit(TaskRequest::new("t", CapabilitySet::new(), 0));
        orch.add_node(NodeId::parse("n1").unwrap(), "worker", CapabilitySet::new(), 1);

        let report = orch.tick(Instant::now());
        assert_eq!(report.drain.assigned, 1);
        assert_eq!(orch.task(&task_id).unwrap().status, TaskStatus::Assigned);
    }

    #[test]
    fn test_unknown_strategy_is_error() {
        assert!(Config::from_lookup(lookup(&[("ECO_STRATEGY", "fastest")])).is_err());
    }

    #[test]
    fn test_seed_nodes() {
        let config = Config::from_lookup(lookup(&[(
            "ECO_NODES",
            "gpu-1=inference:gpu|llm:4, cpu-1=batch::2",
        )]))
        .unwrap();
        assert_eq!(config.seed_nodes.len(), 2);
        assert_eq!(config.seed_nodes[0].node_id.as_str(), "gpu-1");
        assert_eq!(config.seed_nodes[0].capabilities, vec!["gpu", "llm"]);
        assert_eq!(config.seed_nodes[0].max_tasks, 4);
        assert!(config.seed_nodes[1].capabilities.is_empty());
    }

    #[test]
    fn test_seed_node_errors() {
        assert!(matches!(
            NodeSeed::parse("no-equals"),
            Err(ConfigError::InvalidSeedNode { .. })
        ));
        assert!(matches!(
            NodeSeed::parse("bad id=t:x:1"),
            Err(ConfigError::InvalidSeedNodeId { .. })
        ));
        assert!(matches!(
            NodeSeed::parse("n=t:x"),
            Err(ConfigError::InvalidSeedNode { .. })
        ));
        assert!(matches!(
            NodeSeed::parse("n=t:x:-1"),
            Err(ConfigError::InvalidSeedNode { .. })
        ));
    }
}
