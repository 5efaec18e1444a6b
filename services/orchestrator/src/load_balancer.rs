//! Placement policies.
//!
//! The load balancer picks one eligible node for a task. A node is eligible
//! when it passes [`SystemNode::can_accept_task`] and its capability set is a
//! superset of the task's required set. No eligible node is a normal outcome:
//! the caller queues the task.
//!
//! Every strategy is a pure function of `(task, nodes)` except round robin,
//! which keeps one rotation cursor per task type. Ties go to the first
//! maximum in iteration order.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::model::{CapabilitySet, SystemNode, TaskRequest};

/// Penalty per capability a node offers beyond what the task needs.
pub const OVERPROVISION_PENALTY: f64 = 0.1;

/// Utilization weight in the performance-weighted score.
pub const PERFORMANCE_UTILIZATION_WEIGHT: f64 = 0.5;

/// Errors from strategy parsing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StrategyError {
    #[error("unknown placement strategy: {0}")]
    Unknown(String),
}

/// Named placement strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    RoundRobin,
    LeastLoaded,
    CapabilityMatch,
    PerformanceWeighted,
    #[default]
    Intelligent,
}

impl Strategy {
    pub const ALL: [Strategy; 5] = [
        Strategy::RoundRobin,
        Strategy::LeastLoaded,
        Strategy::CapabilityMatch,
        Strategy::PerformanceWeighted,
        Strategy::Intelligent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoundRobin => "round_robin",
            Self::LeastLoaded => "least_loaded",
            Self::CapabilityMatch => "capability_match",
            Self::PerformanceWeighted => "performance_weighted",
            Self::Intelligent => "intelligent",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = StrategyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == s.trim())
            .ok_or_else(|| StrategyError::Unknown(s.to_string()))
    }
}

/// Blend weights for [`Strategy::Intelligent`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntelligentWeights {
    pub capability: f64,
    pub spare_capacity: f64,
    pub health: f64,
    pub spare_resources: f64,
}

impl Default for IntelligentWeights {
    fn default() -> Self {
        Self {
            capability: 0.4,
            spare_capacity: 0.3,
            health: 0.2,
            spare_resources: 0.1,
        }
    }
}

/// Picks a node for a task.
#[derive(Debug, Default)]
pub struct LoadBalancer {
    weights: IntelligentWeights,
    /// Round-robin cursor per task type.
    rotation: HashMap<String, usize>,
}

impl LoadBalancer {
    pub fn new(weights: IntelligentWeights) -> Self {
        Self {
            weights,
            rotation: HashMap::new(),
        }
    }

    pub fn weights(&self) -> &IntelligentWeights {
        &self.weights
    }

    /// Forget all round-robin positions.
    pub fn reset_rotation(&mut self) {
        self.rotation.clear();
    }

    /// Select one eligible node for `task`, or `None` if nothing fits.
    pub fn select_node<'a, I>(
        &mut self,
        task: &TaskRequest,
        nodes: I,
        strategy: Strategy,
    ) -> Option<&'a SystemNode>
    where
        I: IntoIterator<Item = &'a SystemNode>,
    {
        let candidates: Vec<&SystemNode> = nodes
            .into_iter()
            .filter(|node| node.can_accept_task() && node.supports(&task.required_capabilities))
            .collect();

        if candidates.is_empty() {
            debug!(
                task_id = %task.id,
                task_type = %task.task_type,
                required = %task.required_capabilities,
                "No eligible node for task"
            );
            return None;
        }

        let selected = match strategy {
            Strategy::RoundRobin => self.round_robin(&task.task_type, &candidates),
            Strategy::LeastLoaded => first_min_by(&candidates, SystemNode::load_factor),
            Strategy::CapabilityMatch => first_max_by(&candidates, |node| {
                capability_score(&task.required_capabilities, &node.capabilities)
            }),
            Strategy::PerformanceWeighted => first_max_by(&candidates, performance_score),
            Strategy::Intelligent => first_max_by(&candidates, |node| {
                intelligent_score(&self.weights, task, node)
            }),
        };

        if let Some(node) = selected {
            debug!(
                task_id = %task.id,
                node_id = %node.id,
                strategy = %strategy,
                candidates = candidates.len(),
                "Selected node"
            );
        }

        selected
    }

    fn round_robin<'a>(
        &mut self,
        task_type: &str,
        candidates: &[&'a SystemNode],
    ) -> Option<&'a SystemNode> {
        let cursor = self.rotation.entry(task_type.to_string()).or_insert(0);
        let index = *cursor % candidates.len();
        *cursor = (index + 1) % candidates.len();
        candidates.get(index).copied()
    }
}

/// Fraction of required tags the node covers, minus a penalty for extra tags.
///
/// An empty requirement scores 1.0 against every node.
pub fn capability_score(required: &CapabilitySet, available: &CapabilitySet) -> f64 {
    if required.is_empty() {
        return 1.0;
    }
    let matched = available.intersection_len(required) as f64 / required.len() as f64;
    let extra = available.difference_len(required) as f64;
    matched - OVERPROVISION_PENALTY * extra
}

pub fn performance_score(node: &SystemNode) -> f64 {
    node.health_score
        - node.load_factor()
        - PERFORMANCE_UTILIZATION_WEIGHT * node.metrics.overall_utilization()
}

pub fn intelligent_score(
    weights: &IntelligentWeights,
    task: &TaskRequest,
    node: &SystemNode,
) -> f64 {
    weights.capability * capability_score(&task.required_capabilities, &node.capabilities)
        + weights.spare_capacity * (1.0 - node.load_factor())
        + weights.health * node.health_score
        + weights.spare_resources * (1.0 - node.metrics.overall_utilization())
}

fn first_max_by<'a, F>(candidates: &[&'a SystemNode], score: F) -> Option<&'a SystemNode>
where
    F: Fn(&SystemNode) -> f64,
{
    let mut best: Option<(&SystemNode, f64)> = None;
    for &node in candidates {
        let value = score(node);
        match best {
            Some((_, best_value)) if value <= best_value => {}
            _ => best = Some((node, value)),
        }
    }
    best.map(|(node, _)| node)
}

fn first_min_by<'a, F>(candidates: &[&'a SystemNode], key: F) -> Option<&'a SystemNode>
where
    F: Fn(&SystemNode) -> f64,
{
    first_max_by(candidates, |node| -key(node))
}
