//! System-wide resource monitoring and mitigation.
//!
//! The resource manager averages per-node metrics into one snapshot,
//! classifies it into a [`SystemState`], and applies tiered
//! [`OptimizationAction`]s when the system runs hot:
//!
//! | state        | actions                                              |
//! |--------------|------------------------------------------------------|
//! | `optimal`    | none                                                 |
//! | `balanced`   | none                                                 |
//! | `stressed`   | memory cleanup                                       |
//! | `overloaded` | memory cleanup, compute optimization                 |
//! | `critical`   | memory cleanup, compute optimization, redistribution |
//!
//! Accelerator reallocation joins the critical tier only when
//! [`ResourceConfig::rebalance_accelerators`] is set.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;

use chrono::{DateTime, Utc};
use eco_id::{NodeId, TaskId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::model::{ResourceMetrics, SystemNode, TaskRequest};

/// Number of aggregate snapshots retained.
pub const HISTORY_CAPACITY: usize = 1000;

const OPTIMAL_BELOW: f64 = 0.30;
const BALANCED_BELOW: f64 = 0.50;
const STRESSED_BELOW: f64 = 0.70;
const OVERLOADED_BELOW: f64 = 0.90;

const HOT_RATIO: f64 = 0.8;
const MEMORY_RELIEF: f64 = 0.9;
const COMPUTE_RELIEF: f64 = 0.95;
const ACCELERATOR_RELIEF: f64 = 0.8;
const ACCELERATOR_RECEIVER_BELOW: f64 = 0.3;
const REDISTRIBUTE_DONOR_ABOVE: f64 = 0.9;
const REDISTRIBUTE_RECEIVER_BELOW: f64 = 0.3;
/// A donor gives away at most `current / REDISTRIBUTE_SHARE` tasks.
const REDISTRIBUTE_SHARE: u32 = 3;

/// Ordered saturation levels, coolest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemState {
    Optimal,
    Balanced,
    Stressed,
    Overloaded,
    Critical,
}

impl SystemState {
    /// Classify an averaged overall utilization.
    pub fn classify(overall_utilization: f64) -> Self {
        if overall_utilization < OPTIMAL_BELOW {
            Self::Optimal
        } else if overall_utilization < BALANCED_BELOW {
            Self::Balanced
        } else if overall_utilization < STRESSED_BELOW {
            Self::Stressed
        } else if overall_utilization < OVERLOADED_BELOW {
            Self::Overloaded
        } else {
            Self::Critical
        }
    }

    /// True from `stressed` upward.
    pub fn needs_optimization(&self) -> bool {
        *self >= Self::Stressed
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Optimal => "optimal",
            Self::Balanced => "balanced",
            Self::Stressed => "stressed",
            Self::Overloaded => "overloaded",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for SystemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate view of the node pool at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemSnapshot {
    pub state: SystemState,
    pub metrics: ResourceMetrics,
    pub overall_utilization: f64,
    pub node_count: usize,
    pub overloaded_count: usize,
    pub observed_at: DateTime<Utc>,
}

/// Result of [`ResourceManager::monitor`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Observation {
    NoNodes,
    Observed(SystemSnapshot),
}

impl Observation {
    pub fn snapshot(&self) -> Option<&SystemSnapshot> {
        match self {
            Self::NoNodes => None,
            Self::Observed(snapshot) => Some(snapshot),
        }
    }
}

/// One task re-homed by redistribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskMove {
    pub task_id: TaskId,
    pub from: NodeId,
    pub to: NodeId,
}

/// A mitigation that ran, with the nodes or tasks it touched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum OptimizationAction {
    MemoryCleanup { nodes: Vec<NodeId> },
    ComputeOptimization { nodes: Vec<NodeId> },
    AcceleratorReallocation {
        donors: Vec<NodeId>,
        receivers: Vec<NodeId>,
    },
    TaskRedistribution { moves: Vec<TaskMove> },
}

impl OptimizationAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::MemoryCleanup { .. } => "memory_cleanup",
            Self::ComputeOptimization { .. } => "compute_optimization",
            Self::AcceleratorReallocation { .. } => "accelerator_reallocation",
            Self::TaskRedistribution { .. } => "task_redistribution",
        }
    }

    /// True if the action changed anything.
    pub fn had_effect(&self) -> bool {
        match self {
            Self::MemoryCleanup { nodes } | Self::ComputeOptimization { nodes } => {
                !nodes.is_empty()
            }
            Self::AcceleratorReallocation { donors, .. } => !donors.is_empty(),
            Self::TaskRedistribution { moves } => !moves.is_empty(),
        }
    }
}

/// Resource manager configuration.
#[derive(Debug, Clone)]
pub struct ResourceConfig {
    /// Run accelerator reallocation as part of the critical tier.
    pub rebalance_accelerators: bool,

    /// Snapshots kept in history.
    pub history_capacity: usize,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            rebalance_accelerators: false,
            history_capacity: HISTORY_CAPACITY,
        }
    }
}

/// Aggregates node metrics and applies mitigations.
#[derive(Debug, Default)]
pub struct ResourceManager {
    config: ResourceConfig,
    history: VecDeque<SystemSnapshot>,
}

impl ResourceManager {
    pub fn new(config: ResourceConfig) -> Self {
        Self {
            history: VecDeque::with_capacity(config.history_capacity.min(HISTORY_CAPACITY)),
            config,
        }
    }

    /// Average the pool's metrics and classify the result.
    ///
    /// Observed snapshots are appended to the history; the oldest entry is
    /// evicted once the history is full.
    pub fn monitor<'a, I>(&mut self, nodes: I) -> Observation
    where
        I: IntoIterator<Item = &'a SystemNode>,
    {
        let mut sum = ResourceMetrics::idle();
        let mut node_count = 0usize;
        let mut overloaded_count = 0usize;

        for node in nodes {
            let m = &node.metrics;
            sum.compute += m.compute;
            sum.memory += m.memory;
            sum.accelerator += m.accelerator;
            sum.network += m.network;
            sum.storage += m.storage;
            sum.model_load += m.model_load;
            node_count += 1;
            if m.is_overloaded() {
                overloaded_count += 1;
            }
        }

        if node_count == 0 {
            debug!("No nodes to monitor");
            return Observation::NoNodes;
        }

        let n = node_count as f64;
        let metrics = ResourceMetrics::new(
            sum.compute / n,
            sum.memory / n,
            sum.accelerator / n,
            sum.network / n,
            sum.storage / n,
            sum.model_load / n,
        );
        let overall_utilization = metrics.overall_utilization();
        let snapshot = SystemSnapshot {
            state: SystemState::classify(overall_utilization),
            metrics,
            overall_utilization,
            node_count,
            overloaded_count,
            observed_at: Utc::now(),
        };

        self.record(snapshot.clone());
        Observation::Observed(snapshot)
    }

    /// Apply the mitigation tier for `state`, in order.
    pub fn optimize(
        &mut self,
        nodes: &mut BTreeMap<NodeId, SystemNode>,
        active_tasks: &mut HashMap<TaskId, TaskRequest>,
        state: SystemState,
    ) -> Vec<OptimizationAction> {
        let mut actions = Vec::new();
        if !state.needs_optimization() {
            return actions;
        }

        actions.push(self.cleanup_memory(nodes));

        if state >= SystemState::Overloaded {
            actions.push(self.optimize_compute(nodes));
        }

        if state == SystemState::Critical {
            if self.config.rebalance_accelerators {
                actions.push(self.reallocate_accelerators(nodes));
            }
            actions.push(self.redistribute_tasks(nodes, active_tasks));
        }

        for action in &actions {
            info!(
                state = %state,
                action = action.name(),
                had_effect = action.had_effect(),
                "Applied optimization action"
            );
        }

        actions
    }

    /// Relieve 10% of memory on every node above the hot threshold.
    pub fn cleanup_memory(&self, nodes: &mut BTreeMap<NodeId, SystemNode>) -> OptimizationAction {
        let mut touched = Vec::new();
        for node in nodes.values_mut() {
            if node.metrics.memory > HOT_RATIO {
                node.metrics.memory *= MEMORY_RELIEF;
                touched.push(node.id.clone());
            }
        }
        OptimizationAction::MemoryCleanup { nodes: touched }
    }

    /// Relieve 5% of compute on every node above the hot threshold.
    pub fn optimize_compute(&self, nodes: &mut BTreeMap<NodeId, SystemNode>) -> OptimizationAction {
        let mut touched = Vec::new();
        for node in nodes.values_mut() {
            if node.metrics.compute > HOT_RATIO {
                node.metrics.compute *= COMPUTE_RELIEF;
                touched.push(node.id.clone());
            }
        }
        OptimizationAction::ComputeOptimization { nodes: touched }
    }

    /// Scale down hot accelerators, but only when a cool node exists to
    /// take the work.
    pub fn reallocate_accelerators(
        &self,
        nodes: &mut BTreeMap<NodeId, SystemNode>,
    ) -> OptimizationAction {
        let receivers: Vec<NodeId> = nodes
            .values()
            .filter(|n| n.metrics.accelerator < ACCELERATOR_RECEIVER_BELOW)
            .map(|n| n.id.clone())
            .collect();
        let has_donor = nodes.values().any(|n| n.metrics.accelerator > HOT_RATIO);

        if receivers.is_empty() || !has_donor {
            return OptimizationAction::AcceleratorReallocation {
                donors: Vec::new(),
                receivers: Vec::new(),
            };
        }

        let mut donors = Vec::new();
        for node in nodes.values_mut() {
            if node.metrics.accelerator > HOT_RATIO {
                node.metrics.accelerator *= ACCELERATOR_RELIEF;
                donors.push(node.id.clone());
            }
        }
        OptimizationAction::AcceleratorReallocation { donors, receivers }
    }

    /// Move tasks off saturated nodes onto the least loaded node.
    ///
    /// Task records move together with the counters. A task only moves if the
    /// receiver covers its capabilities, and the receiver never exceeds its
    /// capacity.
    pub fn redistribute_tasks(
        &self,
        nodes: &mut BTreeMap<NodeId, SystemNode>,
        active_tasks: &mut HashMap<TaskId, TaskRequest>,
    ) -> OptimizationAction {
        let donors: Vec<NodeId> = nodes
            .values()
            .filter(|n| n.load_factor() > REDISTRIBUTE_DONOR_ABOVE)
            .map(|n| n.id.clone())
            .collect();

        let mut moves = Vec::new();
        for donor_id in donors {
            let Some(receiver_id) = least_loaded_receiver(nodes, &donor_id) else {
                continue;
            };
            let (Some(donor), Some(receiver)) = (nodes.get(&donor_id), nodes.get(&receiver_id))
            else {
                continue;
            };

            let quota = (donor.current_task_count / REDISTRIBUTE_SHARE).min(receiver.free_slots());
            if quota == 0 {
                continue;
            }

            // Newest assignments move first.
            let mut movable: Vec<&TaskRequest> = active_tasks
                .values()
                .filter(|t| t.assigned_node.as_ref() == Some(&donor_id))
                .filter(|t| receiver.supports(&t.required_capabilities))
                .collect();
            movable.sort_by(|a, b| b.sequence.cmp(&a.sequence));
            let chosen: Vec<TaskId> = movable.iter().take(quota as usize).map(|t| t.id).collect();

            for task_id in chosen {
                if let Some(task) = active_tasks.get_mut(&task_id) {
                    task.assign_to(receiver_id.clone());
                }
                if let Some(donor) = nodes.get_mut(&donor_id) {
                    donor.release_task();
                }
                if let Some(receiver) = nodes.get_mut(&receiver_id) {
                    receiver.take_task();
                }
                moves.push(TaskMove {
                    task_id,
                    from: donor_id.clone(),
                    to: receiver_id.clone(),
                });
            }
        }

        OptimizationAction::TaskRedistribution { moves }
    }

    pub fn history(&self) -> impl Iterator<Item = &SystemSnapshot> {
        self.history.iter()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn latest(&self) -> Option<&SystemSnapshot> {
        self.history.back()
    }

    fn record(&mut self, snapshot: SystemSnapshot) {
        if self.config.history_capacity == 0 {
            return;
        }
        while self.history.len() >= self.config.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(snapshot);
    }
}

fn least_loaded_receiver(nodes: &BTreeMap<NodeId, SystemNode>, donor: &NodeId) -> Option<NodeId> {
    let mut best: Option<&SystemNode> = None;
    for node in nodes.values() {
        if &node.id == donor
            || !node.is_active
            || node.free_slots() == 0
            || node.load_factor() >= REDISTRIBUTE_RECEIVER_BELOW
        {
            continue;
        }
        if best.is_none_or(|b| node.load_factor() < b.load_factor()) {
            best = Some(node);
        }
    }
    best.map(|n| n.id.clone())
}
