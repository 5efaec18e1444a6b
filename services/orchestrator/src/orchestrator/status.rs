//! Structured reports returned by orchestrator operations.

use std::collections::BTreeMap;

use eco_id::NodeId;
use serde::Serialize;

use crate::model::CapabilitySet;
use crate::resources::{Observation, OptimizationAction, SystemSnapshot};

/// Point-in-time view of the whole orchestrator.
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorStatus {
    pub nodes: BTreeMap<NodeId, NodeStatus>,
    pub task_statistics: TaskStatistics,
    pub system_health: SystemHealth,
    /// Latest resource snapshot, if a resource cycle has observed any nodes.
    pub resources: Option<SystemSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeStatus {
    pub node_type: String,
    pub active: bool,
    pub health: f64,
    pub load_factor: f64,
    pub current_tasks: u32,
    pub max_tasks: u32,
    pub capabilities: CapabilitySet,
    pub utilization: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TaskStatistics {
    pub active: usize,
    pub queued: usize,
    pub completed: usize,
}

impl TaskStatistics {
    pub fn total(&self) -> usize {
        self.active + self.queued + self.completed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SystemHealth {
    pub average_node_health: f64,
    pub active_node_ratio: f64,
}

/// Outcome of one queue drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// Tasks taken off the queue, including the one that failed to place.
    pub processed: usize,
    pub assigned: usize,
    pub remaining_in_queue: usize,
}

/// Outcome of one health cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub evaluated: usize,
    pub deactivated: Vec<NodeId>,
    pub reactivated: Vec<NodeId>,
}

/// Outcome of one resource cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceReport {
    pub observation: Observation,
    pub actions: Vec<OptimizationAction>,
}

/// What a timer tick did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TickReport {
    pub drain: DrainReport,
    pub health: Option<HealthReport>,
    pub resources: Option<ResourceReport>,
}
