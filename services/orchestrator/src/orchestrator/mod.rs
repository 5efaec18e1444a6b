//! Orchestrator core.
//!
//! Owns the node registry and the pending, active and completed task
//! collections, and runs submission, queue draining, completion and the
//! periodic health and resource cycles. Every operation runs to completion
//! on `&mut self`; the [`crate::actors`] layer serializes callers.
//!
//! ## Task lifecycle
//!
//! ```text
//! pending ──► assigned ──► completed | failed
//!    │           ▲  │
//!    ▼           │  ▼ (node removed)
//! queued ────────┘ queued
//! ```
//!
//! Node activity (`active ↔ inactive`) changes only in the health cycle.

mod health;
mod queue;
mod status;

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use chrono::Utc;
use eco_id::{NodeId, TaskId};
use tracing::{debug, info, instrument, warn};

use crate::load_balancer::{IntelligentWeights, LoadBalancer, Strategy};
use crate::model::{CapabilitySet, ResourceMetrics, SystemNode, TaskRequest, TaskStatus};
use crate::resources::{Observation, ResourceConfig, ResourceManager, SystemState};

pub use health::HealthPolicy;
use health::Transition;
use queue::PendingQueue;
pub use status::{
    DrainReport, HealthReport, NodeStatus, OrchestratorStatus, ResourceReport, SystemHealth,
    TaskStatistics, TickReport,
};

/// Orchestrator tuning.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Strategy used by [`Orchestrator::submit`] and queue draining.
    pub default_strategy: Strategy,

    /// Maximum queued tasks examined per drain.
    pub drain_batch_size: usize,

    /// Minimum time between timer-driven health cycles.
    pub health_check_interval: Duration,

    /// Minimum time between timer-driven resource cycles.
    pub resource_check_interval: Duration,

    pub health: HealthPolicy,
    pub weights: IntelligentWeights,
    pub resources: ResourceConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            default_strategy: Strategy::Intelligent,
            drain_batch_size: 10,
            health_check_interval: Duration::from_secs(300),
            resource_check_interval: Duration::from_secs(60),
            health: HealthPolicy::default(),
            weights: IntelligentWeights::default(),
            resources: ResourceConfig::default(),
        }
    }
}

/// The orchestration state machine.
#[derive(Debug)]
pub struct Orchestrator {
    config: OrchestratorConfig,
    nodes: BTreeMap<NodeId, SystemNode>,
    pending: PendingQueue,
    active: HashMap<TaskId, TaskRequest>,
    completed: HashMap<TaskId, TaskRequest>,
    load_balancer: LoadBalancer,
    resource_manager: ResourceManager,
    next_sequence: u64,
    last_health_cycle: Option<Instant>,
    last_resource_cycle: Option<Instant>,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new(OrchestratorConfig::default())
    }
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            load_balancer: LoadBalancer::new(config.weights),
            resource_manager: ResourceManager::new(config.resources.clone()),
            config,
            nodes: BTreeMap::new(),
            pending: PendingQueue::default(),
            active: HashMap::new(),
            completed: HashMap::new(),
            next_sequence: 0,
            last_health_cycle: None,
            last_resource_cycle: None,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    // -------------------------------------------------------------------------
    // Node registry
    // -------------------------------------------------------------------------

    /// Register a node. Returns false if the id is already taken.
    pub fn add_node(
        &mut self,
        id: NodeId,
        node_type: impl Into<String>,
        capabilities: CapabilitySet,
        max_tasks: u32,
    ) -> bool {
        if self.nodes.contains_key(&id) {
            warn!(node_id = %id, "Node already registered");
            return false;
        }

        let node = SystemNode::new(id.clone(), node_type, capabilities, max_tasks);
        info!(
            node_id = %id,
            node_type = %node.node_type,
            capabilities = %node.capabilities,
            max_tasks,
            "Node registered"
        );
        self.nodes.insert(id, node);
        true
    }

    /// Remove a node, returning its active tasks to the queue first.
    pub fn remove_node(&mut self, id: &NodeId) -> bool {
        if !self.nodes.contains_key(id) {
            return false;
        }

        let orphaned: Vec<TaskId> = self
            .active
            .values()
            .filter(|task| task.assigned_node.as_ref() == Some(id))
            .map(|task| task.id)
            .collect();

        let requeued = orphaned.len();
        for task_id in orphaned {
            if let Some(mut task) = self.active.remove(&task_id) {
                task.requeue();
                self.pending.push(task);
            }
        }

        self.nodes.remove(id);
        info!(node_id = %id, requeued, "Node removed");
        true
    }

    /// Replace a node's metrics snapshot. Returns false for an unknown id.
    pub fn report_metrics(&mut self, id: &NodeId, metrics: ResourceMetrics) -> bool {
        match self.nodes.get_mut(id) {
            Some(node) => {
                node.metrics = metrics.clamped();
                true
            }
            None => false,
        }
    }

    pub fn node(&self, id: &NodeId) -> Option<&SystemNode> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &SystemNode> {
        self.nodes.values()
    }

    // -------------------------------------------------------------------------
    // Tasks
    // -------------------------------------------------------------------------

    /// Submit a task using the default strategy.
    pub fn submit(&mut self, task: TaskRequest) -> TaskId {
        let strategy = self.config.default_strategy;
        self.submit_with(task, strategy)
    }

    /// Submit a task, placing it immediately if any node fits.
    ///
    /// Never fails: a task with no eligible node is queued.
    pub fn submit_with(&mut self, mut task: TaskRequest, strategy: Strategy) -> TaskId {
        // A resubmitted clone gets a fresh identity.
        if self.task(&task.id).is_some() {
            task.id = TaskId::new();
        }
        self.next_sequence += 1;
        task.sequence = self.next_sequence;
        task.status = TaskStatus::Pending;
        task.assigned_node = None;
        let task_id = task.id;

        match self.place(&mut task, strategy) {
            Some(node_id) => {
                debug!(task_id = %task_id, node_id = %node_id, "Task assigned on submit");
                self.active.insert(task_id, task);
            }
            None => {
                task.status = TaskStatus::Queued;
                debug!(task_id = %task_id, queued = self.pending.len() + 1, "Task queued");
                self.pending.push(task);
            }
        }

        task_id
    }

    /// Try to place up to `drain_batch_size` queued tasks.
    ///
    /// Stops at the first task that cannot be placed; that task goes back to
    /// its place at the head of the queue.
    pub fn drain_queue(&mut self) -> DrainReport {
        let strategy = self.config.default_strategy;
        let mut report = DrainReport::default();

        while report.processed < self.config.drain_batch_size {
            let Some(mut task) = self.pending.pop_front() else {
                break;
            };
            report.processed += 1;

            match self.place(&mut task, strategy) {
                Some(node_id) => {
                    debug!(task_id = %task.id, node_id = %node_id, "Queued task assigned");
                    report.assigned += 1;
                    self.active.insert(task.id, task);
                }
                None => {
                    self.pending.push(task);
                    break;
                }
            }
        }

        report.remaining_in_queue = self.pending.len();
        if report.processed > 0 {
            debug!(
                processed = report.processed,
                assigned = report.assigned,
                remaining = report.remaining_in_queue,
                "Queue drained"
            );
        }
        report
    }

    /// Record the outcome of an active task. Returns false if it was not active.
    pub fn complete_task(&mut self, id: &TaskId, success: bool) -> bool {
        let Some(mut task) = self.active.remove(id) else {
            return false;
        };

        if let Some(node) = task
            .assigned_node
            .as_ref()
            .and_then(|node_id| self.nodes.get_mut(node_id))
        {
            node.release_task();
        }

        task.finish(success);
        debug!(task_id = %id, status = %task.status, "Task finished");
        self.completed.insert(task.id, task);
        true
    }

    /// Look a task up in any collection.
    pub fn task(&self, id: &TaskId) -> Option<&TaskRequest> {
        self.active
            .get(id)
            .or_else(|| self.pending.get(id))
            .or_else(|| self.completed.get(id))
    }

    /// Queued tasks in dequeue order.
    pub fn queued_tasks(&self) -> impl Iterator<Item = &TaskRequest> {
        self.pending.iter()
    }

    pub fn active_tasks(&self) -> impl Iterator<Item = &TaskRequest> {
        self.active.values()
    }

    pub fn task_statistics(&self) -> TaskStatistics {
        TaskStatistics {
            active: self.active.len(),
            queued: self.pending.len(),
            completed: self.completed.len(),
        }
    }

    fn place(&mut self, task: &mut TaskRequest, strategy: Strategy) -> Option<NodeId> {
        let node_id = self
            .load_balancer
            .select_node(task, self.nodes.values(), strategy)?
            .id
            .clone();

        let node = self.nodes.get_mut(&node_id)?;
        node.take_task();
        task.assign_to(node_id.clone());
        Some(node_id)
    }

    // -------------------------------------------------------------------------
    // Cycles
    // -------------------------------------------------------------------------

    /// Recompute every node's health score and flip activity where the
    /// thresholds say so.
    #[instrument(skip(self), fields(nodes = self.nodes.len()))]
    pub fn health_cycle(&mut self) -> HealthReport {
        let policy = self.config.health;
        let now = Utc::now();
        let mut report = HealthReport::default();

        for node in self.nodes.values_mut() {
            let score = policy.score(node);
            node.health_score = score;
            node.last_health_check = now;
            report.evaluated += 1;

            match policy.transition(node.is_active, score) {
                Transition::Deactivate => {
                    node.is_active = false;
                    warn!(node_id = %node.id, health = score, "Node deactivated");
                    report.deactivated.push(node.id.clone());
                }
                Transition::Reactivate => {
                    node.is_active = true;
                    info!(node_id = %node.id, health = score, "Node reactivated");
                    report.reactivated.push(node.id.clone());
                }
                Transition::Unchanged => {}
            }
        }

        self.last_health_cycle = Some(Instant::now());
        report
    }

    /// Observe resource usage and mitigate if the system is stressed or worse.
    #[instrument(skip(self), fields(nodes = self.nodes.len()))]
    pub fn resource_cycle(&mut self) -> ResourceReport {
        let observation = self.resource_manager.monitor(self.nodes.values());

        let actions = match &observation {
            Observation::Observed(snapshot) if snapshot.state.needs_optimization() => {
                let level = snapshot.state;
                if level >= SystemState::Overloaded {
                    warn!(
                        state = %level,
                        utilization = snapshot.overall_utilization,
                        overloaded_nodes = snapshot.overloaded_count,
                        "System saturated"
                    );
                } else {
                    info!(
                        state = %level,
                        utilization = snapshot.overall_utilization,
                        "System stressed"
                    );
                }
                self.resource_manager
                    .optimize(&mut self.nodes, &mut self.active, level)
            }
            _ => Vec::new(),
        };

        self.last_resource_cycle = Some(Instant::now());
        ResourceReport {
            observation,
            actions,
        }
    }

    /// Timer entry point: drain the queue, then run whichever cycles are due.
    pub fn tick(&mut self, now: Instant) -> TickReport {
        let drain = self.drain_queue();

        let health = is_due(self.last_health_cycle, self.config.health_check_interval, now)
            .then(|| self.health_cycle());
        let resources = is_due(
            self.last_resource_cycle,
            self.config.resource_check_interval,
            now,
        )
        .then(|| self.resource_cycle());

        if health.is_some() {
            self.last_health_cycle = Some(now);
        }
        if resources.is_some() {
            self.last_resource_cycle = Some(now);
        }

        TickReport {
            drain,
            health,
            resources,
        }
    }

    pub fn resource_manager(&self) -> &ResourceManager {
        &self.resource_manager
    }

    // -------------------------------------------------------------------------
    // Reporting
    // -------------------------------------------------------------------------

    pub fn status(&self) -> OrchestratorStatus {
        let nodes: BTreeMap<NodeId, NodeStatus> = self
            .nodes
            .values()
            .map(|node| {
                (
                    node.id.clone(),
                    NodeStatus {
                        node_type: node.node_type.clone(),
                        active: node.is_active,
                        health: node.health_score,
                        load_factor: node.load_factor(),
                        current_tasks: node.current_task_count,
                        max_tasks: node.max_task_count,
                        capabilities: node.capabilities.clone(),
                        utilization: node.metrics.overall_utilization(),
                    },
                )
            })
            .collect();

        let system_health = if self.nodes.is_empty() {
            SystemHealth {
                average_node_health: 0.0,
                active_node_ratio: 0.0,
            }
        } else {
            let count = self.nodes.len() as f64;
            let health_sum: f64 = self.nodes.values().map(|n| n.health_score).sum();
            let active = self.nodes.values().filter(|n| n.is_active).count() as f64;
            SystemHealth {
                average_node_health: health_sum / count,
                active_node_ratio: active / count,
            }
        };

        OrchestratorStatus {
            nodes,
            task_statistics: self.task_statistics(),
            system_health,
            resources: self.resource_manager.latest().cloned(),
        }
    }
}

fn is_due(last: Option<Instant>, interval: Duration, now: Instant) -> bool {
    match last {
        None => true,
        Some(last) => now.saturating_duration_since(last) >= interval,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(name: &str) -> NodeId {
        NodeId::parse(name).unwrap()
    }

    fn caps(tags: &[&str]) -> CapabilitySet {
        tags.iter().copied().collect()
    }

    fn orchestrator() -> Orchestrator {
        Orchestrator::new(OrchestratorConfig::default())
    }

    #[test]
    fn test_add_node_rejects_duplicates() {
        let mut orch = orchestrator();
        assert!(orch.add_node(id("a"), "worker", caps(&["x"]), 2));
        assert!(!orch.add_node(id("a"), "other", caps(&["y"]), 5));
        assert_eq!(orch.node(&id("a")).unwrap().node_type, "worker");
    }

    #[test]
    fn test_submit_assigns_and_increments() {
        let mut orch = orchestrator();
        orch.add_node(id("a"), "worker", caps(&["x"]), 2);
        let task_id = orch.submit(TaskRequest::new("t", caps(&["x"]), 0));

        let task = orch.task(&task_id).unwrap();
        assert_eq!(task.status, TaskStatus::Assigned);
        assert_eq!(task.assigned_node, Some(id("a")));
        assert_eq!(orch.node(&id("a")).unwrap().current_task_count, 1);
    }

    #[test]
    fn test_submit_without_nodes_queues() {
        let mut orch = orchestrator();
        let task_id = orch.submit(TaskRequest::new("t", caps(&["x"]), 0));
        assert_eq!(orch.task(&task_id).unwrap().status, TaskStatus::Queued);
        assert_eq!(orch.task_statistics().queued, 1);
    }

    #[test]
    fn test_complete_unknown_task() {
        let mut orch = orchestrator();
        assert!(!orch.complete_task(&TaskId::new(), true));
    }

    #[test]
    fn test_complete_queued_task_is_rejected() {
        let mut orch = orchestrator();
        let task_id = orch.submit(TaskRequest::new("t", caps(&[]), 0));
        assert!(!orch.complete_task(&task_id, true));
    }

    #[test]
    fn test_complete_releases_node() {
        let mut orch = orchestrator();
        orch.add_node(id("a"), "worker", caps(&[]), 1);
        let task_id = orch.submit(TaskRequest::new("t", caps(&[]), 0));
        assert!(orch.complete_task(&task_id, false));

        assert_eq!(orch.node(&id("a")).unwrap().current_task_count, 0);
        assert_eq!(orch.task(&task_id).unwrap().status, TaskStatus::Failed);
        assert!(!orch.complete_task(&task_id, true));
    }

    #[test]
    fn test_drain_respects_batch_size() {
        let mut orch = Orchestrator::new(OrchestratorConfig {
            drain_batch_size: 2,
            ..OrchestratorConfig::default()
        });
        for _ in 0..5 {
            orch.submit(TaskRequest::new("t", caps(&[]), 0));
        }
        orch.add_node(id("a"), "worker", caps(&[]), 10);

        let report = orch.drain_queue();
        assert_eq!(
            report,
            DrainReport {
                processed: 2,
                assigned: 2,
                remaining_in_queue: 3
            }
        );
    }

    #[test]
    fn test_drain_stops_at_first_failure() {
        let mut orch = orchestrator();
        let blocked = orch.submit(TaskRequest::new("t", caps(&["gpu"]), 0));
        orch.submit(TaskRequest::new("t", caps(&[]), 0));
        orch.add_node(id("a"), "worker", caps(&[]), 10);

        let report = orch.drain_queue();
        assert_eq!(report.processed, 1);
        assert_eq!(report.assigned, 0);
        assert_eq!(report.remaining_in_queue, 2);
        assert_eq!(orch.queued_tasks().next().unwrap().id, blocked);
    }

    #[test]
    fn test_report_metrics() {
        let mut orch = orchestrator();
        orch.add_node(id("a"), "worker", caps(&[]), 1);
        assert!(orch.report_metrics(&id("a"), ResourceMetrics::uniform(0.5)));
        assert!(!orch.report_metrics(&id("missing"), ResourceMetrics::idle()));
        assert_eq!(orch.node(&id("a")).unwrap().metrics.memory, 0.5);
    }

    #[test]
    fn test_tick_runs_due_cycles_only() {
        let mut orch = orchestrator();
        orch.add_node(id("a"), "worker", caps(&[]), 1);
        let start = Instant::now();

        let first = orch.tick(start);
        assert!(first.health.is_some());
        assert!(first.resources.is_some());

        let second = orch.tick(start + Duration::from_secs(30));
        assert!(second.health.is_none());
        assert!(second.resources.is_none());

        let third = orch.tick(start + Duration::from_secs(61));
        assert!(third.health.is_none());
        assert!(third.resources.is_some());

        let fourth = orch.tick(start + Duration::from_secs(301));
        assert!(fourth.health.is_some());
    }

    #[test]
    fn test_status_empty_pool() {
        let status = orchestrator().status();
        assert!(status.nodes.is_empty());
        assert_eq!(status.system_health.active_node_ratio, 0.0);
        assert_eq!(status.task_statistics.total(), 0);
        assert!(status.resources.is_none());
    }

    #[test]
    fn test_status_serializes() {
        let mut orch = orchestrator();
        orch.add_node(id("a"), "worker", caps(&["x"]), 2);
        orch.submit(TaskRequest::new("t", caps(&["x"]), 0));
        orch.resource_cycle();

        let json = serde_json::to_value(orch.status()).unwrap();
        assert_eq!(json["nodes"]["a"]["current_tasks"], 1);
        assert_eq!(json["task_statistics"]["active"], 1);
        assert_eq!(json["system_health"]["active_node_ratio"], 1.0);
        assert_eq!(json["resources"]["state"], "optimal");
    }
}
