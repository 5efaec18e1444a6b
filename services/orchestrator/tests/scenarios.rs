//! End-to-end orchestration scenarios.
//!
//! Each test drives an [`Orchestrator`] directly through a full flow:
//! placement, queueing, node churn, health transitions and resource
//! mitigation.

use eco_id::NodeId;
use eco_orchestrator::model::{CapabilitySet, ResourceMetrics, TaskRequest, TaskStatus};
use eco_orchestrator::orchestrator::{HealthPolicy, OrchestratorConfig};
use eco_orchestrator::resources::{Observation, OptimizationAction};
use eco_orchestrator::{Orchestrator, Strategy, SystemState};

fn node_id(id: &str) -> NodeId {
    NodeId::parse(id).unwrap()
}

fn caps(tags: &[&str]) -> CapabilitySet {
    tags.iter().collect()
}

fn task(tags: &[&str]) -> TaskRequest {
    TaskRequest::new("test", caps(tags), 0)
}

#[test]
fn test_single_node_fills_then_queues() {
    let mut orch = Orchestrator::default();
    orch.add_node(node_id("research-1"), "research", caps(&["research"]), 1);

    let first = orch.submit(task(&["research"]));
    let second = orch.submit(task(&["research"]));

    let first = orch.task(&first).unwrap();
    assert_eq!(first.status, TaskStatus::Assigned);
    assert_eq!(first.assigned_node, Some(node_id("research-1")));

    let second = orch.task(&second).unwrap();
    assert_eq!(second.status, TaskStatus::Queued);
    assert!(second.assigned_node.is_none());

    let stats = orch.task_statistics();
    assert_eq!((stats.active, stats.queued, stats.completed), (1, 1, 0));
}

#[test]
fn test_least_loaded_prefers_cooler_node() {
    let mut orch = Orchestrator::default();
    orch.add_node(node_id("a"), "worker", caps(&["batch"]), 10);
    for _ in 0..9 {
        orch.submit(task(&["batch"]));
    }
    orch.add_node(node_id("b"), "worker", caps(&["batch"]), 10);
    orch.submit_with(task(&["batch"]), Strategy::LeastLoaded);

    assert_eq!(orch.node(&node_id("a")).unwrap().load_factor(), 0.9);
    assert_eq!(orch.node(&node_id("b")).unwrap().load_factor(), 0.1);

    let picked = orch.submit_with(task(&["batch"]), Strategy::LeastLoaded);
    assert_eq!(
        orch.task(&picked).unwrap().assigned_node,
        Some(node_id("b"))
    );
}

#[test]
fn test_critical_pool_runs_mitigations_in_order() {
    let mut orch = Orchestrator::default();
    orch.add_node(node_id("hot"), "worker", caps(&["batch"]), 10);
    for _ in 0..10 {
        orch.submit(task(&["batch"]));
    }
    orch.add_node(node_id("cool"), "worker", caps(&["batch"]), 10);
    orch.report_metrics(&node_id("hot"), ResourceMetrics::uniform(0.95));
    orch.report_metrics(&node_id("cool"), ResourceMetrics::uniform(0.95));

    let report = orch.resource_cycle();
    let snapshot = report.observation.snapshot().unwrap();
    assert_eq!(snapshot.state, SystemState::Critical);

    let names: Vec<&str> = report.actions.iter().map(|a| a.name()).collect();
    assert_eq!(
        names,
        vec!["memory_cleanup", "compute_optimization", "task_redistribution"]
    );

    // 10 / 3 tasks move, and their records follow the counters.
    let OptimizationAction::TaskRedistribution { moves } = &report.actions[2] else {
        panic!("expected task redistribution");
    };
    assert_eq!(moves.len(), 3);
    for m in moves {
        let moved = orch.task(&m.task_id).unwrap();
        assert_eq!(moved.assigned_node, Some(node_id("cool")));
        assert_eq!(moved.status, TaskStatus::Assigned);
    }
    assert_eq!(orch.node(&node_id("hot")).unwrap().current_task_count, 7);
    assert_eq!(orch.node(&node_id("cool")).unwrap().current_task_count, 3);

    let on_cool = orch
        .active_tasks()
        .filter(|t| t.assigned_node == Some(node_id("cool")))
        .count();
    assert_eq!(on_cool, 3);
}

#[test]
fn test_unhealthy_node_is_excluded_until_recovered() {
    let config = OrchestratorConfig {
        health: HealthPolicy {
            load_weight: 0.5,
            utilization_weight: 0.5,
            baseline: 0.15,
            ..HealthPolicy::default()
        },
        ..OrchestratorConfig::default()
    };
    let mut orch = Orchestrator::new(config);
    let id = node_id("gpu-1");
    orch.add_node(id.clone(), "inference", caps(&["gpu"]), 1);

    let running = orch.submit(task(&["gpu"]));
    orch.report_metrics(&id, ResourceMetrics::uniform(1.0));

    let report = orch.health_cycle();
    assert_eq!(report.deactivated, vec![id.clone()]);
    let node = orch.node(&id).unwrap();
    assert!(!node.is_active);
    assert!((node.health_score - 0.15).abs() < 1e-9);

    // Capacity frees up but the node stays out of rotation.
    assert!(orch.complete_task(&running, true));
    let waiting = orch.submit(task(&["gpu"]));
    assert_eq!(orch.task(&waiting).unwrap().status, TaskStatus::Queued);

    // 0.65 is not enough to come back.
    let report = orch.health_cycle();
    assert!(report.reactivated.is_empty());
    assert_eq!(orch.drain_queue().assigned, 0);

    orch.report_metrics(&id, ResourceMetrics::idle());
    let report = orch.health_cycle();
    assert_eq!(report.reactivated, vec![id.clone()]);

    let drain = orch.drain_queue();
    assert_eq!(drain.assigned, 1);
    assert_eq!(orch.task(&waiting).unwrap().assigned_node, Some(id));
}

#[test]
fn test_remove_node_requeues_its_tasks() {
    let mut orch = Orchestrator::default();
    orch.add_node(node_id("doomed"), "worker", caps(&["batch"]), 4);
    let ids: Vec<_> = (0..3).map(|_| orch.submit(task(&["batch"]))).collect();

    assert!(orch.remove_node(&node_id("doomed")));
    assert!(!orch.remove_node(&node_id("doomed")));

    let stats = orch.task_statistics();
    assert_eq!((stats.active, stats.queued), (0, 3));
    for id in &ids {
        let t = orch.task(id).unwrap();
        assert_eq!(t.status, TaskStatus::Queued);
        assert!(t.assigned_node.is_none());
    }

    // Requeued tasks keep their submission order.
    let queued: Vec<_> = orch.queued_tasks().map(|t| t.id).collect();
    assert_eq!(queued, ids);

    orch.add_node(node_id("spare"), "worker", caps(&["batch"]), 4);
    let drain = orch.drain_queue();
    assert_eq!(drain.assigned, 3);
    assert_eq!(drain.remaining_in_queue, 0);
}

#[test]
fn test_unplaceable_capability_waits_for_matching_node() {
    let mut orch = Orchestrator::default();
    orch.add_node(node_id("cpu"), "batch", caps(&["batch"]), 8);

    let needs_gpu = orch.submit(task(&["batch", "gpu"]));
    assert_eq!(orch.task(&needs_gpu).unwrap().status, TaskStatus::Queued);

    let drain = orch.drain_queue();
    assert_eq!(drain.processed, 1);
    assert_eq!(drain.assigned, 0);
    assert_eq!(drain.remaining_in_queue, 1);

    orch.add_node(node_id("gpu"), "inference", caps(&["batch", "gpu"]), 2);
    assert_eq!(orch.drain_queue().assigned, 1);
    assert_eq!(
        orch.task(&needs_gpu).unwrap().assigned_node,
        Some(node_id("gpu"))
    );
}

#[test]
fn test_higher_priority_drains_first() {
    let mut orch = Orchestrator::default();
    let low = orch.submit(TaskRequest::new("low", caps(&["x"]), 1));
    let high = orch.submit(TaskRequest::new("high", caps(&["x"]), 9));

    orch.add_node(node_id("n"), "worker", caps(&["x"]), 1);
    orch.drain_queue();

    assert_eq!(orch.task(&high).unwrap().status, TaskStatus::Assigned);
    assert_eq!(orch.task(&low).unwrap().status, TaskStatus::Queued);
}

#[test]
fn test_empty_pool_observation() {
    let mut orch = Orchestrator::default();
    let report = orch.resource_cycle();
    assert_eq!(report.observation, Observation::NoNodes);
    assert!(report.actions.is_empty());
    assert!(orch.status().resources.is_none());
}
