//! Logical executor node.

use chrono::{DateTime, Utc};
use eco_id::NodeId;
use serde::Serialize;

use super::{CapabilitySet, ResourceMetrics};

/// Minimum health score for a node to take new work.
pub const MIN_ACCEPT_HEALTH: f64 = 0.5;

/// A logical executor with a capability set and a capacity limit.
#[derive(Debug, Clone, Serialize)]
pub struct SystemNode {
    pub id: NodeId,
    pub node_type: String,
    pub capabilities: CapabilitySet,
    pub metrics: ResourceMetrics,
    pub is_active: bool,
    pub health_score: f64,
    pub current_task_count: u32,
    pub max_task_count: u32,
    pub created_at: DateTime<Utc>,
    pub last_health_check: DateTime<Utc>,
}

impl SystemNode {
    /// A freshly registered node: idle, active, fully trusted.
    pub fn new(
        id: NodeId,
        node_type: impl Into<String>,
        capabilities: CapabilitySet,
        max_task_count: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            node_type: node_type.into(),
            capabilities,
            metrics: ResourceMetrics::idle(),
            is_active: true,
            health_score: 1.0,
            current_task_count: 0,
            max_task_count,
            created_at: now,
            last_health_check: now,
        }
    }

    /// `current / max`, clamped to `[0, 1]`; 0 when the node has no capacity.
    pub fn load_factor(&self) -> f64 {
        if self.max_task_count == 0 {
            return 0.0;
        }
        (f64::from(self.current_task_count) / f64::from(self.max_task_count)).min(1.0)
    }

    pub fn free_slots(&self) -> u32 {
        self.max_task_count.saturating_sub(self.current_task_count)
    }

    pub fn can_accept_task(&self) -> bool {
        self.is_active
            && self.health_score > MIN_ACCEPT_HEALTH
            && self.current_task_count < self.max_task_count
            && !self.metrics.is_overloaded()
    }

    /// True if this node offers every capability in `required`.
    pub fn supports(&self, required: &CapabilitySet) -> bool {
        self.capabilities.is_superset_of(required)
    }

    pub(crate) fn take_task(&mut self) {
        self.current_task_count = self.current_task_count.saturating_add(1);
    }

    pub(crate) fn release_task(&mut self) {
        self.current_task_count = self.current_task_count.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(max: u32) -> SystemNode {
        SystemNode::new(
            NodeId::parse("n1").unwrap(),
            "worker",
            ["research"].into_iter().collect(),
            max,
        )
    }

    #[test]
    fn test_new_node_defaults() {
        let n = node(4);
        assert!(n.is_active);
        assert_eq!(n.health_score, 1.0);
        assert_eq!(n.current_task_count, 0);
        assert!(n.can_accept_task());
    }

    #[test]
    fn test_load_factor() {
        let mut n = node(4);
        n.take_task();
        assert_eq!(n.load_factor(), 0.25);
        assert_eq!(node(0).load_factor(), 0.0);
    }

    #[test]
    fn test_release_floors_at_zero() {
        let mut n = node(2);
        n.release_task();
        assert_eq!(n.current_task_count, 0);
    }

    #[test]
    fn test_cannot_accept_when_full() {
        let mut n = node(1);
        n.take_task();
        assert!(!n.can_accept_task());
        assert_eq!(n.free_slots(), 0);
    }

    #[test]
    fn test_cannot_accept_when_unhealthy_or_inactive() {
        let mut n = node(2);
        n.health_score = 0.5;
        assert!(!n.can_accept_task());

        let mut n = node(2);
        n.is_active = false;
        assert!(!n.can_accept_task());
    }

    #[test]
    fn test_cannot_accept_when_overloaded() {
        let mut n = node(2);
        n.metrics = ResourceMetrics::new(0.95, 0.0, 0.0, 0.0, 0.0, 0.0);
        assert!(!n.can_accept_task());
    }
}
