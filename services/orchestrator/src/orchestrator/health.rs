//! Node health scoring.

use serde::{Deserialize, Serialize};

use crate::model::SystemNode;

/// Tunable health heuristic.
///
/// ```text
/// score = clamp(1 - load_weight * load_factor
///                  - utilization_weight * utilization
///                  + baseline, 0, 1)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthPolicy {
    pub load_weight: f64,
    pub utilization_weight: f64,
    pub baseline: f64,
    /// Active nodes scoring below this are deactivated.
    pub deactivate_below: f64,
    /// Inactive nodes scoring above this are reactivated.
    pub reactivate_above: f64,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            load_weight: 0.3,
            utilization_weight: 0.4,
            baseline: 0.1,
            deactivate_below: 0.2,
            reactivate_above: 0.7,
        }
    }
}

/// Activity change decided by a health evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transition {
    Deactivate,
    Reactivate,
    Unchanged,
}

impl HealthPolicy {
    pub fn score(&self, node: &SystemNode) -> f64 {
        let raw = 1.0 - self.load_weight * node.load_factor()
            - self.utilization_weight * node.metrics.overall_utilization()
            + self.baseline;
        if raw.is_nan() {
            0.0
        } else {
            raw.clamp(0.0, 1.0)
        }
    }

    pub(crate) fn transition(&self, is_active: bool, score: f64) -> Transition {
        if is_active && score < self.deactivate_below {
            Transition::Deactivate
        } else if !is_active && score > self.reactivate_above {
            Transition::Reactivate
        } else {
            Transition::Unchanged
        }
    }
}
