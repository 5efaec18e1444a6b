//! Per-node utilization snapshot.

use serde::{Deserialize, Serialize};

/// Weight of compute in the overall utilization.
pub const COMPUTE_WEIGHT: f64 = 0.25;
/// Weight of memory in the overall utilization.
pub const MEMORY_WEIGHT: f64 = 0.25;
/// Weight of accelerator in the overall utilization.
pub const ACCELERATOR_WEIGHT: f64 = 0.20;
/// Weight of network in the overall utilization.
pub const NETWORK_WEIGHT: f64 = 0.10;
/// Weight of storage in the overall utilization.
pub const STORAGE_WEIGHT: f64 = 0.10;
/// Weight of model load in the overall utilization.
pub const MODEL_LOAD_WEIGHT: f64 = 0.10;

/// Any single ratio above this marks the node overloaded.
pub const SINGLE_RESOURCE_LIMIT: f64 = 0.9;
/// Overall utilization above this marks the node overloaded.
pub const OVERALL_LIMIT: f64 = 0.8;

/// Six independent utilization ratios, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceMetrics {
    pub compute: f64,
    pub memory: f64,
    pub accelerator: f64,
    pub network: f64,
    pub storage: f64,
    pub model_load: f64,
}

impl ResourceMetrics {
    /// Build a snapshot, clamping every ratio into `[0, 1]`.
    pub fn new(
        compute: f64,
        memory: f64,
        accelerator: f64,
        network: f64,
        storage: f64,
        model_load: f64,
    ) -> Self {
        Self {
            compute,
            memory,
            accelerator,
            network,
            storage,
            model_load,
        }
        .clamped()
    }

    /// All ratios at zero.
    pub fn idle() -> Self {
        Self::default()
    }

    /// Same ratio on every axis.
    pub fn uniform(ratio: f64) -> Self {
        Self::new(ratio, ratio, ratio, ratio, ratio, ratio)
    }

    /// Copy with every ratio forced into `[0, 1]`. NaN becomes 0.
    #[must_use]
    pub fn clamped(self) -> Self {
        Self {
            compute: clamp_ratio(self.compute),
            memory: clamp_ratio(self.memory),
            accelerator: clamp_ratio(self.accelerator),
            network: clamp_ratio(self.network),
            storage: clamp_ratio(self.storage),
            model_load: clamp_ratio(self.model_load),
        }
    }

    pub fn overall_utilization(&self) -> f64 {
        self.compute * COMPUTE_WEIGHT
            + self.memory * MEMORY_WEIGHT
            + self.accelerator * ACCELERATOR_WEIGHT
            + self.network * NETWORK_WEIGHT
            + self.storage * STORAGE_WEIGHT
            + self.model_load * MODEL_LOAD_WEIGHT
    }

    pub fn is_overloaded(&self) -> bool {
        self.ratios().iter().any(|r| *r > SINGLE_RESOURCE_LIMIT)
            || self.overall_utilization() > OVERALL_LIMIT
    }

    fn ratios(&self) -> [f64; 6] {
        [
            self.compute,
            self.memory,
            self.accelerator,
            self.network,
            self.storage,
            self.model_load,
        ]
    }
}

fn clamp_ratio(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
