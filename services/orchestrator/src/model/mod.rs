//! Value types describing work and executors.
//!
//! - [`CapabilitySet`]: tags a node offers or a task requires
//! - [`ResourceMetrics`]: per-node utilization snapshot
//! - [`SystemNode`]: a logical executor with a capacity limit
//! - [`TaskRequest`]: a unit of work and its placement status

mod capability;
mod metrics;
mod node;
mod task;

pub use capability::{Capability, CapabilitySet};
pub use metrics::ResourceMetrics;
pub use node::SystemNode;
pub use task::{TaskRequest, TaskStatus};
