//! Units of work.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use eco_id::{NodeId, TaskId};
use serde::{Deserialize, Serialize};

use super::CapabilitySet;

/// Placement status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Queued,
    Assigned,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Returns true for `completed` and `failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Queued => "queued",
            Self::Assigned => "assigned",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work submitted to the orchestrator.
///
/// `priority` orders the pending queue (higher first); `estimated_duration`
/// is informational only.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRequest {
    pub id: TaskId,
    pub task_type: String,
    pub required_capabilities: CapabilitySet,
    pub priority: i32,
    pub estimated_duration: Option<Duration>,
    pub created_at: DateTime<Utc>,
    pub assigned_node: Option<NodeId>,
    pub status: TaskStatus,
    pub completed_at: Option<DateTime<Utc>>,

    /// Submission order, assigned by the orchestrator.
    #[serde(skip)]
    pub(crate) sequence: u64,
}

impl TaskRequest {
    pub fn new(
        task_type: impl Into<String>,
        required_capabilities: CapabilitySet,
        priority: i32,
    ) -> Self {
        Self {
            id: TaskId::new(),
            task_type: task_type.into(),
            required_capabilities,
            priority,
            estimated_duration: None,
            created_at: Utc::now(),
            assigned_node: None,
            status: TaskStatus::Pending,
            completed_at: None,
            sequence: 0,
        }
    }

    #[must_use]
    pub fn with_estimated_duration(mut self, duration: Duration) -> Self {
        self.estimated_duration = Some(duration);
        self
    }

    pub(crate) fn assign_to(&mut self, node_id: NodeId) {
        self.assigned_node = Some(node_id);
        self.status = TaskStatus::Assigned;
    }

    pub(crate) fn requeue(&mut self) {
        self.assigned_node = None;
        self.status = TaskStatus::Queued;
    }

    pub(crate) fn finish(&mut self, success: bool) {
        self.status = if success {
            TaskStatus::Completed
        } else {
            TaskStatus::Failed
        };
        self.completed_at = Some(Utc::now());
    }
}
