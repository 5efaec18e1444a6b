//! Orchestrator actor and its handle.

use std::time::Instant;

use async_trait::async_trait;
use eco_id::{NodeId, TaskId};
use tokio::sync::oneshot;
use tracing::{debug, info};

use super::framework::{Actor, ActorContext, ActorError, ActorHandle, Supervisor};
use crate::load_balancer::Strategy;
use crate::model::{CapabilitySet, ResourceMetrics, TaskRequest};
use crate::orchestrator::{
    DrainReport, HealthReport, Orchestrator, OrchestratorStatus, ResourceReport, TickReport,
};

/// Commands accepted by the orchestrator actor.
#[derive(Debug)]
pub enum OrchestratorMessage {
    Submit {
        task: TaskRequest,
        strategy: Option<Strategy>,
        reply: oneshot::Sender<TaskId>,
    },
    DrainQueue {
        reply: oneshot::Sender<DrainReport>,
    },
    CompleteTask {
        task_id: TaskId,
        success: bool,
        reply: oneshot::Sender<bool>,
    },
    AddNode {
        node_id: NodeId,
        node_type: String,
        capabilities: CapabilitySet,
        max_tasks: u32,
        reply: oneshot::Sender<bool>,
    },
    RemoveNode {
        node_id: NodeId,
        reply: oneshot::Sender<bool>,
    },
    ReportMetrics {
        node_id: NodeId,
        metrics: ResourceMetrics,
        reply: oneshot::Sender<bool>,
    },
    HealthCycle {
        reply: oneshot::Sender<HealthReport>,
    },
    ResourceCycle {
        reply: oneshot::Sender<ResourceReport>,
    },
    Tick {
        now: Instant,
        reply: oneshot::Sender<TickReport>,
    },
    GetTask {
        task_id: TaskId,
        reply: oneshot::Sender<Option<TaskRequest>>,
    },
    Status {
        reply: oneshot::Sender<OrchestratorStatus>,
    },
    Shutdown,
}

/// Actor that exclusively owns an [`Orchestrator`].
pub struct OrchestratorActor {
    orchestrator: Orchestrator,
}

impl OrchestratorActor {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }

    /// Spawn under `supervisor` and return a typed handle.
    pub fn spawn(self, supervisor: &mut Supervisor, mailbox_size: usize) -> OrchestratorHandle {
        OrchestratorHandle {
            inner: supervisor.spawn(self, mailbox_size),
        }
    }
}

#[async_trait]
impl Actor for OrchestratorActor {
    type Message = OrchestratorMessage;

    fn name(&self) -> &str {
        "orchestrator"
    }

    async fn on_start(&mut self, ctx: &mut ActorContext) {
        info!(
            actor_id = %ctx.actor_id,
            nodes = self.orchestrator.nodes().count(),
            strategy = %self.orchestrator.config().default_strategy,
            "Orchestrator actor started"
        );
    }

    // Replies are best effort: a caller that stopped waiting is not an error.
    async fn handle(&mut self, msg: OrchestratorMessage, _ctx: &mut ActorContext) -> bool {
        let orch = &mut self.orchestrator;
        match msg {
            OrchestratorMessage::Submit {
                task,
                strategy,
                reply,
            } => {
                let task_id = match strategy {
                    Some(strategy) => orch.submit_with(task, strategy),
                    None => orch.submit(task),
                };
                let _ = reply.send(task_id);
            }
            OrchestratorMessage::DrainQueue { reply } => {
                let _ = reply.send(orch.drain_queue());
            }
            OrchestratorMessage::CompleteTask {
                task_id,
                success,
                reply,
            } => {
                let _ = reply.send(orch.complete_task(&task_id, success));
            }
            OrchestratorMessage::AddNode {
                node_id,
                node_type,
                capabilities,
                max_tasks,
                reply,
            } => {
                let _ = reply.send(orch.add_node(node_id, node_type, capabilities, max_tasks));
            }
            OrchestratorMessage::RemoveNode { node_id, reply } => {
                let _ = reply.send(orch.remove_node(&node_id));
            }
            OrchestratorMessage::ReportMetrics {
                node_id,
                metrics,
                reply,
            } => {
                let _ = reply.send(orch.report_metrics(&node_id, metrics));
            }
            OrchestratorMessage::HealthCycle { reply } => {
                let _ = reply.send(orch.health_cycle());
            }
            OrchestratorMessage::ResourceCycle { reply } => {
                let _ = reply.send(orch.resource_cycle());
            }
            OrchestratorMessage::Tick { now, reply } => {
                let _ = reply.send(orch.tick(now));
            }
            OrchestratorMessage::GetTask { task_id, reply } => {
                let _ = reply.send(orch.task(&task_id).cloned());
            }
            OrchestratorMessage::Status { reply } => {
                let _ = reply.send(orch.status());
            }
            OrchestratorMessage::Shutdown => {
                debug!("Orchestrator shutdown requested");
                return false;
            }
        }
        true
    }

    async fn on_stop(&mut self, ctx: &mut ActorContext) {
        let stats = self.orchestrator.task_statistics();
        info!(
            actor_id = %ctx.actor_id,
            active = stats.active,
            queued = stats.queued,
            completed = stats.completed,
            "Orchestrator actor stopping"
        );
    }
}

/// Cloneable async front-end to the orchestrator actor.
///
/// Methods fail only when the actor is gone (or, for
/// [`try_tick`](OrchestratorHandle::try_tick), when its mailbox is full);
/// domain outcomes such as unknown ids or unplaceable tasks come back as
/// values.
#[derive(Clone)]
pub struct OrchestratorHandle {
    inner: ActorHandle<OrchestratorMessage>,
}

impl OrchestratorHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> OrchestratorMessage,
    ) -> Result<T, ActorError> {
        let (tx, rx) = oneshot::channel();
        self.inner.send(build(tx)).await?;
        rx.await.map_err(|_| ActorError::ActorStopped)
    }

    /// Submit new work with the default strategy.
    pub async fn submit<I, S>(
        &self,
        task_type: impl Into<String>,
        required_capabilities: I,
        priority: i32,
    ) -> Result<TaskId, ActorError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let task = TaskRequest::new(
            task_type,
            required_capabilities.into_iter().collect(),
            priority,
        );
        self.submit_task(task, None).await
    }

    /// Submit a prepared task, optionally overriding the strategy.
    pub async fn submit_task(
        &self,
        task: TaskRequest,
        strategy: Option<Strategy>,
    ) -> Result<TaskId, ActorError> {
        self.request(|reply| OrchestratorMessage::Submit {
            task,
            strategy,
            reply,
        })
        .await
    }

    pub async fn drain_queue(&self) -> Result<DrainReport, ActorError> {
        self.request(|reply| OrchestratorMessage::DrainQueue { reply })
            .await
    }

    pub async fn complete_task(&self, task_id: TaskId, success: bool) -> Result<bool, ActorError> {
        self.request(|reply| OrchestratorMessage::CompleteTask {
            task_id,
            success,
            reply,
        })
        .await
    }

    pub async fn add_node<I, S>(
        &self,
        node_id: NodeId,
        node_type: impl Into<String>,
        capabilities: I,
        max_tasks: u32,
    ) -> Result<bool, ActorError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let node_type = node_type.into();
        let capabilities = capabilities.into_iter().collect();
        self.request(|reply| OrchestratorMessage::AddNode {
            node_id,
            node_type,
            capabilities,
            max_tasks,
            reply,
        })
        .await
    }

    pub async fn remove_node(&self, node_id: NodeId) -> Result<bool, ActorError> {
        self.request(|reply| OrchestratorMessage::RemoveNode { node_id, reply })
            .await
    }

    pub async fn report_metrics(
        &self,
        node_id: NodeId,
        metrics: ResourceMetrics,
    ) -> Result<bool, ActorError> {
        self.request(|reply| OrchestratorMessage::ReportMetrics {
            node_id,
            metrics,
            reply,
        })
        .await
    }

    pub async fn health_cycle(&self) -> Result<HealthReport, ActorError> {
        self.request(|reply| OrchestratorMessage::HealthCycle { reply })
            .await
    }

    pub async fn resource_cycle(&self) -> Result<ResourceReport, ActorError> {
        self.request(|reply| OrchestratorMessage::ResourceCycle { reply })
            .await
    }

    pub async fn tick(&self, now: Instant) -> Result<TickReport, ActorError> {
        self.request(|reply| OrchestratorMessage::Tick { now, reply }).await
    }

    /// Like [`tick`](Self::tick), but fails with [`ActorError::MailboxFull`]
    /// instead of waiting when the mailbox has no space.
    pub async fn try_tick(&self, now: Instant) -> Result<TickReport, ActorError> {
        let (reply, rx) = oneshot::channel();
        self.inner.try_send(OrchestratorMessage::Tick { now, reply })?;
        rx.await.map_err(|_| ActorError::ActorStopped)
    }

    pub async fn task(&self, task_id: TaskId) -> Result<Option<TaskRequest>, ActorError> {
        self.request(|reply| OrchestratorMessage::GetTask { task_id, reply })
            .await
    }

    pub async fn status(&self) -> Result<OrchestratorStatus, ActorError> {
        self.request(|reply| OrchestratorMessage::Status { reply })
            .await
    }

    /// Ask the actor to stop after the messages already queued.
    pub async fn shutdown(&self) -> Result<(), ActorError> {
        self.inner.send(OrchestratorMessage::Shutdown).await
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_try_tick_reports_full_mailbox() {
        let mut supervisor = Supervisor::new();
        let handle = OrchestratorActor::new(Orchestrator::default()).spawn(&mut supervisor, 1);

        // The actor has not been polled yet, so this fills its only slot.
        let (reply, rx) = oneshot::channel();
        handle
            .inner
            .try_send(OrchestratorMessage::Status { reply })
            .unwrap();

        assert_eq!(
            handle.try_tick(Instant::now()).await.unwrap_err(),
            ActorError::MailboxFull
        );

        rx.await.unwrap();
        let report = handle.try_tick(Instant::now()).await.unwrap();
        assert!(report.health.is_some());

        supervisor.stop_all(Duration::from_secs(1)).await;
    }
}
