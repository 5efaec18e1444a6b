//! Cycle worker.
//!
//! Sends a `Tick` to the orchestrator actor on a fixed interval. The actor
//! decides which cycles are due, so the worker only paces the loop.

use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::actors::{ActorError, OrchestratorHandle};

/// Periodic driver for queue drains and health/resource cycles.
pub struct CycleWorker {
    handle: OrchestratorHandle,
    interval: Duration,
}

impl CycleWorker {
    pub fn new(handle: OrchestratorHandle, interval: Duration) -> Self {
        Self { handle, interval }
    }

    /// Run until shutdown is signaled or the actor stops.
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            "Starting cycle worker"
        );

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if !self.run_tick().await {
                        break;
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Cycle worker shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Returns false once the actor is gone.
    ///
    /// A full mailbox skips this tick rather than queueing another one
    /// behind the backlog.
    async fn run_tick(&self) -> bool {
        match self.handle.try_tick(Instant::now()).await {
            Ok(report) => {
                let busy = report.drain.assigned > 0
                    || report.health.is_some()
                    || report.resources.is_some();
                if busy {
                    info!(
                        assigned = report.drain.assigned,
                        queued = report.drain.remaining_in_queue,
                        health_cycle = report.health.is_some(),
                        resource_cycle = report.resources.is_some(),
                        "Tick complete"
                    );
                } else {
                    debug!(queued = report.drain.remaining_in_queue, "Idle tick");
                }
                true
            }
            Err(ActorError::MailboxFull) => {
                warn!("Orchestrator mailbox full, skipping tick");
                true
            }
            Err(e) => {
                error!(error = %e, "Orchestrator unavailable, stopping cycle worker");
                false
            }
        }
    }
}
