//! Core actor framework types and traits.
//!
//! - `Actor` trait for defining actor behavior
//! - `ActorHandle` for sending messages to actors
//! - `Supervisor` for spawning actors and stopping them together

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

// =============================================================================
// Core Traits
// =============================================================================

/// Marker trait for actor messages.
pub trait Message: Send + Debug + 'static {}

impl<T: Send + Debug + 'static> Message for T {}

/// Behavior of a single-owner actor.
///
/// Messages are processed one at a time; the actor's state is never shared.
#[async_trait]
pub trait Actor: Send + 'static {
    type Message: Message;

    /// Actor name for logging.
    fn name(&self) -> &str;

    /// Handle a single message. Returns `false` to stop the actor.
    async fn handle(&mut self, msg: Self::Message, ctx: &mut ActorContext) -> bool;

    async fn on_start(&mut self, _ctx: &mut ActorContext) {}

    /// Called once after the loop exits, whatever the reason.
    async fn on_stop(&mut self, _ctx: &mut ActorContext) {}
}

/// Per-actor bookkeeping passed to every callback.
pub struct ActorContext {
    pub actor_id: String,
    pub messages_processed: u64,
}

impl ActorContext {
    pub fn new(actor_id: String) -> Self {
        Self {
            actor_id,
            messages_processed: 0,
        }
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Failures delivering a message to an actor.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ActorError {
    /// Actor mailbox is full.
    #[error("mailbox full")]
    MailboxFull,

    /// Actor has stopped.
    #[error("actor stopped")]
    ActorStopped,
}

// =============================================================================
// Actor Handle
// =============================================================================

/// Handle for sending messages to an actor.
pub struct ActorHandle<M: Message> {
    tx: mpsc::Sender<M>,
    actor_id: String,
}

impl<M: Message> Clone for ActorHandle<M> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            actor_id: self.actor_id.clone(),
        }
    }
}

impl<M: Message> ActorHandle<M> {
    /// Send a message, waiting for mailbox space.
    pub async fn send(&self, msg: M) -> Result<(), ActorError> {
        self.tx
            .send(msg)
            .await
            .map_err(|_| ActorError::ActorStopped)
    }

    /// Send without waiting; fails with `MailboxFull` if there is no space.
    pub fn try_send(&self, msg: M) -> Result<(), ActorError> {
        self.tx.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ActorError::MailboxFull,
            mpsc::error::TrySendError::Closed(_) => ActorError::ActorStopped,
        })
    }

    pub fn actor_id(&self) -> &str {
        &self.actor_id
    }

    /// True once the actor's mailbox has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

// =============================================================================
// Supervisor
// =============================================================================

struct ActorRef {
    actor_type: String,
    task_handle: tokio::task::JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

impl ActorRef {
    fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    fn is_running(&self) -> bool {
        !self.task_handle.is_finished()
    }
}

/// Spawns actors and stops them together.
#[derive(Default)]
pub struct Supervisor {
    children: HashMap<String, ActorRef>,
}

impl Supervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn an actor on the current tokio runtime.
    pub fn spawn<A>(&mut self, actor: A, mailbox_size: usize) -> ActorHandle<A::Message>
    where
        A: Actor,
    {
        let actor_type = actor.name().to_string();
        let actor_id = format!("{}_{}", actor_type, generate_actor_id());
        let (tx, rx) = mpsc::channel(mailbox_size.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task_handle = tokio::spawn(run_actor_loop(actor, rx, shutdown_rx, actor_id.clone()));

        info!(actor_id = %actor_id, actor_type = %actor_type, "Spawned actor");

        self.children.insert(
            actor_id.clone(),
            ActorRef {
                actor_type,
                task_handle,
                shutdown_tx,
            },
        );

        ActorHandle { tx, actor_id }
    }

    /// Signal every actor to stop, then abort any still running after `grace`.
    pub async fn stop_all(&mut self, grace: Duration) {
        info!(count = self.children.len(), "Stopping all actors");

        for child in self.children.values() {
            child.stop();
        }

        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            if self.children.values().all(|c| !c.is_running()) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        for (actor_id, child) in &self.children {
            if child.is_running() {
                warn!(actor_id = %actor_id, actor_type = %child.actor_type, "Force aborting actor");
                child.task_handle.abort();
            }
        }

        self.children.clear();
    }

    pub fn running_count(&self) -> usize {
        self.children.values().filter(|c| c.is_running()).count()
    }
}

// =============================================================================
// Actor Loop
// =============================================================================

async fn run_actor_loop<A: Actor>(
    mut actor: A,
    mut rx: mpsc::Receiver<A::Message>,
    mut shutdown: watch::Receiver<bool>,
    actor_id: String,
) {
    let mut ctx = ActorContext::new(actor_id.clone());
    actor.on_start(&mut ctx).await;
    debug!(actor_id = %actor_id, "Actor started");

    loop {
        tokio::select! {
            biased;

            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!(actor_id = %actor_id, "Actor received shutdown signal");
                    break;
                }
            }

            msg = rx.recv() => {
                let Some(msg) = msg else {
                    debug!(actor_id = %actor_id, "Actor mailbox closed");
                    break;
                };

                ctx.messages_processed += 1;
                if !actor.handle(msg, &mut ctx).await {
                    info!(actor_id = %actor_id, "Actor requested stop");
                    break;
                }
            }
        }
    }

    actor.on_stop(&mut ctx).await;

    info!(
        actor_id = %actor_id,
        messages_processed = ctx.messages_processed,
        "Actor stopped"
    );
}

static ACTOR_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn generate_actor_id() -> u64 {
    ACTOR_ID_COUNTER.fetch_add(1, Ordering::SeqCst)
}

// =============================================================================
// Tests
// =============================================================================
