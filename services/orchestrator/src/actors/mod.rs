//! Actor layer.
//!
//! The orchestrator state is owned by exactly one actor. Callers talk to it
//! through an [`OrchestratorHandle`], which sends commands over a bounded
//! mailbox and awaits the reply. Commands are processed one at a time, so
//! task submission, completion, queue drains and the periodic cycles never
//! interleave.
//!
//! ```text
//! Supervisor
//! └── OrchestratorActor   (owns Orchestrator)
//!         ▲
//!         ├── OrchestratorHandle (callers)
//!         └── CycleWorker        (timer ticks)
//! ```

mod framework;
mod orchestrator;

pub use framework::{Actor, ActorContext, ActorError, ActorHandle, Message, Supervisor};
pub use orchestrator::{OrchestratorActor, OrchestratorHandle, OrchestratorMessage};
