//! Ecosystem orchestrator.
//!
//! Places capability-constrained tasks on a pool of heterogeneous nodes,
//! queues what cannot be placed, tracks completion, scores node health and
//! reacts to resource pressure.
//!
//! ## Architecture
//!
//! ```text
//! OrchestratorHandle ──► OrchestratorActor ──► Orchestrator
//!        ▲                                      ├── LoadBalancer
//! CycleWorker (tick)                            └── ResourceManager
//! ```
//!
//! ## Modules
//!
//! - `model`: tasks, nodes, capabilities and resource metrics
//! - `load_balancer`: node selection strategies
//! - `resources`: pool-wide monitoring and mitigation
//! - `orchestrator`: the state machine tying the above together
//! - `actors`: single-owner actor wrapping the orchestrator
//! - `worker`: periodic tick driver
//! - `config`: environment configuration

pub mod actors;
pub mod config;
pub mod load_balancer;
pub mod model;
pub mod orchestrator;
pub mod resources;
pub mod worker;

pub use actors::{OrchestratorActor, OrchestratorHandle};
pub use load_balancer::{LoadBalancer, Strategy};
pub use orchestrator::{Orchestrator, OrchestratorConfig};
pub use resources::{ResourceManager, SystemState};
