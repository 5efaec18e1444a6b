//! # eco-id
//!
//! Typed identifiers for the ecosystem orchestrator.
//!
//! ## Kinds of ID
//!
//! - **System-generated** IDs (`TaskId`) are ULID based and carry a type
//!   prefix: `task_01HV4Z2WQXKJNM8GPQY6VBKC3D`. They sort by creation time.
//! - **Operator-chosen** IDs (`NodeId`) are names handed in when a node is
//!   registered. They are validated but otherwise opaque.
//!
//! Both kinds parse strictly, format canonically and serialize as strings,
//! so `parse(format(id)) == id` holds for every valid ID.

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;

/// Re-export ulid for consumers that need raw ULID operations
pub use ulid::Ulid;
