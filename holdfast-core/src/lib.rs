//! # holdfast-core
//!
//! Retention and hold lifecycle kernel for immutable object storage.
//! Provides the bucket retention policy state machine (unset, active,
//! locked), per-object and default event-based holds, temporary holds, and
//! the retention gate consulted before any delete or overwrite. All
//! mutations go through one optimistic, precondition-checked update
//! primitive over a pluggable attribute store.

pub mod client;
pub mod error;
pub mod gate;
pub mod holds;
pub mod infrastructure;
#[path = "infrastructure_in_memory.rs"]
pub mod infrastructure_in_memory;
#[cfg(feature = "sqlite")]
#[path = "infrastructure_sqlite.rs"]
pub mod infrastructure_sqlite;
pub mod lifecycle;
pub mod optimistic;
pub mod retention;
pub mod types;

pub use error::{HoldfastError, HoldfastResult, StoreError, StoreResult};

#[cfg(test)]
mod gate_test;
#[cfg(test)]
mod test_support;
