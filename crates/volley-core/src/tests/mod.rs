//! Crate-level tests for the trigger/dispatch pipeline.
//!
//! - `integration.rs`: end-to-end ticks through passes, pipelines and the simulation
//! - `determinism.rs`: identical seeds give identical records and world state
//! - `properties.rs`: property tests over randomly shaped entities
//! - `helpers.rs`: world builders and test writers

mod helpers;

// Re-export for convenience
pub use helpers::*;
