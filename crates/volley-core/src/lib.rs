//! # Volley Core
//!
//! Per-tick ability-effect trigger and dispatch for batch-partitioned
//! entity simulations.
//!
//! Every tick, each trigger pass finds the entities whose abilities are
//! active, resolves who each tied effect lands on, enriches it with caster
//! context, and writes one record per triggered effect into a segmented
//! channel. A consumer joins every pass that feeds it before reading.
//!
//! ## Architecture
//!
//! - **Query composition** ([`query`]): fixed base requirement plus the
//!   writer's own
//! - **Trigger job** ([`job`]): one rayon task per batch, one channel segment
//!   per batch
//! - **Context writers** ([`writer`]): the per-category extension point
//! - **Trigger passes** ([`pass`]): the should-run / allocate / schedule /
//!   register handshake
//! - **Consumers** ([`consumer`]): join barrier, channel ownership, application
//! - **Pipelines and simulation** ([`pipeline`], [`simulation`]): the tick loop
//!
//! Stock damage and status categories live in [`effects`].
//!
//! ## Usage
//!
//! ```
//! use volley_core::ability::{Ability, AbilitySequence, AbilityState, Target};
//! use volley_core::effect::{EffectEntry, EffectSequence};
//! use volley_core::effects::{CasterStats, CombatConsumer, DamageEffect, DamageWriter, Health};
//! use volley_core::pass::TriggerPass;
//! use volley_core::pipeline::EffectPipeline;
//! use volley_core::simulation::{Simulation, SimulationConfig};
//!
//! let mut sim = Simulation::new(SimulationConfig::default());
//! let world = sim.world_mut();
//! let dummy = world.spawn().with(Health::full(50.0)).build();
//! world
//!     .spawn()
//!     .with(AbilitySequence::new(vec![Ability::new(AbilityState::Active)]))
//!     .with(Target::entity(dummy))
//!     .with(EffectSequence::new(vec![EffectEntry::new(0, DamageEffect::on_target(10.0))]))
//!     .with(CasterStats { power: 2.0 })
//!     .build();
//!
//! sim.add_stage(
//!     EffectPipeline::new("combat", CombatConsumer::new())
//!         .with_pass(TriggerPass::<DamageEffect, _>::new("damage", DamageWriter)),
//! );
//!
//! sim.step().unwrap();
//! assert_eq!(sim.world().get::<Health>(dummy).unwrap().current, 30.0);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Re-export the entity store
pub use volley_store;
pub use volley_store::{
    Batch, ComponentId, EntityId, QueryDesc, QueryOptions, World, WorldConfig, WorldError,
};

// Data model
pub mod ability;
pub mod channel;
pub mod effect;
pub mod error;

// Engine
pub mod consumer;
pub mod job;
pub mod pass;
pub mod query;
pub mod writer;

// Tick loop
pub mod pipeline;
pub mod simulation;

// Stock categories
pub mod effects;

#[cfg(test)]
mod tests;
