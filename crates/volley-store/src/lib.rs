//! # Volley Store
//!
//! Batch-partitioned entity storage for per-tick simulation systems.
//!
//! Entities are plain ids. Their components live in columnar [`Batch`]es
//! grouped by layout, and systems select the batches they need with a
//! declarative [`QueryDesc`]:
//!
//! - **Archetypes**: entities with identical component sets share storage
//! - **Batches**: fixed-capacity slices of an archetype, the unit of parallel work
//! - **Snapshots**: queries return `Arc<Batch>` so work scheduled this tick can
//!   keep reading while the world moves on
//!
//! ## Quick Start
//!
//! ```
//! use volley_store::{QueryDesc, World};
//!
//! #[derive(Clone, Debug, PartialEq)]
//! struct Position(f32, f32);
//!
//! let mut world = World::default();
//! let id = world.spawn().with(Position(1.0, 2.0)).build();
//!
//! for batch in world.query(&QueryDesc::new().with::<Position>()) {
//!     let positions = batch.column::<Position>().unwrap();
//!     assert_eq!(batch.entities()[0], id);
//!     assert_eq!(positions[0], Position(1.0, 2.0));
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod batch;
pub mod component;
pub mod entity;
pub mod error;
pub mod query;
pub mod world;

// Re-exports for convenience
pub use batch::{Batch, BatchId, Layout};
pub use component::{Component, ComponentId, Disabled, Prefab};
pub use entity::{EntityId, EntityLocation};
pub use error::{WorldError, WorldResult};
pub use query::{QueryDesc, QueryOptions};
pub use world::{EntityBuilder, World, WorldConfig};
