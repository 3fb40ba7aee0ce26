//! The `World`: entity container partitioned into batches.
//!
//! Entities are grouped by [`Layout`] into archetypes, and each archetype is
//! split into [`Batch`]es of at most [`WorldConfig::batch_capacity`] entities.
//! Batches are stored behind `Arc` so that [`World::query`] hands out cheap,
//! immutable snapshots. Mutation through [`World::get_mut`] is copy-on-write:
//! a batch still referenced by a running job is cloned before it is changed,
//! and the job keeps reading the snapshot it was given.
//!
//! # Example
//!
//! ```
//! use volley_store::{QueryDesc, World, WorldConfig};
//!
//! #[derive(Clone, Debug, PartialEq)]
//! struct Health(f32);
//!
//! let mut world = World::new(WorldConfig { batch_capacity: 2 });
//! for _ in 0..5 {
//!     world.spawn().with(Health(10.0)).build();
//! }
//!
//! let batches = world.query(&QueryDesc::new().with::<Health>());
//! assert_eq!(batches.len(), 3);
//! assert_eq!(batches.iter().map(|b| b.len()).sum::<usize>(), 5);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::batch::{Batch, BatchId, Layout};
use crate::component::{Component, ComponentId, ComponentValue};
use crate::entity::{EntityId, EntityLocation};
use crate::error::{WorldError, WorldResult};
use crate::query::QueryDesc;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for a [`World`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Maximum entities per batch. Zero is treated as one.
    pub batch_capacity: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self { batch_capacity: 128 }
    }
}

// =============================================================================
// World
// =============================================================================

struct Archetype {
    layout: Arc<Layout>,
    batches: Vec<Arc<Batch>>,
}

/// Entity store with batch-partitioned columnar storage.
pub struct World {
    config: WorldConfig,
    archetypes: Vec<Archetype>,
    archetype_index: HashMap<Layout, usize>,
    locations: HashMap<EntityId, EntityLocation>,
    next_id: u64,
}

impl World {
    /// Creates an empty world.
    #[must_use]
    pub fn new(config: WorldConfig) -> Self {
        Self {
            config,
            archetypes: Vec::new(),
            archetype_index: HashMap::new(),
            locations: HashMap::new(),
            next_id: 0,
        }
    }

    /// Returns the world's configuration.
    #[must_use]
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Starts building a new entity.
    pub fn spawn(&mut self) -> EntityBuilder<'_> {
        EntityBuilder {
            world: self,
            values: Vec::new(),
        }
    }

    /// Removes an entity and all of its components.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::NoSuchEntity`] if `id` is not alive.
    pub fn despawn(&mut self, id: EntityId) -> WorldResult<()> {
        let location = self
            .locations
            .remove(&id)
            .ok_or(WorldError::NoSuchEntity(id))?;

        let batch = Arc::make_mut(&mut self.archetypes[location.archetype].batches[location.batch]);
        if let Some(moved) = batch.swap_remove(location.row) {
            if let Some(moved_location) = self.locations.get_mut(&moved) {
                moved_location.row = location.row;
            }
        }
        tracing::trace!(entity = %id, batch = %batch.id(), "despawned entity");
        Ok(())
    }

    /// Returns true if the entity is alive.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.locations.contains_key(&id)
    }

    /// Number of live entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    /// Returns true if no entities are alive.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Total number of batches, including empty ones.
    #[must_use]
    pub fn batch_count(&self) -> usize {
        self.archetypes.iter().map(|archetype| archetype.batches.len()).sum()
    }

    /// Returns where an entity's data is stored.
    #[must_use]
    pub fn location(&self, id: EntityId) -> Option<EntityLocation> {
        self.locations.get(&id).copied()
    }

    /// Returns component `C` of an entity.
    #[must_use]
    pub fn get<C: Component>(&self, id: EntityId) -> Option<&C> {
        let location = self.locations.get(&id)?;
        self.archetypes[location.archetype].batches[location.batch]
            .column::<C>()?
            .get(location.row)
    }

    /// Returns component `C` of an entity for mutation.
    ///
    /// If the entity's batch is shared with a snapshot, the batch is cloned first.
    pub fn get_mut<C: Component>(&mut self, id: EntityId) -> Option<&mut C> {
        let location = *self.locations.get(&id)?;
        let archetype = &mut self.archetypes[location.archetype];
        if !archetype.layout.contains(ComponentId::of::<C>()) {
            return None;
        }
        Arc::make_mut(&mut archetype.batches[location.batch])
            .column_mut::<C>()?
            .get_mut(location.row)
    }

    /// Returns every non-empty batch whose layout matches `query`.
    ///
    /// Batches are returned in archetype creation order, then batch order,
    /// which is deterministic for a given spawn history.
    #[must_use]
    pub fn query(&self, query: &QueryDesc) -> Vec<Arc<Batch>> {
        self.archetypes
            .iter()
            .filter(|archetype| query.matches(&archetype.layout))
            .flat_map(|archetype| archetype.batches.iter())
            .filter(|batch| !batch.is_empty())
            .cloned()
            .collect()
    }

    /// Iterates every live entity id in storage order.
    pub fn entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.archetypes
            .iter()
            .flat_map(|archetype| archetype.batches.iter())
            .flat_map(|batch| batch.entities().iter().copied())
    }

    fn insert(&mut self, mut values: Vec<Box<dyn ComponentValue>>) -> EntityId {
        let id = EntityId::new(self.next_id);
        self.next_id += 1;

        values.sort_by_key(|value| value.id());
        let layout = Layout::from_ids(values.iter().map(|value| value.id()));
        let archetype_index = self.archetype_for(layout);
        let capacity = self.config.batch_capacity.max(1);

        let archetype = &mut self.archetypes[archetype_index];
        let batch_index = match archetype.batches.iter().position(|batch| batch.len() < capacity) {
            Some(index) => index,
            None => {
                let index = archetype.batches.len();
                let batch = Batch::new(
                    BatchId::new(archetype_index, index),
                    Arc::clone(&archetype.layout),
                    &values,
                );
                archetype.batches.push(Arc::new(batch));
                index
            }
        };

        let row = Arc::make_mut(&mut archetype.batches[batch_index]).push(id, values);
        self.locations.insert(
            id,
            EntityLocation {
                archetype: archetype_index,
                batch: batch_index,
                row,
            },
        );
        id
    }

    fn archetype_for(&mut self, layout: Layout) -> usize {
        if let Some(&index) = self.archetype_index.get(&layout) {
            return index;
        }
        let index = self.archetypes.len();
        tracing::debug!(archetype = index, components = layout.len(), "created archetype");
        let layout = Arc::new(layout);
        self.archetype_index.insert((*layout).clone(), index);
        self.archetypes.push(Archetype {
            layout,
            batches: Vec::new(),
        });
        index
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new(WorldConfig::default())
    }
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("entities", &self.locations.len())
            .field("archetypes", &self.archetypes.len())
            .field("batches", &self.batch_count())
            .field("config", &self.config)
            .finish()
    }
}

// =============================================================================
// Entity Builder
// =============================================================================

/// Collects components for a new entity. Created by [`World::spawn`].
pub struct EntityBuilder<'w> {
    world: &'w mut World,
    values: Vec<Box<dyn ComponentValue>>,
}

impl EntityBuilder<'_> {
    /// Adds a component. A second value of the same type replaces the first.
    #[must_use]
    pub fn with<C: Component>(mut self, component: C) -> Self {
        let id = ComponentId::of::<C>();
        self.values.retain(|value| value.id() != id);
        self.values.push(Box::new(component));
        self
    }

    /// Inserts the entity into the world and returns its id.
    pub fn build(self) -> EntityId {
        self.world.insert(self.values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::Disabled;
    use crate::query::QueryOptions;

    #[derive(Clone, Debug, PartialEq)]
    struct Health(f32);
    #[derive(Clone, Debug, PartialEq)]
    struct Armor(u32);

    fn world(capacity: usize) -> World {
        World::new(WorldConfig {
            batch_capacity: capacity,
        })
    }

    #[test]
    fn spawn_assigns_monotonic_ids() {
        let mut world = world(4);
        let a = world.spawn().with(Health(1.0)).build();
        let b = world.spawn().with(Health(2.0)).build();
        assert!(a < b);
        assert_eq!(world.len(), 2);
        assert_eq!(world.get::<Health>(b), Some(&Health(2.0)));
    }

    #[test]
    fn layouts_split_into_archetypes() {
        let mut world = world(4);
        world.spawn().with(Health(1.0)).build();
        world.spawn().with(Health(1.0)).with(Armor(2)).build();

        assert_eq!(world.query(&QueryDesc::new().with::<Health>()).len(), 2);
        assert_eq!(world.query(&QueryDesc::new().with::<Armor>()).len(), 1);
    }

    #[test]
    fn batches_respect_capacity() {
        let mut world = world(3);
        for i in 0..7 {
            world.spawn().with(Armor(i)).build();
        }
        let lens: Vec<_> = world
            .query(&QueryDesc::new().with::<Armor>())
            .iter()
            .map(|batch| batch.len())
            .collect();
        assert_eq!(lens, vec![3, 3, 1]);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut world = world(0);
        world.spawn().with(Armor(1)).build();
        world.spawn().with(Armor(2)).build();
        assert_eq!(world.batch_count(), 2);
    }

    #[test]
    fn duplicate_component_replaces() {
        let mut world = world(4);
        let id = world.spawn().with(Armor(1)).with(Armor(5)).build();
        assert_eq!(world.get::<Armor>(id), Some(&Armor(5)));
    }

    #[test]
    fn despawn_keeps_locations_consistent() {
        let mut world = world(8);
        let a = world.spawn().with(Armor(1)).build();
        let b = world.spawn().with(Armor(2)).build();
        let c = world.spawn().with(Armor(3)).build();

        world.despawn(a).unwrap();
        assert!(!world.contains(a));
        assert_eq!(world.get::<Armor>(c), Some(&Armor(3)));
        assert_eq!(world.get::<Armor>(b), Some(&Armor(2)));
        assert_eq!(world.despawn(a), Err(WorldError::NoSuchEntity(a)));
    }

    #[test]
    fn despawned_slot_is_reused() {
        let mut world = world(2);
        let a = world.spawn().with(Armor(1)).build();
        world.spawn().with(Armor(2)).build();
        world.despawn(a).unwrap();
        world.spawn().with(Armor(3)).build();
        assert_eq!(world.batch_count(), 1);
    }

    #[test]
    fn get_mut_is_copy_on_write() {
        let mut world = world(4);
        let id = world.spawn().with(Health(10.0)).build();
        let snapshot = world.query(&QueryDesc::new().with::<Health>());

        world.get_mut::<Health>(id).unwrap().0 = 3.0;

        assert_eq!(snapshot[0].column::<Health>().unwrap()[0], Health(10.0));
        assert_eq!(world.get::<Health>(id), Some(&Health(3.0)));
    }

    #[test]
    fn get_mut_missing_component() {
        let mut world = world(4);
        let id = world.spawn().with(Health(10.0)).build();
        assert!(world.get_mut::<Armor>(id).is_none());
        assert!(world.get_mut::<Health>(EntityId::new(99)).is_none());
    }

    #[test]
    fn disabled_entities_are_hidden_by_default() {
        let mut world = world(4);
        world.spawn().with(Health(1.0)).with(Disabled).build();
        world.spawn().with(Health(1.0)).build();

        let query = QueryDesc::new().with::<Health>();
        assert_eq!(world.query(&query).len(), 1);
        assert_eq!(
            world.query(&query.options(QueryOptions::INCLUDE_DISABLED)).len(),
            2
        );
    }

    #[test]
    fn empty_batches_are_not_returned() {
        let mut world = world(4);
        let id = world.spawn().with(Armor(1)).build();
        world.despawn(id).unwrap();
        assert!(world.query(&QueryDesc::new().with::<Armor>()).is_empty());
        assert_eq!(world.batch_count(), 1);
    }

    #[test]
    fn config_defaults_from_empty_json() {
        let config: WorldConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, WorldConfig::default());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;
        use std::collections::BTreeMap;

        #[derive(Debug, Clone)]
        enum Op {
            Spawn(u32),
            Despawn(usize),
        }

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![
                any::<u32>().prop_map(Op::Spawn),
                any::<usize>().prop_map(Op::Despawn)
            ]
        }

        proptest! {
            #[test]
            fn matches_a_map_model(
                ops in prop::collection::vec(op(), 0..80),
                capacity in 1usize..6,
            ) {
                let mut world = world(capacity);
                let mut model = BTreeMap::new();

                for op in ops {
                    match op {
                        Op::Spawn(value) => {
                            let id = world.spawn().with(Armor(value)).build();
                            model.insert(id, value);
                        }
                        Op::Despawn(pick) if !model.is_empty() => {
                            let id = *model.keys().nth(pick % model.len()).unwrap();
                            model.remove(&id);
                            prop_assert!(world.despawn(id).is_ok());
                        }
                        Op::Despawn(_) => {}
                    }
                }

                prop_assert_eq!(world.len(), model.len());
                for (&id, &value) in &model {
                    prop_assert_eq!(world.get::<Armor>(id), Some(&Armor(value)));
                }
                let total: usize = world
                    .query(&QueryDesc::new().with::<Armor>())
                    .iter()
                    .map(|batch| {
                        assert!(batch.len() <= capacity);
                        batch.len()
                    })
                    .sum();
                prop_assert_eq!(total, model.len());
            }
        }
    }
}
