//! Batches: contiguous, columnar slices of one archetype.
//!
//! A [`Batch`] is the unit of parallel work. Every entity in a batch shares the
//! same [`Layout`], and each component is stored as its own column so a job
//! can borrow, for example, all ability sequences of the batch as one slice.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::component::{Column, Component, ComponentId, ComponentValue};
use crate::entity::EntityId;

// =============================================================================
// Layout
// =============================================================================

/// The sorted, duplicate-free set of components an archetype carries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Layout {
    ids: Vec<ComponentId>,
}

impl Layout {
    /// Builds a layout from component ids in any order.
    #[must_use]
    pub fn from_ids(ids: impl IntoIterator<Item = ComponentId>) -> Self {
        let mut ids: Vec<_> = ids.into_iter().collect();
        ids.sort();
        ids.dedup();
        Self { ids }
    }

    /// Returns true if the layout contains `id`.
    #[must_use]
    pub fn contains(&self, id: ComponentId) -> bool {
        self.ids.binary_search(&id).is_ok()
    }

    /// Returns the column index of `id`, if present.
    #[must_use]
    pub fn position(&self, id: ComponentId) -> Option<usize> {
        self.ids.binary_search(&id).ok()
    }

    /// Iterates the component ids in column order.
    pub fn iter(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.ids.iter().copied()
    }

    /// Number of components in the layout.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns true if the layout has no components.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

// =============================================================================
// Batch
// =============================================================================

/// Identifies a batch by archetype and position within the archetype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BatchId {
    archetype: u32,
    index: u32,
}

impl BatchId {
    /// Creates a batch id.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn new(archetype: usize, index: usize) -> Self {
        Self {
            archetype: archetype as u32,
            index: index as u32,
        }
    }

    /// Archetype index.
    #[must_use]
    pub const fn archetype(self) -> usize {
        self.archetype as usize
    }

    /// Batch index within the archetype.
    #[must_use]
    pub const fn index(self) -> usize {
        self.index as usize
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.archetype, self.index)
    }
}

/// A contiguous, columnar group of entities sharing one layout.
///
/// Batches handed out by [`World::query`](crate::World::query) are shared
/// snapshots (`Arc<Batch>`): readers see the data as of the query even if the
/// world is mutated afterwards.
pub struct Batch {
    id: BatchId,
    layout: Arc<Layout>,
    entities: Vec<EntityId>,
    /// One column per layout entry, in layout order.
    columns: Vec<Box<dyn Column>>,
}

impl Batch {
    pub(crate) fn new(
        id: BatchId,
        layout: Arc<Layout>,
        prototype: &[Box<dyn ComponentValue>],
    ) -> Self {
        let columns = prototype.iter().map(|value| value.empty_column()).collect();
        Self {
            id,
            layout,
            entities: Vec::new(),
            columns,
        }
    }

    /// Returns this batch's id.
    #[must_use]
    pub const fn id(&self) -> BatchId {
        self.id
    }

    /// Returns the layout shared by every entity in this batch.
    #[must_use]
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Number of entities in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns true if the batch holds no entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entity ids, indexed by local row.
    #[must_use]
    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    /// Returns true if the batch stores component `C`.
    #[must_use]
    pub fn has<C: Component>(&self) -> bool {
        self.layout.contains(ComponentId::of::<C>())
    }

    /// Read-only column of component `C`, indexed by local row.
    #[must_use]
    pub fn column<C: Component>(&self) -> Option<&[C]> {
        let index = self.layout.position(ComponentId::of::<C>())?;
        self.columns[index]
            .as_any()
            .downcast_ref::<Vec<C>>()
            .map(Vec::as_slice)
    }

    pub(crate) fn column_mut<C: Component>(&mut self) -> Option<&mut [C]> {
        let index = self.layout.position(ComponentId::of::<C>())?;
        self.columns[index]
            .as_any_mut()
            .downcast_mut::<Vec<C>>()
            .map(Vec::as_mut_slice)
    }

    /// Appends an entity. `values` must be sorted in layout order.
    pub(crate) fn push(&mut self, entity: EntityId, values: Vec<Box<dyn ComponentValue>>) -> usize {
        debug_assert_eq!(values.len(), self.columns.len());
        for (value, column) in values.into_iter().zip(self.columns.iter_mut()) {
            value.push_into(column.as_mut());
        }
        self.entities.push(entity);
        self.entities.len() - 1
    }

    /// Removes `row`, returning the entity that was moved into its place.
    pub(crate) fn swap_remove(&mut self, row: usize) -> Option<EntityId> {
        for column in &mut self.columns {
            column.swap_remove(row);
        }
        self.entities.swap_remove(row);
        self.entities.get(row).copied()
    }
}

impl Clone for Batch {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            layout: Arc::clone(&self.layout),
            entities: self.entities.clone(),
            columns: self.columns.iter().map(|column| column.clone_box()).collect(),
        }
    }
}

impl fmt::Debug for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Batch")
            .field("id", &self.id)
            .field("len", &self.entities.len())
            .field("layout", &self.layout)
            .finish()
    }
}
