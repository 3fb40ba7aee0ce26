//! Component identity and columnar storage.
//!
//! Any `Clone + Send + Sync + 'static` type is a [`Component`]. Components are
//! identified at runtime by [`ComponentId`], and stored in type-erased columns
//! (one `Vec<C>` per component per batch) that the [`Batch`](crate::Batch)
//! downcasts on access.

use std::any::{Any, TypeId};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Marker trait for data that can be attached to entities.
///
/// Blanket-implemented for every `Clone + Send + Sync + 'static` type.
pub trait Component: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Component for T {}

/// Runtime identifier for a component type.
///
/// Equality, ordering and hashing use the underlying [`TypeId`] only; the
/// type name is kept for diagnostics.
///
/// # Example
///
/// ```
/// use volley_store::ComponentId;
///
/// #[derive(Clone)]
/// struct Health(f32);
///
/// let id = ComponentId::of::<Health>();
/// assert_eq!(id, ComponentId::of::<Health>());
/// assert!(id.name().ends_with("Health"));
/// ```
#[derive(Clone, Copy)]
pub struct ComponentId {
    type_id: TypeId,
    name: &'static str,
}

impl ComponentId {
    /// Returns the identifier of component type `C`.
    #[must_use]
    pub fn of<C: Component>() -> Self {
        Self {
            type_id: TypeId::of::<C>(),
            name: std::any::type_name::<C>(),
        }
    }

    /// Returns the full type name of the component.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for ComponentId {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for ComponentId {}

impl PartialOrd for ComponentId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ComponentId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.type_id.cmp(&other.type_id)
    }
}

impl Hash for ComponentId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentId({})", self.name)
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

// =============================================================================
// Marker Components
// =============================================================================

/// Marks an entity as disabled.
///
/// Queries skip disabled entities unless they set
/// [`QueryOptions::INCLUDE_DISABLED`](crate::QueryOptions::INCLUDE_DISABLED).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Disabled;

/// Marks an entity as a prefab (a template that is never simulated).
///
/// Queries skip prefabs unless they set
/// [`QueryOptions::INCLUDE_PREFAB`](crate::QueryOptions::INCLUDE_PREFAB).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Prefab;

// =============================================================================
// Type-erased Columns
// =============================================================================

/// A type-erased `Vec<C>` column.
pub(crate) trait Column: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn clone_box(&self) -> Box<dyn Column>;
    fn swap_remove(&mut self, row: usize);
    fn len(&self) -> usize;
}

impl<C: Component> Column for Vec<C> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn clone_box(&self) -> Box<dyn Column> {
        Box::new(self.clone())
    }

    fn swap_remove(&mut self, row: usize) {
        Vec::swap_remove(self, row);
    }

    fn len(&self) -> usize {
        Vec::len(self)
    }
}

/// A single boxed component value on its way into a column.
pub(crate) trait ComponentValue: Send {
    fn id(&self) -> ComponentId;
    fn empty_column(&self) -> Box<dyn Column>;
    fn push_into(self: Box<Self>, column: &mut dyn Column);
}

impl<C: Component> ComponentValue for C {
    fn id(&self) -> ComponentId {
        ComponentId::of::<C>()
    }

    fn empty_column(&self) -> Box<dyn Column> {
        Box::new(Vec::<C>::new())
    }

    fn push_into(self: Box<Self>, column: &mut dyn Column) {
        let values = column.as_any_mut().downcast_mut::<Vec<C>>();
        debug_assert!(values.is_some(), "column type mismatch for {}", std::any::type_name::<C>());
        if let Some(values) = values {
            values.push(*self);
        }
    }
}
