//! Declarative entity selection.
//!
//! A [`QueryDesc`] describes which archetypes a system visits:
//!
//! - `all`: every listed component must be present
//! - `any`: at least one listed component must be present (ignored when empty)
//! - `none`: no listed component may be present
//! - `options`: [`QueryOptions`] flags that widen the default selection
//!
//! Descriptions are plain data. [`QueryDesc::merge`] combines two of them by
//! list concatenation, which is how a fixed base requirement and a
//! caller-specific requirement become one predicate.
//!
//! # Example
//!
//! ```
//! use volley_store::{QueryDesc, QueryOptions};
//!
//! #[derive(Clone)]
//! struct Health(f32);
//! #[derive(Clone)]
//! struct Frozen;
//!
//! let base = QueryDesc::new().with::<Health>();
//! let custom = QueryDesc::new()
//!     .without::<Frozen>()
//!     .options(QueryOptions::INCLUDE_DISABLED);
//!
//! let merged = base.merge(&custom);
//! assert_eq!(merged.all.len(), 1);
//! assert_eq!(merged.none.len(), 1);
//! assert!(merged.options.contains(QueryOptions::INCLUDE_DISABLED));
//! ```

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::batch::Layout;
use crate::component::{Component, ComponentId, Disabled, Prefab};

bitflags! {
    /// Flags that widen a query beyond its default selection.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct QueryOptions: u8 {
        /// Also match entities carrying the [`Disabled`] marker.
        const INCLUDE_DISABLED = 0b0000_0001;
        /// Also match entities carrying the [`Prefab`] marker.
        const INCLUDE_PREFAB = 0b0000_0010;
    }
}

/// A selection predicate over entity layouts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryDesc {
    /// Components that must all be present.
    pub all: Vec<ComponentId>,
    /// Components of which at least one must be present.
    pub any: Vec<ComponentId>,
    /// Components that must be absent.
    pub none: Vec<ComponentId>,
    /// Matching options.
    pub options: QueryOptions,
}

impl QueryDesc {
    /// Creates an empty description that matches every enabled, non-prefab entity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires component `C`.
    #[must_use]
    pub fn with<C: Component>(mut self) -> Self {
        self.all.push(ComponentId::of::<C>());
        self
    }

    /// Adds `C` to the any-of set.
    #[must_use]
    pub fn any_of<C: Component>(mut self) -> Self {
        self.any.push(ComponentId::of::<C>());
        self
    }

    /// Excludes entities carrying component `C`.
    #[must_use]
    pub fn without<C: Component>(mut self) -> Self {
        self.none.push(ComponentId::of::<C>());
        self
    }

    /// Adds matching options.
    #[must_use]
    pub fn options(mut self, options: QueryOptions) -> Self {
        self.options |= options;
        self
    }

    /// Combines two descriptions into one.
    ///
    /// Each list is `self`'s entries followed by `other`'s. Duplicates are kept;
    /// they do not change which layouts match. Options are unioned.
    #[must_use]
    pub fn merge(&self, other: &QueryDesc) -> QueryDesc {
        QueryDesc {
            all: self.all.iter().chain(&other.all).copied().collect(),
            any: self.any.iter().chain(&other.any).copied().collect(),
            none: self.none.iter().chain(&other.none).copied().collect(),
            options: self.options | other.options,
        }
    }

    /// Returns true if an archetype with `layout` is selected.
    #[must_use]
    pub fn matches(&self, layout: &Layout) -> bool {
        if !self.options.contains(QueryOptions::INCLUDE_DISABLED)
            && layout.contains(ComponentId::of::<Disabled>())
        {
            return false;
        }
        if !self.options.contains(QueryOptions::INCLUDE_PREFAB)
            && layout.contains(ComponentId::of::<Prefab>())
        {
            return false;
        }

        self.all.iter().all(|id| layout.contains(*id))
            && (self.any.is_empty() || self.any.iter().any(|id| layout.contains(*id)))
            && !self.none.iter().any(|id| layout.contains(*id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone)]
    struct A;
    #[derive(Clone)]
    struct B;
    #[derive(Clone)]
    struct C;

    fn layout(ids: &[ComponentId]) -> Layout {
        Layout::from_ids(ids.iter().copied())
    }

    #[test]
    fn all_requires_every_component() {
        let query = QueryDesc::new().with::<A>().with::<B>();
        assert!(query.matches(&layout(&[ComponentId::of::<A>(), ComponentId::of::<B>()])));
        assert!(!query.matches(&layout(&[ComponentId::of::<A>()])));
    }

    #[test]
    fn any_requires_one_when_present() {
        let query = QueryDesc::new().any_of::<A>().any_of::<B>();
        assert!(query.matches(&layout(&[ComponentId::of::<B>()])));
        assert!(!query.matches(&layout(&[ComponentId::of::<C>()])));
        assert!(QueryDesc::new().matches(&layout(&[ComponentId::of::<C>()])));
    }

    #[test]
    fn none_excludes() {
        let query = QueryDesc::new().with::<A>().without::<C>();
        assert!(!query.matches(&layout(&[ComponentId::of::<A>(), ComponentId::of::<C>()])));
    }

    #[test]
    fn markers_need_options() {
        let disabled = layout(&[ComponentId::of::<A>(), ComponentId::of::<Disabled>()]);
        let prefab = layout(&[ComponentId::of::<A>(), ComponentId::of::<Prefab>()]);
        let query = QueryDesc::new().with::<A>();

        assert!(!query.matches(&disabled));
        assert!(!query.matches(&prefab));
        assert!(query.clone().options(QueryOptions::INCLUDE_DISABLED).matches(&disabled));
        assert!(query.options(QueryOptions::INCLUDE_PREFAB).matches(&prefab));
    }

    #[test]
    fn merge_concatenates_without_dedup() {
        let base = QueryDesc::new().with::<A>().with::<B>();
        let custom = QueryDesc::new().with::<A>().any_of::<C>().without::<B>();
        let merged = base.merge(&custom);

        assert_eq!(
            merged.all,
            vec![ComponentId::of::<A>(), ComponentId::of::<B>(), ComponentId::of::<A>()]
        );
        assert_eq!(merged.any, vec![ComponentId::of::<C>()]);
        assert_eq!(merged.none, vec![ComponentId::of::<B>()]);
    }

    #[test]
    fn options_roundtrip_through_serde() {
        let options = QueryOptions::INCLUDE_DISABLED | QueryOptions::INCLUDE_PREFAB;
        let json = serde_json::to_string(&options).unwrap();
        let back: QueryOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(options, back);
    }
}
