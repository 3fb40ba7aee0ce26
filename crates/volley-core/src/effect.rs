//! Effect payloads and the per-entity effect sequence.
//!
//! An effect category is any type implementing [`EffectPayload`]. Each entity
//! carries one [`EffectSequence<T>`] per category, pairing payloads with the
//! ability slot that triggers them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Who an effect lands on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Affects {
    /// The triggering entity itself.
    #[default]
    Caster,
    /// The entity referenced by the triggering entity's [`Target`](crate::ability::Target).
    Target,
}

impl fmt::Display for Affects {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Caster => write!(f, "Caster"),
            Self::Target => write!(f, "Target"),
        }
    }
}

/// A payload type for one effect category.
///
/// The engine never inspects payloads beyond [`EffectPayload::affects`].
pub trait EffectPayload: Clone + Send + Sync + 'static {
    /// Targeting policy of this payload.
    fn affects(&self) -> Affects;
}

/// An effect tied to an ability slot by index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectEntry<T> {
    /// Index into the entity's [`AbilitySequence`](crate::ability::AbilitySequence).
    pub ability_index: usize,
    /// Category-specific data.
    pub payload: T,
}

impl<T> EffectEntry<T> {
    /// Creates an entry.
    #[must_use]
    pub const fn new(ability_index: usize, payload: T) -> Self {
        Self {
            ability_index,
            payload,
        }
    }
}

/// Ordered effect entries of one category on one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectSequence<T>(pub Vec<EffectEntry<T>>);

impl<T> EffectSequence<T> {
    /// Wraps a list of entries.
    #[must_use]
    pub fn new(entries: Vec<EffectEntry<T>>) -> Self {
        Self(entries)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates entries tied to ability slot `slot`, in sequence order.
    pub fn for_slot(&self, slot: usize) -> impl Iterator<Item = &EffectEntry<T>> + '_ {
        self.0.iter().filter(move |entry| entry.ability_index == slot)
    }
}

impl<T> Default for EffectSequence<T> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<T> FromIterator<EffectEntry<T>> for EffectSequence<T> {
    fn from_iter<I: IntoIterator<Item = EffectEntry<T>>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
