//! Ability slots and targeting components.
//!
//! These components are owned and mutated by ability-management systems
//! outside this crate. The trigger engine only ever reads them.
//!
//! # Example
//!
//! ```
//! use volley_core::ability::{Ability, AbilitySequence, AbilityState};
//!
//! let abilities = AbilitySequence::new(vec![
//!     Ability::new(AbilityState::Cooldown),
//!     Ability::new(AbilityState::Active),
//! ]);
//!
//! let active: Vec<_> = abilities.active_slots().collect();
//! assert_eq!(active, vec![1]);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::EntityId;

/// Lifecycle state of an ability slot.
///
/// Only [`AbilityState::Active`] gates effect emission. Transitions are driven
/// entirely by external systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AbilityState {
    /// Not in use.
    #[default]
    Inactive,
    /// Firing this tick; its effects trigger.
    Active,
    /// Recovering after use.
    Cooldown,
}

impl fmt::Display for AbilityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inactive => write!(f, "Inactive"),
            Self::Active => write!(f, "Active"),
            Self::Cooldown => write!(f, "Cooldown"),
        }
    }
}

/// One ability slot. Its identity is its index in the owning [`AbilitySequence`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Ability {
    /// Current lifecycle state.
    pub state: AbilityState,
}

impl Ability {
    /// Creates an ability in the given state.
    #[must_use]
    pub const fn new(state: AbilityState) -> Self {
        Self { state }
    }

    /// Returns true if the ability is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == AbilityState::Active
    }
}

/// Ordered ability slots of one entity.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AbilitySequence(pub Vec<Ability>);

impl AbilitySequence {
    /// Wraps a list of ability slots.
    #[must_use]
    pub fn new(abilities: Vec<Ability>) -> Self {
        Self(abilities)
    }

    /// Number of slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the entity has no ability slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the slot at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Ability> {
        self.0.get(index)
    }

    /// Iterates indices of active slots in ascending order.
    pub fn active_slots(&self) -> impl Iterator<Item = usize> + '_ {
        self.0
            .iter()
            .enumerate()
            .filter(|(_, ability)| ability.is_active())
            .map(|(index, _)| index)
    }
}

/// The entity this entity currently targets, if any.
///
/// A lookup reference only: the targeted entity may since have been despawned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Target(pub Option<EntityId>);

impl Target {
    /// Targets `entity`.
    #[must_use]
    pub const fn entity(entity: EntityId) -> Self {
        Self(Some(entity))
    }

    /// No target.
    #[must_use]
    pub const fn none() -> Self {
        Self(None)
    }

    /// Returns the targeted entity.
    #[must_use]
    pub const fn get(&self) -> Option<EntityId> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_is_inactive() {
        assert_eq!(Ability::default().state, AbilityState::Inactive);
        assert!(!Ability::default().is_active());
    }

    #[test]
    fn active_slots_skip_other_states() {
        let abilities = AbilitySequence::new(vec![
            Ability::new(AbilityState::Active),
            Ability::new(AbilityState::Inactive),
            Ability::new(AbilityState::Cooldown),
            Ability::new(AbilityState::Active),
        ]);
        assert_eq!(abilities.active_slots().collect::<Vec<_>>(), vec![0, 3]);
    }

    #[test]
    fn display_format() {
        assert_eq!(format!("{}", AbilityState::Active), "Active");
        assert_eq!(format!("{}", AbilityState::Cooldown), "Cooldown");
    }

    #[test]
    fn target_accessors() {
        assert_eq!(Target::entity(EntityId::new(4)).get(), Some(EntityId::new(4)));
        assert_eq!(Target::none().get(), None);
    }

    #[test]
    fn sequence_serializes() {
        let abilities = AbilitySequence::new(vec![Ability::new(AbilityState::Cooldown)]);
        let json = serde_json::to_string(&abilities).unwrap();
        let back: AbilitySequence = serde_json::from_str(&json).unwrap();
        assert_eq!(abilities, back);
    }
}
