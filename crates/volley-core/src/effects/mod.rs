//! Stock effect categories and the consumer that applies them.
//!
//! - [`damage`]: [`DamageEffect`] scaled by the caster's [`CasterStats`]
//! - [`status`]: [`StatusEffect`] stamped with the caster's [`Position`]
//! - [`combat`]: [`CombatConsumer`], which applies both to [`Health`] and
//!   [`ActiveStatuses`]
//!
//! Both writers produce [`EffectRecord`]s, so the two trigger passes can feed
//! one consumer.

pub mod combat;
pub mod damage;
pub mod status;

use glam::Vec2;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::EntityId;

pub use combat::{ActiveStatuses, AppliedStatus, CombatConsumer, CombatStats, Health};
pub use damage::{CasterStats, DamageEffect, DamageWriter};
pub use status::{Position, StatusEffect, StatusWriter};

/// Identifier of a status kind (stun, burn, haste, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StatusId(pub u32);

impl fmt::Display for StatusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Status({})", self.0)
    }
}

/// An effect after context enrichment, ready to apply.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ResolvedEffect {
    /// Hit points to remove.
    Damage {
        /// Final amount after caster scaling.
        amount: f32,
    },
    /// A timed status.
    Status {
        /// Which status.
        status: StatusId,
        /// How long it lasts.
        duration_ticks: u32,
        /// Where the caster stood when it fired.
        origin: Vec2,
    },
}

/// The enriched record both stock writers emit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EffectRecord {
    /// The entity whose ability fired.
    pub source: EntityId,
    /// The entity the effect lands on.
    pub target: EntityId,
    /// What happens to the target.
    pub effect: ResolvedEffect,
}
