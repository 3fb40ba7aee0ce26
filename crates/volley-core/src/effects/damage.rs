//! Damage effects.

use serde::{Deserialize, Serialize};

use super::{EffectRecord, ResolvedEffect};
use crate::channel::SegmentWriter;
use crate::effect::{Affects, EffectPayload};
use crate::writer::ContextWriter;
use crate::{Batch, EntityId, QueryDesc};

/// Base damage dealt when the owning ability fires.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DamageEffect {
    /// Unscaled amount.
    pub amount: f32,
    /// Who takes it.
    pub affects: Affects,
}

impl DamageEffect {
    /// Damage that lands on the caster's target.
    #[must_use]
    pub const fn on_target(amount: f32) -> Self {
        Self {
            amount,
            affects: Affects::Target,
        }
    }

    /// Damage that lands on the caster.
    #[must_use]
    pub const fn on_caster(amount: f32) -> Self {
        Self {
            amount,
            affects: Affects::Caster,
        }
    }
}

impl EffectPayload for DamageEffect {
    fn affects(&self) -> Affects {
        self.affects
    }
}

/// Offensive stats of a caster.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CasterStats {
    /// Multiplier applied to outgoing damage.
    pub power: f32,
}

impl Default for CasterStats {
    fn default() -> Self {
        Self { power: 1.0 }
    }
}

/// Scales [`DamageEffect`]s by the caster's [`CasterStats::power`].
///
/// Only entities carrying [`CasterStats`] are visited.
#[derive(Debug, Clone, Copy, Default)]
pub struct DamageWriter;

/// The columns [`DamageWriter`] reads from one batch.
#[derive(Debug, Clone, Copy)]
pub struct DamageCache<'b> {
    entities: &'b [EntityId],
    stats: &'b [CasterStats],
}

impl ContextWriter<DamageEffect> for DamageWriter {
    type Enriched = EffectRecord;
    type BatchCache<'b> = DamageCache<'b>;

    fn requirement(&self) -> QueryDesc {
        QueryDesc::new().with::<CasterStats>()
    }

    fn prepare_batch<'b>(&self, batch: &'b Batch) -> Self::BatchCache<'b> {
        DamageCache {
            entities: batch.entities(),
            stats: batch.column::<CasterStats>().unwrap_or(&[]),
        }
    }

    fn write_enriched(
        &self,
        cache: &Self::BatchCache<'_>,
        local_index: usize,
        segment: &mut SegmentWriter<'_, Self::Enriched>,
        payload: &DamageEffect,
        target: EntityId,
    ) {
        let power = cache.stats.get(local_index).map_or(1.0, |s| s.power);
        segment.write(
            local_index,
            EffectRecord {
                source: cache.entities[local_index],
                target,
                effect: ResolvedEffect::Damage {
                    amount: payload.amount * power,
                },
            },
        );
    }
}
