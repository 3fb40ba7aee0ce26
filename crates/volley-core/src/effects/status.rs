//! Status effects.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::{EffectRecord, ResolvedEffect, StatusId};
use crate::channel::SegmentWriter;
use crate::effect::{Affects, EffectPayload};
use crate::writer::ContextWriter;
use crate::{Batch, EntityId, QueryDesc};

/// A timed status applied when the owning ability fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEffect {
    /// Which status.
    pub status: StatusId,
    /// How many ticks it lasts.
    pub duration_ticks: u32,
    /// Who receives it.
    pub affects: Affects,
}

impl EffectPayload for StatusEffect {
    fn affects(&self) -> Affects {
        self.affects
    }
}

/// World-space position of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position(pub Vec2);

/// Stamps [`StatusEffect`]s with the caster's [`Position`] as their origin.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusWriter;

impl ContextWriter<StatusEffect> for StatusWriter {
    type Enriched = EffectRecord;
    type BatchCache<'b> = (&'b [EntityId], &'b [Position]);

    fn requirement(&self) -> QueryDesc {
        QueryDesc::new().with::<Position>()
    }

    fn prepare_batch<'b>(&self, batch: &'b Batch) -> Self::BatchCache<'b> {
        (batch.entities(), batch.column::<Position>().unwrap_or(&[]))
    }

    fn write_enriched(
        &self,
        cache: &Self::BatchCache<'_>,
        local_index: usize,
        segment: &mut SegmentWriter<'_, Self::Enriched>,
        payload: &StatusEffect,
        target: EntityId,
    ) {
        let (entities, positions) = *cache;
        let origin = positions.get(local_index).map_or(Vec2::ZERO, |p| p.0);
        segment.write(
            local_index,
            EffectRecord {
                source: entities[local_index],
                target,
                effect: ResolvedEffect::Status {
                    status: payload.status,
                    duration_ticks: payload.duration_ticks,
                    origin,
                },
            },
        );
    }
}
