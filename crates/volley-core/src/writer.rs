//! Context writers: the per-category extension point of the engine.
//!
//! A [`ContextWriter`] turns a raw effect payload and its resolved target into
//! the enriched record a consumer reads. It is the only place where an effect
//! category's concrete types appear; the query composer, trigger job and pass
//! are generic over it.
//!
//! # Thread Safety
//!
//! One writer instance is shared by every batch of a job, and batches run in
//! parallel, so writers are `Send + Sync` and take `&self`. Batch-scoped setup
//! goes into the value returned by [`ContextWriter::prepare_batch`], which lives
//! only as long as that batch's iteration.
//!
//! # Example
//!
//! ```
//! use volley_core::channel::SegmentWriter;
//! use volley_core::effect::{Affects, EffectPayload};
//! use volley_core::writer::ContextWriter;
//! use volley_core::{Batch, EntityId, QueryDesc};
//!
//! #[derive(Clone)]
//! struct Heal { amount: f32 }
//!
//! impl EffectPayload for Heal {
//!     fn affects(&self) -> Affects { Affects::Caster }
//! }
//!
//! #[derive(Clone)]
//! struct Wisdom(f32);
//!
//! struct HealWriter;
//!
//! impl ContextWriter<Heal> for HealWriter {
//!     type Enriched = (EntityId, f32);
//!     type BatchCache<'b> = &'b [Wisdom];
//!
//!     fn requirement(&self) -> QueryDesc {
//!         QueryDesc::new().with::<Wisdom>()
//!     }
//!
//!     fn prepare_batch<'b>(&self, batch: &'b Batch) -> Self::BatchCache<'b> {
//!         batch.column::<Wisdom>().unwrap_or(&[])
//!     }
//!
//!     fn write_enriched(
//!         &self,
//!         cache: &Self::BatchCache<'_>,
//!         local_index: usize,
//!         segment: &mut SegmentWriter<'_, Self::Enriched>,
//!         payload: &Heal,
//!         target: EntityId,
//!     ) {
//!         let scale = cache.get(local_index).map_or(1.0, |w| w.0);
//!         segment.write(local_index, (target, payload.amount * scale));
//!     }
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::channel::SegmentWriter;
use crate::effect::EffectPayload;
use crate::{Batch, EntityId, QueryDesc};

/// Converts triggered effects of category `T` into enriched records.
pub trait ContextWriter<T: EffectPayload>: Send + Sync + 'static {
    /// The record type appended to the channel.
    type Enriched: Send + 'static;

    /// Batch-scoped state produced by [`ContextWriter::prepare_batch`].
    type BatchCache<'b>;

    /// Extra components this writer needs on every visited entity.
    ///
    /// Merged into the trigger query, so `prepare_batch` can rely on the
    /// columns being present.
    fn requirement(&self) -> QueryDesc {
        QueryDesc::new()
    }

    /// Called once per batch before its entities are iterated.
    fn prepare_batch<'b>(&self, batch: &'b Batch) -> Self::BatchCache<'b>;

    /// Called once per triggered effect entry.
    ///
    /// Must append exactly one record to `segment` at `local_index`.
    ///
    /// # Arguments
    ///
    /// * `cache` - The value `prepare_batch` returned for this batch
    /// * `local_index` - Row of the triggering entity within the batch
    /// * `segment` - The batch's open segment
    /// * `payload` - The triggered effect entry's payload
    /// * `target` - The resolved target: the caster itself or its `Target`
    fn write_enriched(
        &self,
        cache: &Self::BatchCache<'_>,
        local_index: usize,
        segment: &mut SegmentWriter<'_, Self::Enriched>,
        payload: &T,
        target: EntityId,
    );
}

// =============================================================================
// Identity Writer
// =============================================================================

/// An effect tagged with who triggered it and who it lands on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Triggered<T> {
    /// The entity whose ability fired.
    pub source: EntityId,
    /// The resolved target.
    pub target: EntityId,
    /// The raw payload.
    pub payload: T,
}

/// A writer that adds only source and target identity.
///
/// Useful for categories whose consumers need no caster context.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityWriter;

impl<T: EffectPayload> ContextWriter<T> for IdentityWriter {
    type Enriched = Triggered<T>;
    type BatchCache<'b> = &'b [EntityId];

    fn prepare_batch<'b>(&self, batch: &'b Batch) -> Self::BatchCache<'b> {
        batch.entities()
    }

    fn write_enriched(
        &self,
        cache: &Self::BatchCache<'_>,
        local_index: usize,
        segment: &mut SegmentWriter<'_, Self::Enriched>,
        payload: &T,
        target: EntityId,
    ) {
        segment.write(
            local_index,
            Triggered {
                source: cache[local_index],
                target,
                payload: payload.clone(),
            },
        );
    }
}
