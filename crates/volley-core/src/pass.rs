//! Trigger passes: one effect category's instance of the dispatch engine.
//!
//! A [`TriggerPass`] owns the composed query and the context writer for one
//! effect category, and runs the per-tick handshake with its consumer:
//!
//! 1. Ask the consumer whether it will do any work (`should_run`). If not,
//!    stop: no query, no channel, no job.
//! 2. Evaluate the query and ask the consumer for a channel with one segment
//!    per batch.
//! 3. Schedule the [`TriggerJob`] over the batches.
//! 4. Hand the job's completion handle to the consumer, which joins all its
//!    producers before reading.
//!
//! # Example
//!
//! ```
//! use volley_core::ability::{Ability, AbilitySequence, AbilityState, Target};
//! use volley_core::consumer::{CollectingConsumer, EffectConsumer};
//! use volley_core::effect::{Affects, EffectEntry, EffectPayload, EffectSequence};
//! use volley_core::pass::{ScheduleOutcome, TickContext, TriggerPass};
//! use volley_core::writer::IdentityWriter;
//! use volley_core::World;
//!
//! #[derive(Debug, Clone)]
//! struct Shout;
//! impl EffectPayload for Shout {
//!     fn affects(&self) -> Affects { Affects::Caster }
//! }
//!
//! let mut world = World::default();
//! world
//!     .spawn()
//!     .with(AbilitySequence::new(vec![Ability::new(AbilityState::Active)]))
//!     .with(Target::none())
//!     .with(EffectSequence::new(vec![EffectEntry::new(0, Shout)]))
//!     .build();
//!
//! let pass = TriggerPass::<Shout, _>::new("shout", IdentityWriter);
//! let mut consumer = CollectingConsumer::new();
//!
//! let outcome = pass.schedule(&TickContext::default(), &world, &mut consumer);
//! assert_eq!(outcome, ScheduleOutcome::Scheduled { batches: 1 });
//!
//! let report = consumer.consume(&mut world).unwrap();
//! assert_eq!(report.records, 1);
//! ```

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Add, AddAssign};
use std::sync::Arc;

use crate::consumer::EffectConsumer;
use crate::effect::EffectPayload;
use crate::job::{ExecutionMode, TriggerJob};
use crate::query::compose;
use crate::writer::ContextWriter;
use crate::{QueryDesc, World};

// =============================================================================
// Identification
// =============================================================================

/// Name of a trigger pass, used in logs and errors.
///
/// # Example
///
/// ```
/// use volley_core::pass::PassId;
///
/// const DAMAGE: PassId = PassId::from_static("damage");
/// assert_eq!(DAMAGE, PassId::new("damage"));
/// assert_eq!(DAMAGE.to_string(), "damage");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PassId(Cow<'static, str>);

impl PassId {
    /// Creates a pass id from any string.
    #[must_use]
    pub fn new(id: &str) -> Self {
        Self(Cow::Owned(id.to_string()))
    }

    /// Creates a pass id from a static string, usable in constants.
    #[must_use]
    pub const fn from_static(id: &'static str) -> Self {
        Self(Cow::Borrowed(id))
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PassId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for PassId {
    fn from(s: String) -> Self {
        Self(Cow::Owned(s))
    }
}

// =============================================================================
// Statistics and Context
// =============================================================================

/// Counters from one run of a trigger job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassStats {
    /// Batches visited.
    pub batches: usize,
    /// Entities visited.
    pub entities: usize,
    /// Records written.
    pub emitted: usize,
    /// Effect entries whose ability index is past the end of the ability sequence.
    pub stale_entries: usize,
    /// Target-policy effects skipped because the entity had no target.
    pub untargeted: usize,
}

impl Add for PassStats {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            batches: self.batches + rhs.batches,
            entities: self.entities + rhs.entities,
            emitted: self.emitted + rhs.emitted,
            stale_entries: self.stale_entries + rhs.stale_entries,
            untargeted: self.untargeted + rhs.untargeted,
        }
    }
}

impl AddAssign for PassStats {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

/// Per-tick information passed to every pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickContext {
    /// The current simulation tick.
    pub tick: u64,
    /// How trigger jobs are executed this tick.
    pub mode: ExecutionMode,
}

/// What [`TriggerPass::schedule`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// The consumer had no work; nothing was allocated or scheduled.
    Skipped,
    /// A job was scheduled over this many batches.
    Scheduled {
        /// Number of batches (and channel segments).
        batches: usize,
    },
}

// =============================================================================
// Trigger Pass
// =============================================================================

/// Orchestrates the trigger job for effect category `T`.
pub struct TriggerPass<T, W> {
    id: PassId,
    query: QueryDesc,
    writer: Arc<W>,
    _payload: PhantomData<fn() -> T>,
}

impl<T, W> TriggerPass<T, W>
where
    T: EffectPayload,
    W: ContextWriter<T>,
{
    /// Creates a pass. The query is composed once, here.
    pub fn new(id: impl Into<PassId>, writer: W) -> Self {
        let query = compose::<T>(&writer.requirement());
        Self {
            id: id.into(),
            query,
            writer: Arc::new(writer),
            _payload: PhantomData,
        }
    }

    /// The pass's name.
    #[must_use]
    pub fn id(&self) -> &PassId {
        &self.id
    }

    /// The composed selection predicate.
    #[must_use]
    pub fn query(&self) -> &QueryDesc {
        &self.query
    }

    /// The pass's context writer.
    #[must_use]
    pub fn writer(&self) -> &W {
        &self.writer
    }

    /// Runs the consumer handshake and, if the consumer wants work, schedules the job.
    ///
    /// The consumer is asked `should_run` first. If it declines, the world is
    /// not queried and no channel is allocated. Otherwise the consumer
    /// allocates one segment per matching batch and receives the job's handle.
    ///
    /// # Arguments
    ///
    /// * `ctx` - Tick number and execution mode for the job
    /// * `world` - The world to snapshot; the job reads its batches as they are now
    /// * `consumer` - The consumer that owns the channel and joins the job
    ///
    /// # Returns
    ///
    /// [`ScheduleOutcome::Skipped`] if the consumer was idle, otherwise the
    /// number of batches scheduled.
    pub fn schedule<C>(&self, ctx: &TickContext, world: &World, consumer: &mut C) -> ScheduleOutcome
    where
        C: EffectConsumer<W::Enriched> + ?Sized,
    {
        if !consumer.should_run(world) {
            tracing::debug!(
                pass = %self.id,
                tick = ctx.tick,
                "consumer idle, skipping trigger pass"
            );
            return ScheduleOutcome::Skipped;
        }

        let batches = world.query(&self.query);
        let batch_count = batches.len();
        let channel = consumer.allocate_channel(batch_count);

        let handle = TriggerJob::<T, W>::new(batches, Arc::clone(&self.writer)).schedule(
            self.id.clone(),
            channel,
            ctx.mode,
        );
        consumer.register_completion(handle);

        tracing::debug!(
            pass = %self.id,
            tick = ctx.tick,
            batches = batch_count,
            "scheduled trigger pass"
        );
        ScheduleOutcome::Scheduled {
            batches: batch_count,
        }
    }
}

impl<T, W> fmt::Debug for TriggerPass<T, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TriggerPass")
            .field("id", &self.id)
            .field("query", &self.query)
            .finish_non_exhaustive()
    }
}

/// Object-safe view of a trigger pass feeding consumer `C`.
///
/// Lets passes for different payload types share one consumer.
pub trait Trigger<C: ?Sized>: Send {
    /// The pass's name.
    fn id(&self) -> &PassId;

    /// See [`TriggerPass::schedule`].
    fn schedule(&self, ctx: &TickContext, world: &World, consumer: &mut C) -> ScheduleOutcome;
}

impl<T, W, C> Trigger<C> for TriggerPass<T, W>
where
    T: EffectPayload,
    W: ContextWriter<T>,
    C: EffectConsumer<W::Enriched> + ?Sized,
{
    fn id(&self) -> &PassId {
        &self.id
    }

    fn schedule(&self, ctx: &TickContext, world: &World, consumer: &mut C) -> ScheduleOutcome {
        TriggerPass::schedule(self, ctx, world, consumer)
    }
}
