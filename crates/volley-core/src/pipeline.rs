//! Effect pipelines: one consumer and the trigger passes that feed it.
//!
//! An [`EffectPipeline`] is the unit the [`Simulation`](crate::simulation::Simulation)
//! schedules. Each tick runs in two phases:
//!
//! 1. [`Stage::schedule`]: every pass does its handshake with the consumer and
//!    launches its job. Nothing blocks here.
//! 2. [`Stage::complete`]: the consumer joins its producers and applies the
//!    records to the world.
//!
//! The simulation runs phase 1 for all stages before phase 2 for any stage, so
//! jobs from different pipelines overlap.

use std::fmt;
use std::marker::PhantomData;

use crate::consumer::{ConsumeReport, EffectConsumer};
use crate::effect::EffectPayload;
use crate::error::DispatchResult;
use crate::pass::{ScheduleOutcome, TickContext, Trigger, TriggerPass};
use crate::writer::ContextWriter;
use crate::World;

/// A schedulable two-phase unit of per-tick work.
pub trait Stage: Send {
    /// Name for logs and reports.
    fn name(&self) -> &str;

    /// Launches this stage's jobs against the current world snapshot.
    fn schedule(&mut self, ctx: &TickContext, world: &World);

    /// Waits for this stage's jobs and applies their output.
    ///
    /// # Errors
    ///
    /// Propagates the consumer's error.
    fn complete(&mut self, ctx: &TickContext, world: &mut World) -> DispatchResult<ConsumeReport>;
}

/// A consumer plus the trigger passes that produce records of type `E` for it.
pub struct EffectPipeline<E, C> {
    name: String,
    consumer: C,
    passes: Vec<Box<dyn Trigger<C>>>,
    last_outcomes: Vec<ScheduleOutcome>,
    _record: PhantomData<fn() -> E>,
}

impl<E, C> EffectPipeline<E, C>
where
    E: Send + 'static,
    C: EffectConsumer<E> + 'static,
{
    /// Creates a pipeline with no passes.
    pub fn new(name: impl Into<String>, consumer: C) -> Self {
        Self {
            name: name.into(),
            consumer,
            passes: Vec::new(),
            last_outcomes: Vec::new(),
            _record: PhantomData,
        }
    }

    /// Adds a trigger pass whose writer produces `E`.
    pub fn add_pass<T, W>(&mut self, pass: TriggerPass<T, W>)
    where
        T: EffectPayload,
        W: ContextWriter<T, Enriched = E>,
    {
        self.passes.push(Box::new(pass));
    }

    /// Builder form of [`EffectPipeline::add_pass`].
    #[must_use]
    pub fn with_pass<T, W>(mut self, pass: TriggerPass<T, W>) -> Self
    where
        T: EffectPayload,
        W: ContextWriter<T, Enriched = E>,
    {
        self.add_pass(pass);
        self
    }

    /// Number of registered passes.
    #[must_use]
    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    /// The consumer.
    #[must_use]
    pub fn consumer(&self) -> &C {
        &self.consumer
    }

    /// The consumer, mutably.
    pub fn consumer_mut(&mut self) -> &mut C {
        &mut self.consumer
    }

    /// What each pass did in the most recent schedule phase, in pass order.
    #[must_use]
    pub fn last_outcomes(&self) -> &[ScheduleOutcome] {
        &self.last_outcomes
    }
}

impl<E, C> Stage for EffectPipeline<E, C>
where
    E: Send + 'static,
    C: EffectConsumer<E> + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn schedule(&mut self, ctx: &TickContext, world: &World) {
        let _span = tracing::debug_span!("schedule", stage = %self.name, tick = ctx.tick).entered();
        self.last_outcomes.clear();
        for pass in &self.passes {
            let outcome = pass.schedule(ctx, world, &mut self.consumer);
            self.last_outcomes.push(outcome);
        }
    }

    fn complete(&mut self, ctx: &TickContext, world: &mut World) -> DispatchResult<ConsumeReport> {
        let _span = tracing::debug_span!("complete", stage = %self.name, tick = ctx.tick).entered();
        self.consumer.consume(world)
    }
}

impl<E, C: fmt::Debug> fmt::Debug for EffectPipeline<E, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let passes: Vec<_> = self.passes.iter().map(|pass| pass.id().as_str()).collect();
        f.debug_struct("EffectPipeline")
            .field("name", &self.name)
            .field("consumer", &self.consumer)
            .field("passes", &passes)
            .finish()
    }
}
