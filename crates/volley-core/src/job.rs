//! The partition-parallel trigger job.
//!
//! A [`TriggerJob`] walks every batch selected by a trigger pass and, for each
//! entity, emits one enriched record per effect entry whose ability slot is
//! active. Batches are distributed across the rayon pool; each batch owns
//! exactly one channel segment, so no two workers ever touch the same buffer.
//!
//! # Per-batch algorithm
//!
//! 1. The writer prepares its batch cache.
//! 2. The batch's segment is opened.
//! 3. For each entity row `i`, for each active ability slot `a`, for each effect
//!    entry tied to `a`: resolve the target and let the writer append one record
//!    at local index `i`.
//! 4. The segment is closed, whether or not anything was written.
//!
//! Within a batch, records appear in (entity, ability slot, effect entry) order.
//! Across batches no order is defined.
//!
//! # Completion
//!
//! [`TriggerJob::schedule`] returns a [`JobHandle`]. The handle is the only way
//! to get the filled channel back, so a consumer cannot read before the job has
//! finished: waiting on the handle is the happens-before edge.

use std::fmt;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::ability::{AbilitySequence, Target};
use crate::channel::{EffectChannel, Segment};
use crate::effect::{Affects, EffectPayload, EffectSequence};
use crate::error::{ChannelError, DispatchError, DispatchResult};
use crate::pass::{PassId, PassStats};
use crate::writer::ContextWriter;
use crate::Batch;

/// Where a scheduled trigger job executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ExecutionMode {
    /// Spawned onto the rayon pool; the handle completes asynchronously.
    #[default]
    Background,
    /// Run on the calling thread (batches still fan out over rayon); the
    /// handle is already complete when returned.
    Blocking,
}

// =============================================================================
// Trigger Job
// =============================================================================

/// One trigger pass's work for one tick.
pub struct TriggerJob<T, W> {
    batches: Vec<Arc<Batch>>,
    writer: Arc<W>,
    _payload: PhantomData<fn() -> T>,
}

impl<T, W> TriggerJob<T, W>
where
    T: EffectPayload,
    W: ContextWriter<T>,
{
    /// Creates a job over `batches`.
    #[must_use]
    pub fn new(batches: Vec<Arc<Batch>>, writer: Arc<W>) -> Self {
        Self {
            batches,
            writer,
            _payload: PhantomData,
        }
    }

    /// Number of batches, which is also the number of channel segments the job needs.
    #[must_use]
    pub fn batch_count(&self) -> usize {
        self.batches.len()
    }

    /// Runs every batch in parallel, writing into `channel`.
    ///
    /// Segment `k` receives the output of batch `k`.
    ///
    /// # Errors
    ///
    /// - [`ChannelError::SegmentCountMismatch`] if the channel does not have
    ///   exactly one segment per batch; nothing is written
    /// - [`ChannelError::SegmentReopened`] if a segment was already used
    pub fn run(&self, channel: &mut EffectChannel<W::Enriched>) -> Result<PassStats, ChannelError> {
        if channel.segment_count() != self.batches.len() {
            return Err(ChannelError::SegmentCountMismatch {
                segments: channel.segment_count(),
                batches: self.batches.len(),
            });
        }
        let writer = &*self.writer;

        channel
            .segments_mut()
            .par_iter_mut()
            .zip(self.batches.par_iter())
            .map(|(segment, batch)| run_batch::<T, W>(writer, batch, segment))
            .try_reduce(PassStats::default, |a, b| Ok(a + b))
    }

    /// Starts the job and returns its completion handle.
    ///
    /// A panic inside the job is caught and surfaces as
    /// [`DispatchError::JobAborted`] when the handle is waited on.
    ///
    /// # Arguments
    ///
    /// * `pass` - Name reported by the handle and in errors
    /// * `channel` - Output channel; must have one segment per batch
    /// * `mode` - Spawn onto the rayon pool, or run before returning
    pub fn schedule(
        self,
        pass: PassId,
        mut channel: EffectChannel<W::Enriched>,
        mode: ExecutionMode,
    ) -> JobHandle<W::Enriched> {
        let execute = move || {
            panic::catch_unwind(AssertUnwindSafe(move || -> JobOutput<W::Enriched> {
                let stats = self.run(&mut channel)?;
                Ok((channel, stats))
            }))
            .ok()
        };

        match mode {
            ExecutionMode::Blocking => JobHandle {
                pass,
                state: HandleState::Ready(execute()),
            },
            ExecutionMode::Background => {
                let (sender, receiver) = mpsc::sync_channel(1);
                rayon::spawn(move || {
                    if let Some(output) = execute() {
                        // The handle may have been dropped; nobody is waiting then.
                        let _ = sender.send(output);
                    }
                });
                JobHandle {
                    pass,
                    state: HandleState::Pending(receiver),
                }
            }
        }
    }
}

impl<T, W> fmt::Debug for TriggerJob<T, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TriggerJob")
            .field("batches", &self.batches.len())
            .finish_non_exhaustive()
    }
}

fn run_batch<T, W>(
    writer: &W,
    batch: &Batch,
    segment: &mut Segment<W::Enriched>,
) -> Result<PassStats, ChannelError>
where
    T: EffectPayload,
    W: ContextWriter<T>,
{
    let mut stats = PassStats {
        batches: 1,
        entities: batch.len(),
        ..PassStats::default()
    };

    let cache = writer.prepare_batch(batch);
    let mut out = segment.open()?;

    // The trigger query guarantees all three columns.
    let (Some(abilities), Some(targets), Some(effects)) = (
        batch.column::<AbilitySequence>(),
        batch.column::<Target>(),
        batch.column::<EffectSequence<T>>(),
    ) else {
        out.close();
        return Ok(stats);
    };
    let entities = batch.entities();

    let rows = abilities.iter().zip(targets).zip(effects).enumerate();
    for (i, ((abilities, target), effects)) in rows {
        stats.stale_entries += effects
            .0
            .iter()
            .filter(|entry| entry.ability_index >= abilities.len())
            .count();

        for slot in abilities.active_slots() {
            for entry in effects.for_slot(slot) {
                let resolved = match entry.payload.affects() {
                    Affects::Target => {
                        let Some(target) = target.get() else {
                            tracing::trace!(
                                entity = %entities[i],
                                slot,
                                "target effect without a target"
                            );
                            stats.untargeted += 1;
                            continue;
                        };
                        target
                    }
                    Affects::Caster => entities[i],
                };

                let before = out.written();
                writer.write_enriched(&cache, i, &mut out, &entry.payload, resolved);
                let written = out.written() - before;
                debug_assert_eq!(written, 1, "context writer must append exactly one record");
                stats.emitted += written;
            }
        }
    }

    out.close();
    Ok(stats)
}

// =============================================================================
// Job Handle
// =============================================================================

type JobOutput<E> = Result<(EffectChannel<E>, PassStats), ChannelError>;

enum HandleState<E> {
    /// `None` means the job panicked.
    Ready(Option<JobOutput<E>>),
    Pending(Receiver<JobOutput<E>>),
}

/// A finished trigger job's output.
#[derive(Debug)]
pub struct Completed<E> {
    /// The pass that produced the channel.
    pub pass: PassId,
    /// The sealed channel.
    pub channel: EffectChannel<E>,
    /// Counters from the run.
    pub stats: PassStats,
}

/// Completion handle of a scheduled [`TriggerJob`].
pub struct JobHandle<E> {
    pass: PassId,
    state: HandleState<E>,
}

impl<E> JobHandle<E> {
    /// The pass that scheduled the job.
    #[must_use]
    pub fn pass(&self) -> &PassId {
        &self.pass
    }

    /// Blocks until the job finishes and returns its channel.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::JobAborted`] if the job panicked
    /// - [`DispatchError::Channel`] if the job hit a channel protocol error
    pub fn wait(self) -> DispatchResult<Completed<E>> {
        let output = match self.state {
            HandleState::Ready(output) => output,
            HandleState::Pending(receiver) => receive(&receiver),
        };
        let Some(output) = output else {
            tracing::warn!(pass = %self.pass, "trigger job aborted");
            return Err(DispatchError::JobAborted { pass: self.pass });
        };
        let (channel, stats) = output?;
        Ok(Completed {
            pass: self.pass,
            channel,
            stats,
        })
    }
}

/// Waits for a background job's output.
///
/// On a rayon worker the job may be queued on this very thread, so the wait
/// keeps running pool work instead of blocking.
fn receive<T>(receiver: &Receiver<T>) -> Option<T> {
    if rayon::current_thread_index().is_none() {
        return receiver.recv().ok();
    }
    loop {
        match receiver.try_recv() {
            Ok(output) => return Some(output),
            Err(TryRecvError::Disconnected) => return None,
            Err(TryRecvError::Empty) => {
                if rayon::yield_now() != Some(rayon::Yield::Executed) {
                    std::thread::yield_now();
                }
            }
        }
    }
}

impl<E> fmt::Debug for JobHandle<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            HandleState::Ready(_) => "ready",
            HandleState::Pending(_) => "pending",
        };
        f.debug_struct("JobHandle")
            .field("pass", &self.pass)
            .field("state", &state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ability::{Ability, AbilityState};
    use crate::channel::SegmentState;
    use crate::effect::EffectEntry;
    use crate::writer::{IdentityWriter, Triggered};
    use crate::{EntityId, World, WorldConfig};

    #[derive(Debug, Clone, PartialEq)]
    struct Zap {
        tag: u8,
        affects: Affects,
    }

    impl EffectPayload for Zap {
        fn affects(&self) -> Affects {
            self.affects
        }
    }

    fn zap(tag: u8, affects: Affects) -> Zap {
        Zap { tag, affects }
    }

    fn spawn(
        world: &mut World,
        states: &[AbilityState],
        target: Option<EntityId>,
        effects: Vec<EffectEntry<Zap>>,
    ) -> EntityId {
        world
            .spawn()
            .with(AbilitySequence::new(states.iter().copied().map(Ability::new).collect()))
            .with(Target(target))
            .with(EffectSequence::new(effects))
            .build()
    }

    fn run(world: &World, mode: ExecutionMode) -> Completed<Triggered<Zap>> {
        let batches = world.query(&crate::query::base_requirement::<Zap>());
        let channel = EffectChannel::with_segments(batches.len());
        TriggerJob::<Zap, _>::new(batches, Arc::new(IdentityWriter))
            .schedule(PassId::from_static("zap"), channel, mode)
            .wait()
            .unwrap()
    }

    #[test]
    fn emits_in_slot_then_entry_order() {
        let mut world = World::default();
        let caster = spawn(
            &mut world,
            &[AbilityState::Active, AbilityState::Active],
            None,
            vec![
                EffectEntry::new(1, zap(0, Affects::Caster)),
                EffectEntry::new(0, zap(1, Affects::Caster)),
                EffectEntry::new(1, zap(2, Affects::Caster)),
            ],
        );

        let done = run(&world, ExecutionMode::Blocking);
        let tags: Vec<_> = done.channel.iter().unwrap().map(|t| t.payload.tag).collect();
        assert_eq!(tags, vec![1, 0, 2]);
        assert!(done.channel.iter().unwrap().all(|t| t.source == caster && t.target == caster));
        assert_eq!(done.stats.emitted, 3);
    }

    #[test]
    fn caster_policy_uses_entity_row_not_entry_index() {
        let mut world = World::default();
        let first = spawn(&mut world, &[AbilityState::Inactive], None, vec![]);
        let second = spawn(
            &mut world,
            &[AbilityState::Active],
            Some(first),
            vec![EffectEntry::new(0, zap(0, Affects::Caster))],
        );

        let done = run(&world, ExecutionMode::Blocking);
        let record = done.channel.iter().unwrap().next().unwrap().clone();
        assert_eq!(record.target, second);
    }

    #[test]
    fn missing_target_and_stale_index_are_counted() {
        let mut world = World::default();
        spawn(
            &mut world,
            &[AbilityState::Active],
            None,
            vec![
                EffectEntry::new(0, zap(0, Affects::Target)),
                EffectEntry::new(4, zap(1, Affects::Caster)),
            ],
        );

        let done = run(&world, ExecutionMode::Blocking);
        assert!(done.channel.is_empty());
        assert_eq!(done.stats.untargeted, 1);
        assert_eq!(done.stats.stale_entries, 1);
    }

    #[test]
    fn every_segment_closes_even_when_empty() {
        let mut world = World::new(WorldConfig { batch_capacity: 1 });
        for _ in 0..4 {
            spawn(&mut world, &[AbilityState::Cooldown], None, vec![]);
        }

        let done = run(&world, ExecutionMode::Background);
        assert_eq!(done.channel.segment_count(), 4);
        assert!(done.channel.is_sealed());
        assert_eq!(done.stats.batches, 4);
        assert_eq!(done.stats.entities, 4);
    }

    #[test]
    fn reused_channel_is_rejected() {
        let mut world = World::default();
        spawn(&mut world, &[AbilityState::Active], None, vec![]);
        let batches = world.query(&crate::query::base_requirement::<Zap>());

        let job = TriggerJob::<Zap, _>::new(batches, Arc::new(IdentityWriter));
        let mut channel = EffectChannel::with_segments(1);
        job.run(&mut channel).unwrap();
        assert_eq!(
            job.run(&mut channel).unwrap_err(),
            ChannelError::SegmentReopened { segment: 0 }
        );
    }

    fn single_entity_batches(count: usize) -> Vec<Arc<Batch>> {
        let mut world = World::new(WorldConfig { batch_capacity: 1 });
        for _ in 0..count {
            spawn(
                &mut world,
                &[AbilityState::Active],
                None,
                vec![EffectEntry::new(0, zap(0, Affects::Caster))],
            );
        }
        world.query(&crate::query::base_requirement::<Zap>())
    }

    #[test]
    fn short_channel_is_rejected_before_writing() {
        let job = TriggerJob::<Zap, _>::new(single_entity_batches(3), Arc::new(IdentityWriter));
        let mut channel = EffectChannel::with_segments(1);

        assert_eq!(
            job.run(&mut channel).unwrap_err(),
            ChannelError::SegmentCountMismatch {
                segments: 1,
                batches: 3
            }
        );
        assert_eq!(channel.segments_mut()[0].state(), SegmentState::Pending);
    }

    #[test]
    fn long_channel_is_rejected() {
        let batches = single_entity_batches(2);
        for mode in [ExecutionMode::Blocking, ExecutionMode::Background] {
            let result = TriggerJob::<Zap, _>::new(batches.clone(), Arc::new(IdentityWriter))
                .schedule(PassId::from_static("zap"), EffectChannel::with_segments(5), mode)
                .wait();
            assert!(matches!(
                result,
                Err(DispatchError::Channel(ChannelError::SegmentCountMismatch {
                    segments: 5,
                    batches: 2
                }))
            ));
        }
    }

    #[test]
    fn background_wait_on_a_single_worker_pool() {
        let batches = single_entity_batches(4);
        let pool = rayon::ThreadPoolBuilder::new().num_threads(1).build().unwrap();

        let done = pool.install(|| {
            TriggerJob::<Zap, _>::new(batches, Arc::new(IdentityWriter))
                .schedule(
                    PassId::from_static("zap"),
                    EffectChannel::with_segments(4),
                    ExecutionMode::Background,
                )
                .wait()
                .unwrap()
        });
        assert_eq!(done.stats.emitted, 4);
        assert!(done.channel.is_sealed());
    }

    struct PanickingWriter;

    impl ContextWriter<Zap> for PanickingWriter {
        type Enriched = ();
        type BatchCache<'b> = ();

        fn prepare_batch<'b>(&self, _batch: &'b Batch) -> Self::BatchCache<'b> {}

        fn write_enriched(
            &self,
            _cache: &Self::BatchCache<'_>,
            _local_index: usize,
            _segment: &mut crate::channel::SegmentWriter<'_, ()>,
            _payload: &Zap,
            _target: EntityId,
        ) {
            panic!("writer failure");
        }
    }

    #[test]
    fn panicking_job_reports_abort() {
        let mut world = World::default();
        spawn(
            &mut world,
            &[AbilityState::Active],
            None,
            vec![EffectEntry::new(0, zap(0, Affects::Caster))],
        );
        let batches = world.query(&crate::query::base_requirement::<Zap>());

        for mode in [ExecutionMode::Blocking, ExecutionMode::Background] {
            let handle = TriggerJob::<Zap, _>::new(batches.clone(), Arc::new(PanickingWriter))
                .schedule(PassId::from_static("boom"), EffectChannel::with_segments(1), mode);
            assert!(matches!(handle.wait(), Err(DispatchError::JobAborted { .. })));
        }
    }
}
