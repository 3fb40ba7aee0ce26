//! Consumers: the read side of the effect pipeline.
//!
//! A consumer gates its producers (`should_run`), allocates their channels,
//! collects their completion handles, and in its own phase joins every handle
//! before reading. The join is the only ordering contract between trigger
//! passes and their consumer: passes for different effect categories may run
//! concurrently with each other, and the consumer starts reading only once all
//! of them have delivered.
//!
//! # Building a consumer
//!
//! Implementors usually embed a [`CompletionSet`] (the join barrier) and a
//! [`ChannelLedger`] (allocation accounting), and put their domain logic in
//! [`EffectConsumer::consume`]. [`CollectingConsumer`] is the minimal example:
//! it just keeps every record it reads.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::channel::EffectChannel;
use crate::error::DispatchResult;
use crate::job::{Completed, JobHandle};
use crate::pass::PassStats;
use crate::World;

/// The downstream side of one or more trigger passes producing records of type `E`.
pub trait EffectConsumer<E>: Send {
    /// Returns false if the consumer has nothing to do this tick.
    ///
    /// Producers check this before doing any work; a `false` means no channel
    /// is allocated and no job is scheduled.
    fn should_run(&self, world: &World) -> bool;

    /// Creates a channel with one segment per batch. The consumer owns its disposal.
    fn allocate_channel(&mut self, batch_count: usize) -> EffectChannel<E>;

    /// Adds a producer's completion handle to the join set.
    fn register_completion(&mut self, handle: JobHandle<E>);

    /// Joins every registered producer, applies each record once, and disposes
    /// the channels.
    ///
    /// # Errors
    ///
    /// Returns the first producer or application error. All producers are
    /// still joined and all channels disposed before returning.
    fn consume(&mut self, world: &mut World) -> DispatchResult<ConsumeReport>;
}

/// Summary of one consume phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumeReport {
    /// Channels read and disposed.
    pub channels: usize,
    /// Records applied.
    pub records: usize,
    /// Combined counters of every producer joined.
    pub triggered: PassStats,
}

// =============================================================================
// Join Barrier
// =============================================================================

/// Accumulates completion handles and joins them all at once.
pub struct CompletionSet<E> {
    handles: Vec<JobHandle<E>>,
}

impl<E> CompletionSet<E> {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handles: Vec::new(),
        }
    }

    /// Adds a handle.
    pub fn register(&mut self, handle: JobHandle<E>) {
        self.handles.push(handle);
    }

    /// Number of handles not yet joined.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.handles.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Waits for every registered job, in registration order.
    ///
    /// Returns the completed channels alongside the first error encountered;
    /// a failed producer does not stop the others from being joined.
    pub fn join(&mut self) -> (Vec<Completed<E>>, DispatchResult<()>) {
        let mut completed = Vec::with_capacity(self.handles.len());
        let mut result = Ok(());
        for handle in self.handles.drain(..) {
            match handle.wait() {
                Ok(done) => completed.push(done),
                Err(err) => {
                    if result.is_ok() {
                        result = Err(err);
                    }
                }
            }
        }
        (completed, result)
    }
}

impl<E> Default for CompletionSet<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for CompletionSet<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionSet")
            .field("pending", &self.handles.len())
            .finish()
    }
}

// =============================================================================
// Allocation Accounting
// =============================================================================

/// Counts channels a consumer has allocated and disposed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelLedger {
    /// Channels handed out.
    pub allocated: usize,
    /// Channels read and dropped.
    pub disposed: usize,
}

impl ChannelLedger {
    /// Allocates a channel and records it.
    pub fn allocate<E>(&mut self, batch_count: usize) -> EffectChannel<E> {
        self.allocated += 1;
        EffectChannel::with_segments(batch_count)
    }

    /// Drops a channel and records it.
    pub fn dispose<E>(&mut self, channel: EffectChannel<E>) {
        drop(channel);
        self.record_disposed();
    }

    /// Records a channel that was consumed elsewhere or lost with its producer.
    pub fn record_disposed(&mut self) {
        self.disposed += 1;
    }

    /// Channels allocated but not yet disposed.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.allocated.saturating_sub(self.disposed)
    }
}

// =============================================================================
// Collecting Consumer
// =============================================================================

/// A consumer that keeps every record it reads.
///
/// Records from one consume phase are grouped by producer, in registration
/// order, then segment order.
pub struct CollectingConsumer<E> {
    enabled: bool,
    completions: CompletionSet<E>,
    ledger: ChannelLedger,
    records: Vec<E>,
}

impl<E> CollectingConsumer<E> {
    /// Creates an enabled, empty consumer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            enabled: true,
            completions: CompletionSet::new(),
            ledger: ChannelLedger::default(),
            records: Vec::new(),
        }
    }

    /// Enables or disables the consumer. A disabled consumer reports `should_run == false`.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Channel allocation counters.
    #[must_use]
    pub fn ledger(&self) -> ChannelLedger {
        self.ledger
    }

    /// Registered producers not yet joined.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.completions.pending()
    }

    /// Records gathered so far.
    #[must_use]
    pub fn records(&self) -> &[E] {
        &self.records
    }

    /// Takes the gathered records, leaving the consumer empty.
    pub fn take_records(&mut self) -> Vec<E> {
        std::mem::take(&mut self.records)
    }
}

impl<E> Default for CollectingConsumer<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Send + 'static> EffectConsumer<E> for CollectingConsumer<E> {
    fn should_run(&self, _world: &World) -> bool {
        self.enabled
    }

    fn allocate_channel(&mut self, batch_count: usize) -> EffectChannel<E> {
        self.ledger.allocate(batch_count)
    }

    fn register_completion(&mut self, handle: JobHandle<E>) {
        self.completions.register(handle);
    }

    fn consume(&mut self, _world: &mut World) -> DispatchResult<ConsumeReport> {
        let producers = self.completions.pending();
        let (completed, joined) = self.completions.join();
        for _ in completed.len()..producers {
            self.ledger.record_disposed();
        }

        let mut report = ConsumeReport::default();
        let mut result = joined;
        for done in completed {
            report.triggered += done.stats;
            match done.channel.into_values() {
                Ok(values) => {
                    report.records += values.len();
                    self.records.extend(values);
                }
                Err(err) => {
                    if result.is_ok() {
                        result = Err(err.into());
                    }
                }
            }
            report.channels += 1;
            self.ledger.record_disposed();
        }

        tracing::debug!(
            channels = report.channels,
            records = report.records,
            "collected effect records"
        );
        result.map(|()| report)
    }
}

impl<E> fmt::Debug for CollectingConsumer<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectingConsumer")
            .field("enabled", &self.enabled)
            .field("completions", &self.completions)
            .field("ledger", &self.ledger)
            .field("records", &self.records.len())
            .finish()
    }
}
