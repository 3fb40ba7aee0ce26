//! Error types for the dispatch engine.
//!
//! Bad effect data is never an error here: stale ability indices and missing
//! targets are omitted and counted in [`PassStats`](crate::pass::PassStats).
//! The errors below cover protocol misuse (reading an unfinished channel) and
//! producer jobs that never delivered their channel.

use thiserror::Error;
use volley_store::WorldError;

use crate::pass::PassId;

/// Misuse of an [`EffectChannel`](crate::channel::EffectChannel).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// A segment was opened a second time in the same tick.
    #[error("segment {segment} was already opened this tick")]
    SegmentReopened {
        /// Index of the offending segment.
        segment: usize,
    },
    /// The channel was read while some writers had not closed their segment.
    #[error("channel read with {unclosed} of {segments} segments still unclosed")]
    Unsealed {
        /// Segments not yet closed.
        unclosed: usize,
        /// Total segments in the channel.
        segments: usize,
    },
    /// The channel handed to a job does not have one segment per batch.
    #[error("channel has {segments} segments but the job covers {batches} batches")]
    SegmentCountMismatch {
        /// Segments in the channel.
        segments: usize,
        /// Batches selected for the job.
        batches: usize,
    },
}

/// Errors surfaced by trigger passes, consumers and the simulation loop.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A trigger job ended without handing back its channel.
    #[error("trigger job for pass `{pass}` aborted before completing")]
    JobAborted {
        /// The pass whose job failed.
        pass: PassId,
    },
    /// Channel protocol violation.
    #[error(transparent)]
    Channel(#[from] ChannelError),
    /// Entity store failure while applying effects.
    #[error(transparent)]
    World(#[from] WorldError),
}

/// Convenience alias for dispatch results.
pub type DispatchResult<T> = Result<T, DispatchError>;
