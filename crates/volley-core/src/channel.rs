//! Batch-segmented output channel for enriched effect records.
//!
//! An [`EffectChannel`] holds one [`Segment`] per batch of a trigger job. Each
//! segment has exactly one writer for the tick, which is what lets batches
//! append in parallel without locks: the job hands out disjoint `&mut Segment`
//! borrows, one per batch.
//!
//! # Segment lifecycle
//!
//! ```text
//! Pending --open()--> Open --close()/drop--> Closed
//! ```
//!
//! A segment can be opened once per channel. The channel is *sealed* when every
//! segment is closed, and only a sealed channel can be read.
//!
//! # Example
//!
//! ```
//! use volley_core::channel::EffectChannel;
//!
//! let mut channel = EffectChannel::<&str>::with_segments(2);
//! assert!(!channel.is_sealed());
//!
//! for segment in channel.segments_mut() {
//!     let mut writer = segment.open().unwrap();
//!     writer.write(0, "hit");
//!     writer.close();
//! }
//!
//! assert!(channel.is_sealed());
//! assert_eq!(channel.iter().unwrap().count(), 2);
//! ```

use std::fmt;

use crate::error::ChannelError;

/// Lifecycle state of a [`Segment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentState {
    /// Not yet opened this tick.
    Pending,
    /// A writer currently owns the segment.
    Open,
    /// The writer has finished.
    Closed,
}

/// One enriched record and the local index of the entity that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Record<E> {
    /// Row of the triggering entity within its batch.
    pub local_index: usize,
    /// The enriched effect.
    pub value: E,
}

/// The append-only output of a single batch.
#[derive(Debug)]
pub struct Segment<E> {
    index: usize,
    state: SegmentState,
    records: Vec<Record<E>>,
}

impl<E> Segment<E> {
    fn new(index: usize) -> Self {
        Self {
            index,
            state: SegmentState::Pending,
            records: Vec::new(),
        }
    }

    /// Position of this segment in its channel.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> SegmentState {
        self.state
    }

    /// Records appended so far.
    #[must_use]
    pub fn records(&self) -> &[Record<E>] {
        &self.records
    }

    /// Opens the segment for writing.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::SegmentReopened`] unless the segment is pending.
    pub fn open(&mut self) -> Result<SegmentWriter<'_, E>, ChannelError> {
        if self.state != SegmentState::Pending {
            return Err(ChannelError::SegmentReopened {
                segment: self.index,
            });
        }
        self.state = SegmentState::Open;
        Ok(SegmentWriter { segment: self })
    }
}

/// Exclusive writer for one open segment.
///
/// Dropping the writer closes the segment.
pub struct SegmentWriter<'a, E> {
    segment: &'a mut Segment<E>,
}

impl<E> SegmentWriter<'_, E> {
    /// Appends a record for the entity at `local_index`.
    pub fn write(&mut self, local_index: usize, value: E) {
        self.segment.records.push(Record { local_index, value });
    }

    /// Number of records written to this segment.
    #[must_use]
    pub fn written(&self) -> usize {
        self.segment.records.len()
    }

    /// Closes the segment.
    pub fn close(self) {}
}

impl<E> Drop for SegmentWriter<'_, E> {
    fn drop(&mut self) {
        self.segment.state = SegmentState::Closed;
    }
}

impl<E> fmt::Debug for SegmentWriter<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentWriter")
            .field("segment", &self.segment.index)
            .field("written", &self.segment.records.len())
            .finish()
    }
}

/// Append-only, batch-segmented buffer of enriched effects for one tick.
#[derive(Debug)]
pub struct EffectChannel<E> {
    segments: Vec<Segment<E>>,
}

impl<E> EffectChannel<E> {
    /// Creates a channel with `count` pending segments.
    #[must_use]
    pub fn with_segments(count: usize) -> Self {
        Self {
            segments: (0..count).map(Segment::new).collect(),
        }
    }

    /// Number of segments.
    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Mutable access to the segments, for distributing one per writer.
    pub fn segments_mut(&mut self) -> &mut [Segment<E>] {
        &mut self.segments
    }

    /// Returns true once every segment has been closed.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.segments
            .iter()
            .all(|segment| segment.state == SegmentState::Closed)
    }

    fn check_sealed(&self) -> Result<(), ChannelError> {
        let unclosed = self
            .segments
            .iter()
            .filter(|segment| segment.state != SegmentState::Closed)
            .count();
        if unclosed == 0 {
            Ok(())
        } else {
            Err(ChannelError::Unsealed {
                unclosed,
                segments: self.segments.len(),
            })
        }
    }

    /// Read access to the sealed segments.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Unsealed`] if any segment is still pending or open.
    pub fn segments(&self) -> Result<&[Segment<E>], ChannelError> {
        self.check_sealed()?;
        Ok(&self.segments)
    }

    /// Iterates every record value, segment by segment.
    ///
    /// Order within a segment is write order; order across segments carries
    /// no meaning.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Unsealed`] if any segment is still pending or open.
    pub fn iter(&self) -> Result<impl Iterator<Item = &E> + '_, ChannelError> {
        self.check_sealed()?;
        Ok(self
            .segments
            .iter()
            .flat_map(|segment| segment.records.iter().map(|record| &record.value)))
    }

    /// Total number of records across all segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.iter().map(|segment| segment.records.len()).sum()
    }

    /// Returns true if no records were written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consumes the channel, yielding every record value.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Unsealed`] if any segment is still pending or open.
    pub fn into_values(self) -> Result<Vec<E>, ChannelError> {
        self.check_sealed()?;
        Ok(self
            .segments
            .into_iter()
            .flat_map(|segment| segment.records.into_iter().map(|record| record.value))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_opens_once() {
        let mut channel = EffectChannel::<u32>::with_segments(1);
        let segment = &mut channel.segments_mut()[0];

        segment.open().unwrap().close();
        assert_eq!(segment.state(), SegmentState::Closed);
        assert_eq!(
            segment.open().unwrap_err(),
            ChannelError::SegmentReopened { segment: 0 }
        );
    }

    #[test]
    fn drop_closes_writer() {
        let mut channel = EffectChannel::<u32>::with_segments(1);
        {
            let mut writer = channel.segments_mut()[0].open().unwrap();
            writer.write(3, 7);
            assert_eq!(writer.written(), 1);
        }
        assert!(channel.is_sealed());
        assert_eq!(
            channel.segments().unwrap()[0].records(),
            &[Record {
                local_index: 3,
                value: 7
            }]
        );
    }

    #[test]
    fn read_before_seal_is_rejected() {
        let mut channel = EffectChannel::<u32>::with_segments(3);
        channel.segments_mut()[0].open().unwrap().close();

        assert_eq!(
            channel.iter().err(),
            Some(ChannelError::Unsealed {
                unclosed: 2,
                segments: 3
            })
        );
        assert!(channel.into_values().is_err());
    }

    #[test]
    fn empty_channel_is_sealed() {
        let channel = EffectChannel::<u32>::with_segments(0);
        assert!(channel.is_sealed());
        assert!(channel.is_empty());
        assert!(channel.into_values().unwrap().is_empty());
    }

    #[test]
    fn values_keep_segment_write_order() {
        let mut channel = EffectChannel::<u32>::with_segments(2);
        for (offset, segment) in channel.segments_mut().iter_mut().enumerate() {
            let mut writer = segment.open().unwrap();
            writer.write(0, offset as u32 * 10);
            writer.write(1, offset as u32 * 10 + 1);
        }
        assert_eq!(channel.len(), 4);
        assert_eq!(channel.into_values().unwrap(), vec![0, 1, 10, 11]);
    }
}
