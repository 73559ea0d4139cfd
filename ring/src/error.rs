// src/error.rs

use thiserror::Error;

/// Error returned when a ring buffer cannot be constructed.
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum BuildError {
  /// The ring was configured with a capacity of zero.
  #[error("ring buffer capacity must be greater than zero")]
  ZeroCapacity,
}

/// Error returned by write operations on a [`RingBuffer`](crate::RingBuffer).
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum WriteError {
  /// The ring buffer has been closed and accepts no more elements.
  #[error("ring buffer closed")]
  Closed,
}

/// Error returned by read operations on a [`Reader`](crate::Reader).
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum ReadError {
  /// No new data is available right now. This is not a failure: a later read
  /// may return data. Blocking readers only see this once the ring is closed.
  #[error("no new data available")]
  EndOfData,
  /// The writer has overwritten data this reader had not consumed yet.
  #[error("ring buffer reader is stale (didn't read fast enough - do you need a larger buffer?)")]
  Stale,
  /// This reader has been closed.
  #[error("ring buffer reader closed")]
  Closed,
  /// A bounded blocking read elapsed before any data arrived.
  #[error("read operation timed out")]
  Timeout,
  /// The reader's position is ahead of the writer. This indicates a bug in the
  /// ring itself and should never be observed.
  #[error("reader position is ahead of the writer")]
  ReaderAhead,
}

impl ReadError {
  /// Returns `true` for [`ReadError::EndOfData`], the transient "nothing right
  /// now" signal a polling caller is expected to retry on.
  #[inline]
  pub fn is_end_of_data(&self) -> bool {
    matches!(self, ReadError::EndOfData)
  }
}
