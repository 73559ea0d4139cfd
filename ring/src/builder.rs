// src/builder.rs

use crate::buffer::RingBuffer;
use crate::reader::Reader;

use std::fmt;
use std::sync::Arc;

/// Where a new reader starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartPosition {
  /// The oldest element still guaranteed valid: one lap behind the writer,
  /// or the start of the ring during the first lap.
  #[default]
  OldestValid,
  /// The writer's edge. Only elements written afterwards are visible.
  Edge,
}

/// Reader settings collected by [`ReaderBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct ReaderOptions {
  pub(crate) blocking: bool,
  pub(crate) start: StartPosition,
  pub(crate) auto_skip: bool,
}

/// A builder for [`Reader`]s, obtained from
/// [`RingBuffer::reader_builder`].
///
/// Defaults to a non-blocking reader at [`StartPosition::OldestValid`] with
/// auto-skip disabled, the same reader [`RingBuffer::reader`] returns.
pub struct ReaderBuilder<'a, T> {
  ring: &'a RingBuffer<T>,
  options: ReaderOptions,
}

impl<T> fmt::Debug for ReaderBuilder<'_, T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ReaderBuilder")
      .field("capacity", &self.ring.capacity())
      .field("options", &self.options)
      .finish()
  }
}

impl<'a, T> ReaderBuilder<'a, T> {
  pub(crate) fn new(ring: &'a RingBuffer<T>) -> Self {
    Self {
      ring,
      options: ReaderOptions::default(),
    }
  }

  /// Whether reads wait for new data instead of returning
  /// [`ReadError::EndOfData`](crate::ReadError::EndOfData).
  pub fn blocking(mut self, blocking: bool) -> Self {
    self.options.blocking = blocking;
    self
  }

  /// Sets where the reader starts.
  pub fn start(mut self, start: StartPosition) -> Self {
    self.options.start = start;
    self
  }

  /// Whether a stale reader silently jumps to the oldest valid element
  /// instead of failing with [`ReadError::Stale`](crate::ReadError::Stale).
  pub fn auto_skip(mut self, auto_skip: bool) -> Self {
    self.options.auto_skip = auto_skip;
    self
  }

  /// Creates the reader, or returns `None` if the ring is already closed.
  pub fn build(self) -> Option<Reader<T>> {
    Reader::open(Arc::clone(&self.ring.shared), self.options)
  }
}
