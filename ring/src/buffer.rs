// src/buffer.rs

use crate::builder::{ReaderBuilder, StartPosition};
use crate::error::{BuildError, WriteError};
use crate::position::Position;
use crate::reader::Reader;
use crate::sync_util::{ReaderGroup, WakeSignal};
use crate::telemetry;

use std::fmt;
use std::io;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace, warn};

const LOC_WRITE: &str = "RingBuffer::write";
const LOC_CLOSE: &str = "RingBuffer::close";

const EVT_W_WRAP: &str = "W:Wrap";
const EVT_W_OVERSIZED: &str = "W:Oversized";
const EVT_CLOSE_DRAIN_WAIT: &str = "Close:DrainWait";
const EVT_CLOSE_DRAINED: &str = "Close:Drained";

const CTR_WRITES: &str = "Writes";
const CTR_READERS_WOKEN: &str = "ReadersWoken";

/// Everything guarded by the ring's reader/writer lock.
pub(crate) struct RingState<T> {
  /// Grows during the first lap, then stays at `capacity` and is
  /// overwritten in place.
  pub(crate) storage: Vec<T>,
  /// Position of the next slot the writer fills.
  pub(crate) edge: Position,
  pub(crate) closed: bool,
}

impl<T: Clone> RingState<T> {
  fn with_capacity(capacity: usize) -> Self {
    Self {
      storage: Vec::with_capacity(capacity),
      edge: Position::default(),
      closed: false,
    }
  }

  /// Stores `values` at the edge and moves the edge past them.
  fn commit(&mut self, values: &[T], capacity: usize) {
    let n = values.len();
    if n == 0 {
      return;
    }
    let end = self.edge.time(capacity) + n as u64;

    if n > capacity {
      // Only the trailing `capacity` elements survive; lay them out so the
      // newest one sits just before the new edge.
      let tail = &values[n - capacity..];
      let end_index = (end % capacity as u64) as usize;
      self.storage.clear();
      self
        .storage
        .extend((0..capacity).map(|i| tail[(i + capacity - end_index) % capacity].clone()));
    } else {
      let start = self.edge.index;
      let first = n.min(capacity - start);
      self.fill(start, &values[..first]);
      self.fill(0, &values[first..]);
    }

    self.edge = Position::from_time(end, capacity);
  }

  fn fill(&mut self, at: usize, values: &[T]) {
    debug_assert!(at <= self.storage.len());
    let overlap = self.storage.len().saturating_sub(at).min(values.len());
    self.storage[at..at + overlap].clone_from_slice(&values[..overlap]);
    self.storage.extend_from_slice(&values[overlap..]);
  }
}

/// State shared between the ring and every reader created from it.
pub(crate) struct Shared<T> {
  pub(crate) capacity: usize,
  pub(crate) state: RwLock<RingState<T>>,
  pub(crate) signal: WakeSignal,
  pub(crate) readers: ReaderGroup,
}

impl<T> Shared<T> {
  pub(crate) fn is_closed(&self) -> bool {
    self.state.read().closed
  }

  /// Marks the ring closed and wakes every blocked reader. Returns `false`
  /// if it was already closed.
  fn mark_closed(&self) -> bool {
    let mut state = self.state.write();
    if state.closed {
      return false;
    }
    state.closed = true;
    self.signal.notify_all();
    true
  }
}

/// A fixed-capacity ring buffer with a single writer and any number of
/// independent readers.
///
/// The writer never waits for readers: once the ring is full it overwrites
/// the oldest elements. A reader that falls more than one lap behind is told
/// so with [`ReadError::Stale`](crate::ReadError::Stale) instead of reading
/// overwritten data.
///
/// All methods take `&self`; writes are serialized by an exclusive lock, so a
/// `RingBuffer` can be shared (e.g. in an `Arc`) between the writing thread
/// and threads that create readers.
pub struct RingBuffer<T> {
  pub(crate) shared: Arc<Shared<T>>,
}

impl<T> fmt::Debug for RingBuffer<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut dbg = f.debug_struct("RingBuffer");
    dbg.field("capacity", &self.shared.capacity);
    if let Some(state) = self.shared.state.try_read() {
      dbg
        .field("total_written", &state.edge.time(self.shared.capacity))
        .field("closed", &state.closed);
    }
    dbg
      .field("live_readers", &self.shared.readers.live())
      .finish_non_exhaustive()
  }
}

impl<T: Clone> RingBuffer<T> {
  /// Creates a ring holding at most `capacity` elements.
  ///
  /// # Errors
  ///
  /// Returns [`BuildError::ZeroCapacity`] if `capacity` is 0.
  pub fn new(capacity: usize) -> Result<Self, BuildError> {
    if capacity == 0 {
      return Err(BuildError::ZeroCapacity);
    }
    debug!(capacity, "ring buffer created");
    Ok(Self {
      shared: Arc::new(Shared {
        capacity,
        state: RwLock::new(RingState::with_capacity(capacity)),
        signal: WakeSignal::new(),
        readers: ReaderGroup::new(),
      }),
    })
  }

  /// Appends `values` to the ring and wakes blocked readers.
  ///
  /// A write is all-or-nothing. If `values` is longer than the capacity only
  /// its trailing `capacity` elements are kept, and every existing reader
  /// becomes stale.
  ///
  /// # Errors
  ///
  /// Returns [`WriteError::Closed`] if the ring has been closed.
  pub fn write(&self, values: &[T]) -> Result<usize, WriteError> {
    let capacity = self.shared.capacity;
    let mut state = self.shared.state.write();
    if state.closed {
      return Err(WriteError::Closed);
    }

    let before = state.edge;
    state.commit(values, capacity);
    let after = state.edge;

    if values.len() > capacity {
      warn!(
        written = values.len(),
        dropped = values.len() - capacity,
        capacity,
        "oversized write, existing readers are now stale"
      );
      telemetry::log_event(Some(after.time(capacity)), LOC_WRITE, EVT_W_OVERSIZED, None);
    } else if after.lap > before.lap {
      trace!(lap = after.lap, index = after.index, "write wrapped");
      telemetry::log_event(Some(after.time(capacity)), LOC_WRITE, EVT_W_WRAP, None);
    }
    telemetry::increment_counter(LOC_WRITE, CTR_WRITES);

    // Still under the exclusive lock, so woken readers observe this write.
    if self.shared.signal.notify_all() > 0 {
      telemetry::increment_counter(LOC_WRITE, CTR_READERS_WOKEN);
    }
    Ok(values.len())
  }

  /// Appends every element of `values`. Convenience over [`write`](Self::write).
  pub fn append<I>(&self, values: I) -> Result<usize, WriteError>
  where
    I: IntoIterator<Item = T>,
  {
    let values: Vec<T> = values.into_iter().collect();
    self.write(&values)
  }

  /// Appends a single element.
  pub fn push(&self, value: T) -> Result<(), WriteError> {
    self.write(std::slice::from_ref(&value)).map(|_| ())
  }

  /// Starts configuring a reader on this ring.
  pub fn reader_builder(&self) -> ReaderBuilder<'_, T> {
    ReaderBuilder::new(self)
  }

  /// Returns a non-blocking reader positioned at the oldest data still
  /// guaranteed valid: one lap behind the writer, or the start of the ring if
  /// the first lap isn't complete.
  ///
  /// Returns `None` if the ring is closed.
  pub fn reader(&self) -> Option<Reader<T>> {
    self.reader_builder().build()
  }

  /// Like [`reader`](Self::reader), but reads wait for new data instead of
  /// returning [`ReadError::EndOfData`](crate::ReadError::EndOfData).
  pub fn blocking_reader(&self) -> Option<Reader<T>> {
    self.reader_builder().blocking(true).build()
  }

  /// Returns a blocking reader positioned at the writer's edge: only data
  /// written after this call is visible to it.
  pub fn blocking_current_reader(&self) -> Option<Reader<T>> {
    self
      .reader_builder()
      .blocking(true)
      .start(StartPosition::Edge)
      .build()
  }
}

impl<T> RingBuffer<T> {
  /// The fixed number of slots in the ring.
  #[inline]
  pub fn capacity(&self) -> usize {
    self.shared.capacity
  }

  /// Total number of elements ever written, including overwritten ones.
  pub fn total_written(&self) -> u64 {
    self.shared.state.read().edge.time(self.shared.capacity)
  }

  /// Returns `true` once [`close`](Self::close) has been called.
  pub fn is_closed(&self) -> bool {
    self.shared.is_closed()
  }

  /// Number of readers created and not yet closed.
  pub fn live_readers(&self) -> usize {
    self.shared.readers.live()
  }

  /// Closes the ring and waits until every reader has been closed.
  ///
  /// Blocked readers are woken and see
  /// [`ReadError::EndOfData`](crate::ReadError::EndOfData) once they have read
  /// what is left. Later writes fail and no new readers can be created.
  /// Calling `close` again is a no-op.
  ///
  /// This only synchronizes with consumers (e.g. to know they drained before
  /// exiting); it frees nothing. It blocks for as long as any reader stays
  /// open, so readers must be closed or dropped by their owners.
  pub fn close(&self) {
    if !self.shared.mark_closed() {
      return;
    }
    let live = self.shared.readers.live();
    debug!(live_readers = live, "ring buffer closed, waiting for readers");
    telemetry::log_event(None, LOC_CLOSE, EVT_CLOSE_DRAIN_WAIT, Some(format!("live:{}", live)));

    self.shared.readers.wait();

    telemetry::log_event(None, LOC_CLOSE, EVT_CLOSE_DRAINED, None);
    debug!("all ring buffer readers closed");
  }
}

impl<T> Drop for RingBuffer<T> {
  fn drop(&mut self) {
    // Release blocked readers without waiting for them.
    if self.shared.mark_closed() {
      debug!("ring buffer dropped without close");
    }
  }
}

impl From<WriteError> for io::Error {
  fn from(err: WriteError) -> Self {
    io::Error::new(io::ErrorKind::BrokenPipe, err)
  }
}

impl io::Write for &RingBuffer<u8> {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    RingBuffer::write(*self, buf).map_err(io::Error::from)
  }

  fn flush(&mut self) -> io::Result<()> {
    Ok(())
  }
}

impl io::Write for RingBuffer<u8> {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    RingBuffer::write(self, buf).map_err(io::Error::from)
  }

  fn flush(&mut self) -> io::Result<()> {
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn snapshot(ring: &RingBuffer<u8>) -> (Vec<u8>, Position) {
    let state = ring.shared.state.read();
    (state.storage.clone(), state.edge)
  }

  #[test]
  fn zero_capacity_is_rejected() {
    assert_eq!(RingBuffer::<u8>::new(0).unwrap_err(), BuildError::ZeroCapacity);
  }

  #[test]
  fn first_lap_grows_storage() {
    let ring = RingBuffer::new(10).unwrap();
    ring.write(b"hello").unwrap();
    let (storage, edge) = snapshot(&ring);
    assert_eq!(storage, b"hello");
    assert_eq!(edge, Position::new(0, 5));
  }

  #[test]
  fn exact_fit_to_end_advances_lap() {
    let ring = RingBuffer::new(10).unwrap();
    ring.write(b"hello").unwrap();
    ring.write(b"world").unwrap();
    let (storage, edge) = snapshot(&ring);
    assert_eq!(storage, b"helloworld");
    assert_eq!(edge, Position::new(1, 0));
    assert_eq!(ring.total_written(), 10);
  }

  #[test]
  fn wrapping_write_continues_at_start() {
    let ring = RingBuffer::new(10).unwrap();
    ring.write(b"hello").unwrap();
    ring.write(b"world!!!").unwrap();
    let (storage, edge) = snapshot(&ring);
    assert_eq!(storage, b"!!!loworld");
    assert_eq!(edge, Position::new(1, 3));
  }

  #[test]
  fn oversized_write_keeps_tail_ending_at_edge() {
    let ring = RingBuffer::new(4).unwrap();
    ring.write(b"ab").unwrap();
    // 2 + 7 = 9 elements in total: lap 2, index 1.
    ring.write(b"0123456").unwrap();
    let (storage, edge) = snapshot(&ring);
    assert_eq!(edge, Position::new(2, 1));
    // Trailing "3456" with '6' just before index 1.
    assert_eq!(storage, b"6345");
  }

  #[test]
  fn oversized_write_of_whole_laps() {
    let ring = RingBuffer::new(4).unwrap();
    ring.write(b"01234567").unwrap();
    let (storage, edge) = snapshot(&ring);
    assert_eq!(edge, Position::new(2, 0));
    assert_eq!(storage, b"4567");
    assert_eq!(ring.total_written(), 8);
  }

  #[test]
  fn empty_write_is_a_no_op() {
    let ring = RingBuffer::<u8>::new(4).unwrap();
    assert_eq!(ring.write(&[]), Ok(0));
    assert_eq!(ring.total_written(), 0);
  }

  #[test]
  fn write_after_close_fails() {
    let ring = RingBuffer::new(4).unwrap();
    ring.close();
    assert_eq!(ring.write(b"x"), Err(WriteError::Closed));
    assert_eq!(ring.push(b'x'), Err(WriteError::Closed));
    assert!(ring.reader().is_none());
  }
}
