// src/reader.rs

use crate::buffer::{RingState, Shared};
use crate::builder::{ReaderOptions, StartPosition};
use crate::error::ReadError;
use crate::position::{Position, Region};
use crate::telemetry;

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLockReadGuard;
use tracing::{debug, error};

const LOC_R_WAIT: &str = "Reader::wait_for_data";
const LOC_R_SKIP: &str = "Reader::skip";

const EVT_R_PARK: &str = "R:Park";
const EVT_R_UNPARKED: &str = "R:Unparked";
const EVT_R_TIMEOUT: &str = "R:Timeout";
const EVT_R_SKIP: &str = "R:AutoSkip";

const CTR_R_PARK_ATTEMPTS: &str = "ReaderParkAttempts";

/// A reader's private position and stale policy.
#[derive(Debug, Clone, Copy)]
struct ReadCursor {
  pos: Position,
  auto_skip: bool,
}

impl ReadCursor {
  /// Handles a stale position: jump to the oldest valid one, or fail.
  fn skip(&mut self, edge: Position, capacity: usize) -> Result<(), ReadError> {
    if !self.auto_skip {
      return Err(ReadError::Stale);
    }
    let target = edge.oldest_valid();
    let missed = target.time(capacity) - self.pos.time(capacity);
    debug!(missed, to = target.time(capacity), "stale reader skipped ahead");
    telemetry::log_event(
      Some(target.time(capacity)),
      LOC_R_SKIP,
      EVT_R_SKIP,
      Some(format!("missed:{}", missed)),
    );
    self.pos = target;
    Ok(())
  }

  fn read_into<T: Clone>(
    &mut self,
    state: &RingState<T>,
    capacity: usize,
    dst: &mut [T],
  ) -> Result<usize, ReadError> {
    let mut filled = 0;
    loop {
      match self.pos.region(state.edge, capacity) {
        Region::Stale => self.skip(state.edge, capacity)?,
        Region::Behind { avail } => {
          // Tail of the previous lap. At most one wrap per call: anything
          // that would need a second one made this reader stale first.
          let take = avail.min(dst.len() - filled);
          let from = self.pos.index;
          dst[filled..filled + take].clone_from_slice(&state.storage[from..from + take]);
          self.pos.advance(take, capacity);
          filled += take;
          if filled == dst.len() {
            return Ok(filled);
          }
        }
        Region::Current { avail: 0 } if filled > 0 => return Ok(filled),
        Region::Current { avail: 0 } => return Err(ReadError::EndOfData),
        Region::Current { avail } => {
          let take = avail.min(dst.len() - filled);
          let from = self.pos.index;
          dst[filled..filled + take].clone_from_slice(&state.storage[from..from + take]);
          self.pos.advance(take, capacity);
          return Ok(filled + take);
        }
        Region::Ahead => return Err(ahead_of_writer(self.pos, state.edge)),
      }
    }
  }

  fn read_one<T: Clone>(&mut self, state: &RingState<T>, capacity: usize) -> Result<T, ReadError> {
    loop {
      match self.pos.region(state.edge, capacity) {
        Region::Stale => self.skip(state.edge, capacity)?,
        Region::Current { avail: 0 } => return Err(ReadError::EndOfData),
        Region::Behind { .. } | Region::Current { .. } => {
          let value = state.storage[self.pos.index].clone();
          self.pos.advance(1, capacity);
          return Ok(value);
        }
        Region::Ahead => return Err(ahead_of_writer(self.pos, state.edge)),
      }
    }
  }
}

fn ahead_of_writer(pos: Position, edge: Position) -> ReadError {
  error!(
    reader_lap = pos.lap,
    reader_index = pos.index,
    writer_lap = edge.lap,
    writer_index = edge.index,
    "reader is ahead of the writer"
  );
  ReadError::ReaderAhead
}

/// Takes the shared lock, first parking while a blocking reader has nothing
/// to read and the ring is open.
fn wait_for_data<'a, T>(
  shared: &'a Shared<T>,
  pos: Position,
  blocking: bool,
  deadline: Option<Instant>,
) -> Result<RwLockReadGuard<'a, RingState<T>>, ReadError> {
  loop {
    let state = shared.state.read();
    if !blocking || state.closed || !pos.is_caught_up(state.edge) {
      return Ok(state);
    }
    if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
      telemetry::log_event(Some(pos.time(shared.capacity)), LOC_R_WAIT, EVT_R_TIMEOUT, None);
      return Err(ReadError::Timeout);
    }

    // Arm before releasing the read lock: the writer can only broadcast
    // after we are parked.
    let armed = shared.signal.arm();
    drop(state);
    telemetry::increment_counter(LOC_R_WAIT, CTR_R_PARK_ATTEMPTS);
    telemetry::log_event(Some(pos.time(shared.capacity)), LOC_R_WAIT, EVT_R_PARK, None);
    shared.signal.wait(armed, deadline);
    telemetry::log_event(Some(pos.time(shared.capacity)), LOC_R_WAIT, EVT_R_UNPARKED, None);
  }
}

/// One consumer's view of a [`RingBuffer`](crate::RingBuffer).
///
/// Each reader keeps its own position; readers never observe or move each
/// other. Reads take the ring's shared lock, so readers proceed in parallel
/// with each other but not with a write.
///
/// Closing a reader (explicitly or by dropping it) releases its hold on
/// [`RingBuffer::close`](crate::RingBuffer::close).
pub struct Reader<T> {
  shared: Arc<Shared<T>>,
  cursor: ReadCursor,
  blocking: bool,
  closed: AtomicBool,
}

impl<T> fmt::Debug for Reader<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Reader")
      .field("capacity", &self.shared.capacity)
      .field("lap", &self.cursor.pos.lap)
      .field("index", &self.cursor.pos.index)
      .field("blocking", &self.blocking)
      .field("auto_skip", &self.cursor.auto_skip)
      .field("closed", &self.closed.load(Ordering::Relaxed))
      .finish()
  }
}

impl<T> Reader<T> {
  pub(crate) fn open(shared: Arc<Shared<T>>, options: ReaderOptions) -> Option<Self> {
    let pos = {
      // Register under the lock so a concurrent close() can't miss us.
      let state = shared.state.read();
      if state.closed {
        return None;
      }
      shared.readers.add();
      match options.start {
        StartPosition::OldestValid => state.edge.oldest_valid(),
        StartPosition::Edge => state.edge,
      }
    };
    debug!(
      position = pos.time(shared.capacity),
      blocking = options.blocking,
      "ring buffer reader opened"
    );
    Some(Self {
      shared,
      cursor: ReadCursor {
        pos,
        auto_skip: options.auto_skip,
      },
      blocking: options.blocking,
      closed: AtomicBool::new(false),
    })
  }

  /// Closes this reader. Only the first call has an effect; later reads fail
  /// with [`ReadError::Closed`].
  pub fn close(&self) {
    if self.closed.swap(true, Ordering::AcqRel) {
      return;
    }
    self.shared.readers.done();
    debug!(
      position = self.cursor.pos.time(self.shared.capacity),
      "ring buffer reader closed"
    );
  }

  #[inline]
  pub fn is_closed(&self) -> bool {
    self.closed.load(Ordering::Acquire)
  }

  /// Moves this reader to the writer's edge, discarding everything not yet
  /// read.
  pub fn reset(&mut self) {
    self.cursor.pos = self.shared.state.read().edge;
  }

  /// Enables or disables skipping over overwritten data.
  ///
  /// With auto-skip a reader that fell behind jumps to the oldest valid
  /// element and keeps going, silently losing what it missed.
  pub fn set_auto_skip(&mut self, enabled: bool) {
    self.cursor.auto_skip = enabled;
  }

  #[inline]
  pub fn auto_skip(&self) -> bool {
    self.cursor.auto_skip
  }

  #[inline]
  pub fn is_blocking(&self) -> bool {
    self.blocking
  }

  /// This reader's position as a count of elements since the ring was
  /// created, comparable with
  /// [`RingBuffer::total_written`](crate::RingBuffer::total_written).
  pub fn position(&self) -> u64 {
    self.cursor.pos.time(self.shared.capacity)
  }

  /// Number of elements a read could return right now.
  ///
  /// A stale reader has nothing available unless auto-skip is enabled, in
  /// which case it would resume with a full lap.
  pub fn available(&self) -> usize {
    let capacity = self.shared.capacity;
    let edge = self.shared.state.read().edge;
    match self.cursor.pos.region(edge, capacity) {
      Region::Stale if self.cursor.auto_skip => capacity,
      Region::Stale | Region::Ahead => 0,
      Region::Behind { avail } => avail + edge.index,
      Region::Current { avail } => avail,
    }
  }

  /// `true` once the ring is closed and this reader has consumed everything.
  fn is_drained(&self) -> bool {
    let state = self.shared.state.read();
    state.closed && self.cursor.pos.is_caught_up(state.edge)
  }
}

impl<T: Clone> Reader<T> {
  /// Reads up to `dst.len()` elements into `dst` and returns how many were
  /// read.
  ///
  /// A read may return fewer elements than requested; when the unread data
  /// crosses the end of storage both pieces are combined into one count.
  ///
  /// # Errors
  ///
  /// - [`ReadError::EndOfData`] if there is nothing new. A blocking reader
  ///   waits instead, and only returns this once the ring is closed.
  /// - [`ReadError::Stale`] if unread data was overwritten and auto-skip is
  ///   off. Recover with [`set_auto_skip`](Self::set_auto_skip) or
  ///   [`reset`](Self::reset).
  /// - [`ReadError::Closed`] if this reader was closed.
  pub fn read(&mut self, dst: &mut [T]) -> Result<usize, ReadError> {
    self.read_until(dst, None)
  }

  /// Like [`read`](Self::read), but a blocking wait gives up after `timeout`
  /// with [`ReadError::Timeout`].
  pub fn read_timeout(&mut self, dst: &mut [T], timeout: Duration) -> Result<usize, ReadError> {
    self.read_until(dst, Instant::now().checked_add(timeout))
  }

  /// Reads a single element.
  ///
  /// # Errors
  ///
  /// Same as [`read`](Self::read).
  pub fn read_one(&mut self) -> Result<T, ReadError> {
    self.read_one_until(None)
  }

  /// Like [`read_one`](Self::read_one), with a bounded wait.
  pub fn read_one_timeout(&mut self, timeout: Duration) -> Result<T, ReadError> {
    self.read_one_until(Instant::now().checked_add(timeout))
  }

  fn read_until(&mut self, dst: &mut [T], deadline: Option<Instant>) -> Result<usize, ReadError> {
    if self.is_closed() {
      return Err(ReadError::Closed);
    }
    let capacity = self.shared.capacity;
    let state = wait_for_data(&self.shared, self.cursor.pos, self.blocking, deadline)?;
    self.cursor.read_into(&state, capacity, dst)
  }

  fn read_one_until(&mut self, deadline: Option<Instant>) -> Result<T, ReadError> {
    if self.is_closed() {
      return Err(ReadError::Closed);
    }
    let capacity = self.shared.capacity;
    let state = wait_for_data(&self.shared, self.cursor.pos, self.blocking, deadline)?;
    self.cursor.read_one(&state, capacity)
  }
}

impl<T> Drop for Reader<T> {
  fn drop(&mut self) {
    self.close();
  }
}

impl From<ReadError> for io::Error {
  fn from(err: ReadError) -> Self {
    let kind = match err {
      ReadError::EndOfData => io::ErrorKind::WouldBlock,
      ReadError::Closed => io::ErrorKind::BrokenPipe,
      ReadError::Timeout => io::ErrorKind::TimedOut,
      ReadError::Stale | ReadError::ReaderAhead => io::ErrorKind::Other,
    };
    io::Error::new(kind, err)
  }
}

/// Byte-stream view of the ring. Returns `Ok(0)` only once the ring is
/// closed and fully read; "nothing yet" on an open ring is
/// [`io::ErrorKind::WouldBlock`].
impl io::Read for Reader<u8> {
  fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
    if buf.is_empty() {
      return Ok(0);
    }
    match Reader::read(self, buf) {
      Ok(n) => Ok(n),
      Err(ReadError::EndOfData) if self.is_drained() => Ok(0),
      Err(err) => Err(err.into()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::RingBuffer;

  #[test]
  fn read_one_crosses_wrap() {
    let ring = RingBuffer::new(4).unwrap();
    let mut reader = ring.reader().unwrap();
    ring.write(&[1, 2, 3]).unwrap();
    assert_eq!(reader.read_one(), Ok(1));
    ring.write(&[4, 5]).unwrap();
    // Edge is now lap 1, index 1; the reader is one lap behind at index 1.
    assert_eq!(reader.read_one(), Ok(2));
    assert_eq!(reader.read_one(), Ok(3));
    assert_eq!(reader.read_one(), Ok(4));
    assert_eq!(reader.read_one(), Ok(5));
    assert_eq!(reader.read_one(), Err(ReadError::EndOfData));
    ring.write(&[6, 7, 8, 9, 10]).unwrap();
    assert_eq!(reader.read_one(), Err(ReadError::Stale));
  }

  #[test]
  fn empty_destination_reads_nothing() {
    let ring = RingBuffer::new(4).unwrap();
    let mut reader = ring.reader().unwrap();
    ring.write(&[1, 2]).unwrap();
    let mut dst: [i32; 0] = [];
    assert_eq!(reader.read(&mut dst), Ok(0));
    assert_eq!(reader.position(), 0);
  }

  #[test]
  fn available_tracks_unread_elements() {
    let ring = RingBuffer::new(4).unwrap();
    let mut reader = ring.reader().unwrap();
    assert_eq!(reader.available(), 0);
    ring.write(&[1, 2, 3]).unwrap();
    assert_eq!(reader.available(), 3);
    ring.write(&[4]).unwrap();
    assert_eq!(reader.available(), 4);
    ring.write(&[5]).unwrap();
    assert_eq!(reader.available(), 0);
    reader.set_auto_skip(true);
    assert_eq!(reader.available(), 4);
  }

  #[test]
  fn auto_skip_resumes_one_lap_behind_edge() {
    let ring = RingBuffer::new(4).unwrap();
    let mut reader = ring.reader_builder().auto_skip(true).build().unwrap();
    ring.write(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]).unwrap();
    let mut dst = [0; 8];
    assert_eq!(reader.read(&mut dst), Ok(4));
    assert_eq!(&dst[..4], &[7, 8, 9, 10]);
    assert_eq!(reader.position(), 10);
  }

  #[test]
  fn io_read_maps_end_of_data() {
    use std::io::Read;

    let ring = RingBuffer::<u8>::new(8).unwrap();
    let mut reader = ring.reader().unwrap();
    let mut buf = [0u8; 8];

    let err = Read::read(&mut reader, &mut buf).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::WouldBlock);

    ring.write(b"abc").unwrap();
    assert_eq!(Read::read(&mut reader, &mut buf).unwrap(), 3);

    // Closing the ring blocks until the reader is gone, so mark it closed
    // the way a dropped ring does.
    drop(ring);
    assert_eq!(Read::read(&mut reader, &mut buf).unwrap(), 0);
  }

  #[test]
  fn close_is_idempotent() {
    let ring = RingBuffer::<u8>::new(2).unwrap();
    let reader = ring.reader().unwrap();
    assert_eq!(ring.live_readers(), 1);
    reader.close();
    reader.close();
    assert_eq!(ring.live_readers(), 0);
    drop(reader);
    assert_eq!(ring.live_readers(), 0);
  }
}
