// src/position.rs

//! Positions in the ring expressed as `(lap, index)` pairs.
//!
//! Nothing in the crate holds a reference into the storage array. A reader
//! only remembers where it is, and whether that spot is still readable is a
//! pure comparison against the writer's edge.

/// A position in the ring's history.
///
/// `index` is always in `[0, capacity)`; `lap` counts how many times the
/// index wrapped. Together they form the "buffer time"
/// `lap * capacity + index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Position {
  pub(crate) lap: u64,
  pub(crate) index: usize,
}

/// Where a reader stands relative to the writer's edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Region {
  /// The reader's data has been overwritten.
  Stale,
  /// One lap behind and still valid: `avail` elements remain until the end
  /// of storage.
  Behind { avail: usize },
  /// Same lap as the writer: `avail` elements are written but unread.
  Current { avail: usize },
  /// Further along than the writer. Never legitimately reached.
  Ahead,
}

impl Position {
  pub(crate) const fn new(lap: u64, index: usize) -> Self {
    Self { lap, index }
  }

  /// Builds a position from a buffer time.
  pub(crate) fn from_time(time: u64, capacity: usize) -> Self {
    let cap = capacity as u64;
    Self {
      lap: time / cap,
      index: (time % cap) as usize,
    }
  }

  pub(crate) fn time(&self, capacity: usize) -> u64 {
    self.lap * capacity as u64 + self.index as u64
  }

  /// The oldest position still guaranteed valid when `self` is the writer's
  /// edge: one lap back, or the very start if the first lap isn't done.
  pub(crate) fn oldest_valid(&self) -> Self {
    match self.lap.checked_sub(1) {
      Some(lap) => Self::new(lap, self.index),
      None => Self::new(0, 0),
    }
  }

  /// Moves forward by `n` elements. Callers never advance across more than
  /// the end of storage at once.
  pub(crate) fn advance(&mut self, n: usize, capacity: usize) {
    debug_assert!(self.index + n <= capacity);
    self.index += n;
    if self.index >= capacity {
      self.index = 0;
      self.lap += 1;
    }
  }

  /// Classifies this (reader) position against the writer's `edge`.
  pub(crate) fn region(&self, edge: Position, capacity: usize) -> Region {
    if self.lap > edge.lap {
      return Region::Ahead;
    }
    if self.lap == edge.lap {
      return Region::Current {
        avail: edge.index.saturating_sub(self.index),
      };
    }
    if self.lap + 1 == edge.lap && self.index >= edge.index {
      return Region::Behind {
        avail: capacity - self.index,
      };
    }
    Region::Stale
  }

  /// `true` when the reader has consumed everything the writer produced.
  pub(crate) fn is_caught_up(&self, edge: Position) -> bool {
    self.lap == edge.lap && self.index >= edge.index
  }
}
