//! Blocking helpers shared by the ring and its readers.
//!
//! `WakeSignal` is the broadcast readers park on while caught up with the
//! writer. `ReaderGroup` counts live readers so the ring's `close` can wait
//! for all of them to finish.

use std::fmt;
use std::time::Instant;

use parking_lot::{Condvar, Mutex, MutexGuard};

/// A broadcast wake-up signal.
///
/// A waiter must take the [`WakeSignal::arm`] guard *before* releasing the
/// lock it used to check its wait condition. A notifier needs the same guard
/// to broadcast, so a notification can't slip in between the check and the
/// wait.
pub(crate) struct WakeSignal {
  lock: Mutex<()>,
  cond: Condvar,
}

impl fmt::Debug for WakeSignal {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("WakeSignal").finish_non_exhaustive()
  }
}

impl WakeSignal {
  pub(crate) fn new() -> Self {
    Self {
      lock: Mutex::new(()),
      cond: Condvar::new(),
    }
  }

  #[inline]
  pub(crate) fn arm(&self) -> MutexGuard<'_, ()> {
    self.lock.lock()
  }

  /// Parks until notified or until `deadline` passes. Returns `false` if the
  /// deadline passed.
  ///
  /// The guard is released on return; callers must not hold it while taking
  /// any other lock.
  pub(crate) fn wait(&self, mut armed: MutexGuard<'_, ()>, deadline: Option<Instant>) -> bool {
    match deadline {
      Some(deadline) => !self.cond.wait_until(&mut armed, deadline).timed_out(),
      None => {
        self.cond.wait(&mut armed);
        true
      }
    }
  }

  /// Wakes every parked waiter.
  pub(crate) fn notify_all(&self) -> usize {
    let _armed = self.lock.lock();
    self.cond.notify_all()
  }
}

/// Counts live readers and lets one thread wait for the count to hit zero.
pub(crate) struct ReaderGroup {
  live: Mutex<usize>,
  drained: Condvar,
}

impl fmt::Debug for ReaderGroup {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ReaderGroup")
      .field("live", &*self.live.lock())
      .finish()
  }
}

impl ReaderGroup {
  pub(crate) fn new() -> Self {
    Self {
      live: Mutex::new(0),
      drained: Condvar::new(),
    }
  }

  pub(crate) fn add(&self) {
    *self.live.lock() += 1;
  }

  /// Must be called exactly once per `add`.
  pub(crate) fn done(&self) {
    let mut live = self.live.lock();
    debug_assert!(*live > 0, "ReaderGroup::done without matching add");
    *live = live.saturating_sub(1);
    if *live == 0 {
      self.drained.notify_all();
    }
  }

  pub(crate) fn live(&self) -> usize {
    *self.live.lock()
  }

  /// Blocks until every added reader is done.
  pub(crate) fn wait(&self) {
    let mut live = self.live.lock();
    while *live > 0 {
      self.drained.wait(&mut live);
    }
  }
}
