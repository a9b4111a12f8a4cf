//! One-shot join primitive for a fixed batch of background jobs.
//!
//! A [`CompletionBarrier`] is created with the number of jobs about to
//! be dispatched. Each job calls [`done`](CompletionBarrier::done)
//! exactly once, from any thread; the dispatching thread calls
//! [`wait`](CompletionBarrier::wait) and blocks until every job has
//! signalled. The barrier is single-use and has no timeout, so callers
//! must ensure jobs cannot hang indefinitely.

use std::sync::{Condvar, Mutex};

/// Counts down dispatched jobs and releases a blocked waiter at zero.
pub struct CompletionBarrier {
  remaining: Mutex<usize>,
  released: Condvar,
}

impl CompletionBarrier {
  /// Creates a barrier expecting `jobs` completion signals.
  pub fn new(jobs: usize) -> Self {
    Self {
      remaining: Mutex::new(jobs),
      released: Condvar::new(),
    }
  }

  /// Signals that one job has completed.
  ///
  /// Must be called exactly once per dispatched job. Extra calls are a
  /// programming error; they trip a debug assertion and saturate at
  /// zero in release builds.
  pub fn done(&self) {
    let mut remaining = self.remaining.lock().expect("barrier lock poisoned");
    debug_assert!(
      *remaining > 0,
      "done() called more times than jobs dispatched"
    );
    *remaining = remaining.saturating_sub(1);
    if *remaining == 0 {
      self.released.notify_all();
    }
  }

  /// Blocks the calling thread until every job has signalled.
  ///
  /// Returns immediately if the barrier was created with zero jobs or
  /// all jobs already completed.
  pub fn wait(&self) {
    let mut remaining = self.remaining.lock().expect("barrier lock poisoned");
    while *remaining > 0 {
      remaining = self
        .released
        .wait(remaining)
        .expect("barrier lock poisoned");
    }
  }
}
