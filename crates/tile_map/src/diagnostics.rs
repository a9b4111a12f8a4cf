//! Pass timing diagnostics.
//!
//! A small ring buffer of recent compositing pass durations, enough for
//! an embedding UI to show "map redraw: 3.1ms avg / 12ms max" without
//! dragging a metrics stack into the core.

use std::collections::VecDeque;
use std::time::Duration;

/// Ring buffer of recent durations with running statistics.
#[derive(Debug)]
pub struct TimeSeries {
  samples: VecDeque<Duration>,
  capacity: usize,
  sum: Duration,
}

impl TimeSeries {
  /// Creates a series keeping the most recent `capacity` samples.
  pub fn new(capacity: usize) -> Self {
    assert!(capacity > 0, "time series capacity must be non-zero");
    Self {
      samples: VecDeque::with_capacity(capacity),
      capacity,
      sum: Duration::ZERO,
    }
  }

  /// Records a sample, evicting the oldest once at capacity.
  pub fn record(&mut self, sample: Duration) {
    if self.samples.len() == self.capacity
      && let Some(evicted) = self.samples.pop_front()
    {
      self.sum -= evicted;
    }
    self.samples.push_back(sample);
    self.sum += sample;
  }

  /// Most recent sample.
  pub fn last(&self) -> Option<Duration> {
    self.samples.back().copied()
  }

  /// Average over the retained window.
  pub fn avg(&self) -> Duration {
    if self.samples.is_empty() {
      Duration::ZERO
    } else {
      self.sum / self.samples.len() as u32
    }
  }

  /// Minimum over the retained window.
  pub fn min(&self) -> Option<Duration> {
    self.samples.iter().min().copied()
  }

  /// Maximum over the retained window.
  pub fn max(&self) -> Option<Duration> {
    self.samples.iter().max().copied()
  }

  /// Number of retained samples.
  pub fn len(&self) -> usize {
    self.samples.len()
  }

  /// Returns true if nothing has been recorded yet.
  pub fn is_empty(&self) -> bool {
    self.samples.is_empty()
  }
}
