//! Keyed debounce scheduler.
//!
//! Many independent producers can signal "this key changed" far faster
//! than it is useful to react. A [`Debouncer`] coalesces those bursts
//! into a single deferred callback per key: every
//! [`push`](Debouncer::push) defers the key by a quiet period (`step`),
//! and repeated pushes keep deferring it, but never past a hard ceiling
//! (`max`) measured from the first push. Quietness gives responsiveness
//! under noise; the ceiling bounds staleness under continuous
//! signalling.
//!
//! A dedicated worker thread sleeps until the earliest tracked deadline
//! and fires callbacks with the queue lock released, so a callback may
//! safely push back into the same debouncer. The sleep is an
//! interruptible wait on a bounded wake channel; registering a sooner
//! deadline wakes the worker early instead of waiting out the old one.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};

/// Per-key deadline state.
///
/// Invariant: `next <= limit` at all times.
struct Delay {
  next: Instant,
  limit: Instant,
}

impl Delay {
  fn new(now: Instant, step: Duration, max: Duration) -> Self {
    Self {
      next: now + step,
      limit: now + max,
    }
  }

  /// Pushes the deadline out by `step`, never past the hard limit.
  fn touch(&mut self, now: Instant, step: Duration) {
    self.next = (now + step).min(self.limit);
  }
}

struct Queue<K> {
  entries: HashMap<K, Delay>,
  /// Earliest deadline the worker is currently sleeping toward.
  /// `None` while the queue is idle.
  next_wake: Option<Instant>,
  closed: bool,
}

struct Shared<K> {
  queue: Mutex<Queue<K>>,
  wake: Sender<()>,
  step: Duration,
  max: Duration,
  callback: Box<dyn Fn(K) + Send + Sync>,
}

impl<K: Eq + Hash + Clone> Shared<K> {
  /// Collects every key due at `cutoff` (all keys for `None`), removes
  /// them from the queue, recomputes the next wake instant, then fires
  /// the callback once per collected key with the lock released.
  fn collect(&self, cutoff: Option<Instant>) {
    let due: Vec<K> = {
      let mut queue = self.queue.lock().expect("debounce queue lock poisoned");
      let mut due = Vec::new();
      queue.entries.retain(|key, delay| {
        let fire = cutoff.is_none_or(|cutoff| delay.next <= cutoff);
        if fire {
          due.push(key.clone());
        }
        !fire
      });
      queue.next_wake = queue.entries.values().map(|delay| delay.next).min();
      due
    };

    for key in due {
      // A failing callback must not starve other keys or kill the
      // worker; the compositor makes the opposite choice and lets
      // failures surface.
      let outcome = panic::catch_unwind(AssertUnwindSafe(|| (self.callback)(key)));
      if let Err(payload) = outcome {
        log::error!("debounce callback panicked: {}", panic_message(&payload));
      }
    }
  }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
  if let Some(message) = payload.downcast_ref::<&str>() {
    message
  } else if let Some(message) = payload.downcast_ref::<String>() {
    message
  } else {
    "<non-string panic payload>"
  }
}

/// Coalesces repeated per-key signals into one deferred callback each.
///
/// Owns a worker thread for the lifetime of the value; dropping the
/// debouncer discards pending keys and joins the worker. Call
/// [`flush`](Debouncer::flush) first when pending keys must still be
/// delivered at shutdown.
pub struct Debouncer<K: Eq + Hash + Clone + Send + 'static> {
  shared: Arc<Shared<K>>,
  worker: Option<JoinHandle<()>>,
}

impl<K: Eq + Hash + Clone + Send + 'static> Debouncer<K> {
  /// Creates a debouncer firing `callback` once per settled key.
  ///
  /// `step` is the quiet period after the last push; `max` is the hard
  /// ceiling from the first push.
  ///
  /// # Panics
  /// Panics if `step` is zero or exceeds `max`.
  pub fn new<F>(step: Duration, max: Duration, callback: F) -> Self
  where
    F: Fn(K) + Send + Sync + 'static,
  {
    assert!(!step.is_zero(), "debounce step must be non-zero");
    assert!(step <= max, "debounce step must not exceed the hard limit");

    // bounded(1) so back-to-back pushes coalesce into one wake-up.
    let (wake_tx, wake_rx) = bounded(1);
    let shared = Arc::new(Shared {
      queue: Mutex::new(Queue {
        entries: HashMap::new(),
        next_wake: None,
        closed: false,
      }),
      wake: wake_tx,
      step,
      max,
      callback: Box::new(callback),
    });

    let worker = {
      let shared = Arc::clone(&shared);
      thread::Builder::new()
        .name("tile-map-debounce".into())
        .spawn(move || run_worker(shared, wake_rx))
        .expect("failed to spawn debounce worker thread")
    };

    Self {
      shared,
      worker: Some(worker),
    }
  }

  /// Registers or refreshes interest in `key`.
  ///
  /// New keys settle after `step` of quiet; keys pushed again keep
  /// getting deferred up to their hard limit. If this produces a sooner
  /// deadline than the worker is sleeping toward, the worker is woken
  /// immediately.
  pub fn push(&self, key: K) {
    let sooner = {
      let mut queue = self
        .shared
        .queue
        .lock()
        .expect("debounce queue lock poisoned");
      let now = Instant::now();
      let next = match queue.entries.entry(key) {
        Entry::Occupied(mut entry) => {
          let delay = entry.get_mut();
          delay.touch(now, self.shared.step);
          delay.next
        }
        Entry::Vacant(entry) => {
          entry
            .insert(Delay::new(now, self.shared.step, self.shared.max))
            .next
        }
      };
      let sooner = queue.next_wake.is_none_or(|wake| next < wake);
      if sooner {
        queue.next_wake = Some(next);
      }
      sooner
    };

    if sooner {
      // Full channel means a wake-up is already pending; that one will
      // observe the updated deadline.
      let _ = self.shared.wake.try_send(());
    }
  }

  /// Cancels pending interest in `key`. Returns whether a pending entry
  /// was actually removed.
  pub fn remove(&self, key: &K) -> bool {
    let mut queue = self
      .shared
      .queue
      .lock()
      .expect("debounce queue lock poisoned");
    // next_wake is left as-is; a spurious wake-up just rescans.
    queue.entries.remove(key).is_some()
  }

  /// Cancels all pending interest.
  pub fn clear(&self) {
    let mut queue = self
      .shared
      .queue
      .lock()
      .expect("debounce queue lock poisoned");
    queue.entries.clear();
  }

  /// Fires the callback for every pending key regardless of deadlines.
  ///
  /// Used at shutdown so signals received moments before teardown are
  /// not lost.
  pub fn flush(&self) {
    self.shared.collect(None);
  }

  /// Number of keys currently pending.
  pub fn len(&self) -> usize {
    self
      .shared
      .queue
      .lock()
      .expect("debounce queue lock poisoned")
      .entries
      .len()
  }

  /// Returns true if no keys are pending.
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl<K: Eq + Hash + Clone + Send + 'static> Drop for Debouncer<K> {
  fn drop(&mut self) {
    {
      let mut queue = self
        .shared
        .queue
        .lock()
        .expect("debounce queue lock poisoned");
      queue.closed = true;
    }
    let _ = self.shared.wake.try_send(());
    if let Some(worker) = self.worker.take() {
      let _ = worker.join();
    }
  }
}

/// Worker loop: sleep until the tracked wake instant (indefinitely when
/// idle), pop due keys, repeat. A push with a sooner deadline interrupts
/// the sleep through the wake channel.
fn run_worker<K: Eq + Hash + Clone + Send>(shared: Arc<Shared<K>>, wake: Receiver<()>) {
  loop {
    let deadline = {
      let queue = shared.queue.lock().expect("debounce queue lock poisoned");
      if queue.closed {
        return;
      }
      queue.next_wake
    };

    match deadline {
      Some(at) => {
        let now = Instant::now();
        if at <= now {
          shared.collect(Some(now));
          continue;
        }
        match wake.recv_timeout(at - now) {
          // Deadlines changed; recompute the sleep.
          Ok(()) => {}
          Err(RecvTimeoutError::Timeout) => shared.collect(Some(Instant::now())),
          Err(RecvTimeoutError::Disconnected) => return,
        }
      }
      None => {
        // Idle: nothing pending, wait for the first push.
        if wake.recv().is_err() {
          return;
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::mpsc;

  use super::*;

  const STEP: Duration = Duration::from_millis(50);
  const MAX: Duration = Duration::from_millis(200);

  fn debouncer() -> (Debouncer<u32>, mpsc::Receiver<u32>) {
    let (tx, rx) = mpsc::channel();
    let debouncer = Debouncer::new(STEP, MAX, move |key| {
      tx.send(key).unwrap();
    });
    (debouncer, rx)
  }

  #[test]
  fn touch_never_passes_hard_limit() {
    let now = Instant::now();
    let mut delay = Delay::new(now, STEP, MAX);
    assert_eq!(delay.next, now + STEP);
    assert_eq!(delay.limit, now + MAX);

    delay.touch(now + Duration::from_millis(180), STEP);
    assert_eq!(delay.next, delay.limit);
  }

  #[test]
  fn fires_once_after_quiet_period() {
    let (debouncer, rx) = debouncer();
    let pushed = Instant::now();
    debouncer.push(7);

    let key = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(key, 7);
    assert!(pushed.elapsed() >= STEP);

    // Settled keys are removed; no duplicate firing.
    assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
    assert!(debouncer.is_empty());
  }

  #[test]
  fn repeated_pushes_coalesce() {
    let (debouncer, rx) = debouncer();
    for _ in 0..4 {
      debouncer.push(1);
      thread::sleep(Duration::from_millis(15));
    }
    assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 1);
    assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
  }

  #[test]
  fn continuous_pushes_hit_hard_limit() {
    let (debouncer, rx) = debouncer();
    let first = Instant::now();
    // Push faster than STEP for longer than MAX; the hard limit must
    // force a firing despite the noise.
    debouncer.push(3);
    while first.elapsed() < MAX + Duration::from_millis(50) {
      debouncer.push(3);
      thread::sleep(Duration::from_millis(10));
    }
    rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert!(first.elapsed() >= MAX);
  }

  #[test]
  fn distinct_keys_fire_independently() {
    let (debouncer, rx) = debouncer();
    debouncer.push(1);
    debouncer.push(2);
    debouncer.push(3);

    let mut keys = Vec::new();
    for _ in 0..3 {
      keys.push(rx.recv_timeout(Duration::from_secs(2)).unwrap());
    }
    keys.sort_unstable();
    assert_eq!(keys, vec![1, 2, 3]);
    assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
  }

  #[test]
  fn remove_cancels_pending_key() {
    let (debouncer, rx) = debouncer();
    debouncer.push(9);
    assert!(debouncer.remove(&9));
    assert!(!debouncer.remove(&9));
    assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
  }

  #[test]
  fn clear_cancels_everything() {
    let (debouncer, rx) = debouncer();
    debouncer.push(1);
    debouncer.push(2);
    debouncer.clear();
    assert!(debouncer.is_empty());
    assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
  }

  #[test]
  fn flush_delivers_immediately() {
    let (debouncer, rx) = debouncer();
    debouncer.push(4);
    debouncer.push(5);
    debouncer.flush();
    let mut keys = vec![
      rx.recv_timeout(Duration::from_millis(100)).unwrap(),
      rx.recv_timeout(Duration::from_millis(100)).unwrap(),
    ];
    keys.sort_unstable();
    assert_eq!(keys, vec![4, 5]);
  }

  #[test]
  fn panicking_callback_does_not_kill_worker() {
    let (tx, rx) = mpsc::channel();
    let debouncer = Debouncer::new(STEP, MAX, move |key: u32| {
      if key == 13 {
        panic!("boom");
      }
      tx.send(key).unwrap();
    });

    debouncer.push(13);
    // Give the poisoned key time to fire (and be swallowed).
    thread::sleep(STEP + Duration::from_millis(50));
    debouncer.push(42);
    assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 42);
  }

  #[test]
  fn callback_may_push_back_into_the_debouncer() {
    let (tx, rx) = mpsc::channel();
    let slot: Arc<Mutex<Option<Debouncer<u32>>>> = Arc::new(Mutex::new(None));
    let debouncer = {
      let slot = Arc::clone(&slot);
      Debouncer::new(STEP, MAX, move |key: u32| {
        tx.send(key).unwrap();
        if key == 1
          && let Some(debouncer) = slot.lock().unwrap().as_ref()
        {
          debouncer.push(2);
        }
      })
    };
    debouncer.push(1);
    *slot.lock().unwrap() = Some(debouncer);

    assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 1);
    assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 2);

    // Drop the debouncer outside the slot lock.
    let debouncer = slot.lock().unwrap().take();
    drop(debouncer);
  }
}
