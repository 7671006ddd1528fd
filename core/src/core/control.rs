// pipestream/src/core/control.rs

//! Cancellation signal shared between a running pipeline and whoever wraps it.

use futures_util::task::AtomicWaker;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::Waker;

#[derive(Debug, Default)]
struct HandleInner {
  cancelled: AtomicBool,
  emitted: AtomicUsize,
  waker: AtomicWaker,
}

/// Per-run cancellation token and emission counter.
///
/// Clones share the same run. `cancel()` is synchronous, idempotent and
/// irrevocable; it wakes the run so an in-flight step is released even when
/// nothing else would poll it again.
#[derive(Debug, Clone, Default)]
pub struct ExecutionHandle {
  inner: Arc<HandleInner>,
}

impl ExecutionHandle {
  pub fn new() -> Self {
    Self::default()
  }

  /// Stops the run. Returns `true` only for the call that actually cancelled.
  pub fn cancel(&self) -> bool {
    let first = !self.inner.cancelled.swap(true, Ordering::AcqRel);
    if first {
      self.inner.waker.wake();
    }
    first
  }

  pub fn is_cancelled(&self) -> bool {
    self.inner.cancelled.load(Ordering::Acquire)
  }

  /// Number of values the run has delivered downstream so far.
  pub fn emitted(&self) -> usize {
    self.inner.emitted.load(Ordering::Acquire)
  }

  pub(crate) fn register(&self, waker: &Waker) {
    self.inner.waker.register(waker);
  }

  pub(crate) fn record_emission(&self) {
    self.inner.emitted.fetch_add(1, Ordering::AcqRel);
  }
}

/// How a run ended, as seen from its [`ExecutionHandle`] holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
  /// Every step ran and its source was exhausted.
  Completed,
  /// A step failed; exactly one failure was emitted.
  Failed,
  /// The run was cancelled before it could finish.
  Cancelled,
}
