// pipestream/src/projector/state.rs

//! The four lifecycle states a projector publishes, and the action handles
//! they carry.

use crate::core::control::ExecutionHandle;
use crate::error::PipestreamError;
use crate::projector::lifecycle::{ProjectorCore, RunId};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

pub(crate) type WeakCore<V> = Weak<Mutex<ProjectorCore<V>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamStatus {
  Ready,
  InProgress,
  Done,
  Error,
}

/// Externally observed state of a [`LifecycleProjector`](crate::LifecycleProjector).
pub enum StreamResult<V> {
  /// No run is active.
  Ready,
  /// Latest emission of the running pipeline.
  InProgress { value: V, abort: AbortHandle<V> },
  /// The run completed; `value` is its last emission.
  Done { value: V, clear: ClearHandle<V> },
  /// The run failed with `error`.
  Error {
    error: Arc<PipestreamError>,
    clear: ClearHandle<V>,
  },
}

impl<V> StreamResult<V> {
  pub fn status(&self) -> StreamStatus {
    match self {
      StreamResult::Ready => StreamStatus::Ready,
      StreamResult::InProgress { .. } => StreamStatus::InProgress,
      StreamResult::Done { .. } => StreamStatus::Done,
      StreamResult::Error { .. } => StreamStatus::Error,
    }
  }

  /// Value of an `InProgress` or `Done` state.
  pub fn value(&self) -> Option<&V> {
    match self {
      StreamResult::InProgress { value, .. } | StreamResult::Done { value, .. } => Some(value),
      _ => None,
    }
  }

  pub fn error(&self) -> Option<&Arc<PipestreamError>> {
    match self {
      StreamResult::Error { error, .. } => Some(error),
      _ => None,
    }
  }

  pub fn is_terminal(&self) -> bool {
    matches!(self, StreamResult::Done { .. } | StreamResult::Error { .. })
  }

  /// Aborts the run behind an `InProgress` state. No-op in any other state.
  pub fn abort(&self) -> bool {
    match self {
      StreamResult::InProgress { abort, .. } => abort.abort(),
      _ => false,
    }
  }

  /// Returns a `Done` or `Error` state to `Ready`. No-op in any other state.
  pub fn clear(&self) -> bool {
    match self {
      StreamResult::Done { clear, .. } | StreamResult::Error { clear, .. } => clear.clear(),
      _ => false,
    }
  }
}

impl<V: Clone> Clone for StreamResult<V> {
  fn clone(&self) -> Self {
    match self {
      StreamResult::Ready => StreamResult::Ready,
      StreamResult::InProgress { value, abort } => StreamResult::InProgress {
        value: value.clone(),
        abort: abort.clone(),
      },
      StreamResult::Done { value, clear } => StreamResult::Done {
        value: value.clone(),
        clear: clear.clone(),
      },
      StreamResult::Error { error, clear } => StreamResult::Error {
        error: Arc::clone(error),
        clear: clear.clone(),
      },
    }
  }
}

impl<V: std::fmt::Debug> std::fmt::Debug for StreamResult<V> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      StreamResult::Ready => f.write_str("Ready"),
      StreamResult::InProgress { value, .. } => f.debug_struct("InProgress").field("value", value).finish(),
      StreamResult::Done { value, .. } => f.debug_struct("Done").field("value", value).finish(),
      StreamResult::Error { error, .. } => f.debug_struct("Error").field("error", error).finish(),
    }
  }
}

/// Cancels one specific run. Stale handles (the run already ended or was
/// superseded) do nothing.
pub struct AbortHandle<V> {
  core: WeakCore<V>,
  run: RunId,
  handle: ExecutionHandle,
}

impl<V> AbortHandle<V> {
  pub(crate) fn new(core: WeakCore<V>, run: RunId, handle: ExecutionHandle) -> Self {
    Self { core, run, handle }
  }

  pub fn run_id(&self) -> RunId {
    self.run
  }

  /// Returns `true` if this call moved the run to `Ready`.
  pub fn abort(&self) -> bool {
    match self.core.upgrade() {
      Some(core) => ProjectorCore::abort_run(&core, self.run),
      None => {
        self.handle.cancel();
        false
      }
    }
  }
}

impl<V> Clone for AbortHandle<V> {
  fn clone(&self) -> Self {
    Self {
      core: Weak::clone(&self.core),
      run: self.run,
      handle: self.handle.clone(),
    }
  }
}

impl<V> std::fmt::Debug for AbortHandle<V> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("AbortHandle").field("run", &self.run).finish()
  }
}

/// Resets the terminal state of one specific run back to `Ready`.
pub struct ClearHandle<V> {
  core: WeakCore<V>,
  run: RunId,
}

impl<V> ClearHandle<V> {
  pub(crate) fn new(core: WeakCore<V>, run: RunId) -> Self {
    Self { core, run }
  }

  pub fn run_id(&self) -> RunId {
    self.run
  }

  pub fn clear(&self) -> bool {
    self
      .core
      .upgrade()
      .is_some_and(|core| ProjectorCore::clear_settled(&core, self.run))
  }
}

impl<V> Clone for ClearHandle<V> {
  fn clone(&self) -> Self {
    Self {
      core: Weak::clone(&self.core),
      run: self.run,
    }
  }
}

impl<V> std::fmt::Debug for ClearHandle<V> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ClearHandle").field("run", &self.run).finish()
  }
}
