// pipestream/src/pipeline/execution.rs

//! Contains `Emissions`, the stream returned by `Pipeline::invoke()`, and the
//! per-invocation `Run` it drives.

use crate::core::control::{ExecutionHandle, RunOutcome};
use crate::core::erased::{AnyValue, Carried, CarriedSource};
use crate::error::{PipestreamError, PipestreamResult};
use crate::pipeline::definition::StepList;
use futures_util::stream::{FusedStream, Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::{event, span, Level, Span};

/// Mutable state of one invocation. Owned by its `Emissions`.
struct Run<E> {
  steps: StepList<E>,
  /// `None` until the first step has been called.
  step_index: Option<usize>,
  initial: Option<AnyValue>,
  /// Last value of the current step; the next step's input.
  latest: Option<AnyValue>,
  current: Option<CarriedSource<E>>,
  handle: ExecutionHandle,
  outcome: Option<RunOutcome>,
}

impl<E: Send + 'static> Run<E> {
  fn poll_step(&mut self, cx: &mut Context<'_>) -> Poll<Option<PipestreamResult<E>>> {
    loop {
      if self.outcome.is_some() {
        return Poll::Ready(None);
      }

      self.handle.register(cx.waker());
      if self.handle.is_cancelled() {
        event!(Level::DEBUG, step_index = ?self.step_index, "Run cancelled, dropping in-flight step.");
        self.finish(RunOutcome::Cancelled);
        return Poll::Ready(None);
      }

      let Some(current) = self.current.as_mut() else {
        match self.advance() {
          Ok(true) => continue,
          Ok(false) => {
            event!(Level::DEBUG, "Run completed.");
            self.finish(RunOutcome::Completed);
            return Poll::Ready(None);
          }
          Err(e) => {
            event!(Level::ERROR, error = %e, "Run failed while advancing.");
            self.finish(RunOutcome::Failed);
            return Poll::Ready(Some(Err(e)));
          }
        }
      };

      match current.poll_next_unpin(cx) {
        Poll::Pending => return Poll::Pending,
        Poll::Ready(Some(Ok(Carried { emitted, value }))) => {
          self.latest = Some(value);
          self.handle.record_emission();
          event!(Level::TRACE, step_index = ?self.step_index, "Step emitted a value.");
          return Poll::Ready(Some(Ok(emitted)));
        }
        Poll::Ready(Some(Err(source))) => {
          let step_index = self.step_index.unwrap_or_default();
          let error = PipestreamError::StepFailed { step_index, source };
          event!(Level::ERROR, error = %error, "Step failed.");
          self.finish(RunOutcome::Failed);
          return Poll::Ready(Some(Err(error)));
        }
        Poll::Ready(None) => {
          event!(Level::TRACE, step_index = ?self.step_index, "Step source exhausted.");
          self.current = None;
        }
      }
    }
  }

  /// Calls the next step. `Ok(false)` means every step has run.
  fn advance(&mut self) -> PipestreamResult<bool> {
    if let Some(finished) = self.step_index {
      if self.latest.is_none() {
        return Err(PipestreamError::EmptyEmission { step_index: finished });
      }
    }

    let next = self.step_index.map_or(0, |i| i + 1);
    let Some(step) = self.steps.get(next).cloned() else {
      return Ok(false);
    };

    let input = if next == 0 { self.initial.take() } else { self.latest.take() };
    let input = input.ok_or_else(|| PipestreamError::Internal(format!("no input available for step {next}")))?;

    self.step_index = Some(next);
    event!(Level::DEBUG, step_index = next, input_type = step.input_type(), "Advancing to step.");
    self.current = Some(step.call(input, next)?);
    Ok(true)
  }

  fn finish(&mut self, outcome: RunOutcome) {
    self.current = None;
    self.outcome = Some(outcome);
  }
}

impl<E> Drop for Run<E> {
  fn drop(&mut self) {
    // Dropping an unfinished run is an unsubscribe.
    if self.outcome.is_none() {
      self.handle.cancel();
    }
  }
}

/// Stream of every value emitted during one pipeline run.
///
/// Yields `Ok` for each emission in order. Ends with `None` after the last
/// step completes, or after a single `Err` when a step fails. A cancelled
/// run ends with `None` without further emissions; use [`Emissions::outcome`]
/// to tell it apart from completion.
pub struct Emissions<E> {
  run: Run<E>,
  span: Span,
}

impl<E: Send + 'static> Emissions<E> {
  pub(crate) fn new(name: Option<Arc<str>>, steps: StepList<E>, input: AnyValue) -> Self {
    let span = span!(
      Level::DEBUG,
      "pipeline_run",
      pipeline = name.as_deref().unwrap_or("anonymous"),
      num_steps = steps.len()
    );
    Self {
      run: Run {
        steps,
        step_index: None,
        initial: Some(input),
        latest: None,
        current: None,
        handle: ExecutionHandle::new(),
        outcome: None,
      },
      span,
    }
  }

  /// Handle that cancels this run from elsewhere.
  pub fn handle(&self) -> ExecutionHandle {
    self.run.handle.clone()
  }

  pub fn cancel(&self) -> bool {
    self.run.handle.cancel()
  }

  /// `None` while the run is still going.
  pub fn outcome(&self) -> Option<RunOutcome> {
    self.run.outcome
  }

  /// Index of the step currently running, `None` before the first poll.
  pub fn step_index(&self) -> Option<usize> {
    self.run.step_index
  }
}

impl<E: Send + 'static> Stream for Emissions<E> {
  type Item = PipestreamResult<E>;

  fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    let this = self.get_mut();
    let _entered = this.span.enter();
    this.run.poll_step(cx)
  }
}

impl<E: Send + 'static> FusedStream for Emissions<E> {
  fn is_terminated(&self) -> bool {
    self.run.outcome.is_some()
  }
}

impl<E> std::fmt::Debug for Emissions<E> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Emissions")
      .field("step_index", &self.run.step_index)
      .field("steps", &self.run.steps.len())
      .field("outcome", &self.run.outcome)
      .field("cancelled", &self.run.handle.is_cancelled())
      .finish()
  }
}
