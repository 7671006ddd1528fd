// pipestream/src/core/step.rs

//! Defines what a pipeline step returns and how that return value is
//! normalized into a single source shape.

use futures_util::future::{self, BoxFuture, FutureExt};
use futures_util::stream::{self, BoxStream, Stream, StreamExt, TryStreamExt};
use std::future::Future;

/// Normalized form of every step: zero or more values, then the stream ends
/// (completion) or yields one `Err` (failure).
pub type StepSource<R> = BoxStream<'static, anyhow::Result<R>>;

/// What a step hands back to the engine.
///
/// The step author picks the variant; nothing is inferred from the shape of
/// the value.
pub enum StepOutcome<R> {
  /// A single value available right away.
  Plain(R),
  /// Exactly one value (or a failure) at some later point.
  Deferred(BoxFuture<'static, anyhow::Result<R>>),
  /// Zero or more values over time, then completion or failure.
  Source(StepSource<R>),
}

impl<R: Send + 'static> StepOutcome<R> {
  pub fn plain(value: R) -> Self {
    StepOutcome::Plain(value)
  }

  pub fn deferred<F, E>(fut: F) -> Self
  where
    F: Future<Output = Result<R, E>> + Send + 'static,
    E: Into<anyhow::Error> + 'static,
  {
    StepOutcome::Deferred(fut.map(|res| res.map_err(Into::into)).boxed())
  }

  pub fn source<S, E>(source: S) -> Self
  where
    S: Stream<Item = Result<R, E>> + Send + 'static,
    E: Into<anyhow::Error> + 'static,
  {
    StepOutcome::Source(source.map_err(Into::into).boxed())
  }

  /// An infallible source, e.g. a timer or a progress feed.
  pub fn emitting<S>(source: S) -> Self
  where
    S: Stream<Item = R> + Send + 'static,
  {
    StepOutcome::Source(source.map(Ok).boxed())
  }

  /// A source whose values are all available immediately.
  pub fn values<I>(values: I) -> Self
  where
    I: IntoIterator<Item = R>,
    I::IntoIter: Send + 'static,
  {
    StepOutcome::Source(stream::iter(values).map(Ok).boxed())
  }

  /// A deferred step that has already failed.
  pub fn failed(error: impl Into<anyhow::Error>) -> Self {
    StepOutcome::Deferred(future::ready(Err(error.into())).boxed())
  }

  /// Collapses the three variants into one source.
  ///
  /// `Plain` yields its value on the first poll without suspending.
  pub fn into_source(self) -> StepSource<R> {
    match self {
      StepOutcome::Plain(value) => stream::once(future::ready(Ok(value))).boxed(),
      StepOutcome::Deferred(fut) => stream::once(fut).boxed(),
      StepOutcome::Source(source) => source,
    }
  }
}

impl<R> StepOutcome<R> {
  pub fn kind(&self) -> StepKind {
    match self {
      StepOutcome::Plain(_) => StepKind::Plain,
      StepOutcome::Deferred(_) => StepKind::Deferred,
      StepOutcome::Source(_) => StepKind::Source,
    }
  }
}

impl<R> std::fmt::Debug for StepOutcome<R> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_tuple("StepOutcome").field(&self.kind()).finish()
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
  Plain,
  Deferred,
  Source,
}

/// Anything a step function may return.
///
/// `Err` from the `Result` form is the synchronous failure of a step and is
/// treated exactly like a failed deferred value.
pub trait IntoStepOutcome: Send + 'static {
  type Output: Send + 'static;

  fn into_step_outcome(self) -> anyhow::Result<StepOutcome<Self::Output>>;
}

impl<R: Send + 'static> IntoStepOutcome for StepOutcome<R> {
  type Output = R;

  fn into_step_outcome(self) -> anyhow::Result<StepOutcome<R>> {
    Ok(self)
  }
}

impl<R, E> IntoStepOutcome for Result<StepOutcome<R>, E>
where
  R: Send + 'static,
  E: Into<anyhow::Error> + Send + 'static,
{
  type Output = R;

  fn into_step_outcome(self) -> anyhow::Result<StepOutcome<R>> {
    self.map_err(Into::into)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn collect_now<R: Send + 'static>(outcome: StepOutcome<R>) -> Vec<anyhow::Result<R>> {
    outcome
      .into_source()
      .collect::<Vec<_>>()
      .now_or_never()
      .unwrap_or_default()
  }

  #[test]
  fn plain_yields_once_without_suspending() {
    let items = collect_now(StepOutcome::plain(7));
    assert_eq!(items.len(), 1);
    assert_eq!(*items[0].as_ref().unwrap(), 7);
  }

  #[test]
  fn values_keep_their_order() {
    let items: Vec<i32> = collect_now(StepOutcome::values(vec![1, 2, 3]))
      .into_iter()
      .map(|r| r.unwrap())
      .collect();
    assert_eq!(items, vec![1, 2, 3]);
  }

  #[test]
  fn failed_is_a_deferred_failure() {
    let outcome = StepOutcome::<i32>::failed(anyhow::anyhow!("boom"));
    assert_eq!(outcome.kind(), StepKind::Deferred);
    let items = collect_now(outcome);
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].as_ref().unwrap_err().to_string(), "boom");
  }

  #[test]
  fn debug_shows_the_kind() {
    assert_eq!(format!("{:?}", StepOutcome::plain(1)), "StepOutcome(Plain)");
    assert_eq!(format!("{:?}", StepOutcome::values(vec![1])), "StepOutcome(Source)");
  }

  #[test]
  fn result_form_maps_sync_errors() {
    let sync_err: Result<StepOutcome<i32>, std::io::Error> =
      Err(std::io::Error::new(std::io::ErrorKind::Other, "thrown"));
    let err = sync_err.into_step_outcome().unwrap_err();
    assert_eq!(err.to_string(), "thrown");
  }
}
