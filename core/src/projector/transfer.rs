// pipestream/src/projector/transfer.rs

//! Streams a projector hands out: the raw emissions of a started run, state
//! subscriptions, and the standalone state stream a run is detached onto at
//! teardown.

use crate::error::PipestreamError;
use crate::projector::state::{AbortHandle, StreamResult, StreamStatus};
use futures_util::stream::{self, Stream};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, watch};

pub type RawItem<V> = Result<V, Arc<PipestreamError>>;

/// Forwarded copy of one run's emissions, as returned by
/// [`LifecycleProjector::start`](crate::LifecycleProjector::start).
///
/// Ends when the run ends, is aborted, or is superseded by another `start`.
/// A failure is delivered once as `Err`, sharing the value published in the
/// `Error` state.
#[derive(Debug)]
pub struct RawEmissions<V> {
  rx: mpsc::UnboundedReceiver<RawItem<V>>,
}

impl<V> RawEmissions<V> {
  pub(crate) fn new(rx: mpsc::UnboundedReceiver<RawItem<V>>) -> Self {
    Self { rx }
  }

  pub async fn recv(&mut self) -> Option<RawItem<V>> {
    self.rx.recv().await
  }
}

impl<V> Stream for RawEmissions<V> {
  type Item = RawItem<V>;

  fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    self.get_mut().rx.poll_recv(cx)
  }
}

/// Observer of a projector's published states, as returned by
/// [`LifecycleProjector::subscribe`](crate::LifecycleProjector::subscribe).
///
/// Every state is handed out as an owned clone, so calling `abort()` or
/// `clear()` on it never contends with the projector publishing the next
/// state.
#[derive(Clone)]
pub struct StateSubscription<V> {
  rx: watch::Receiver<StreamResult<V>>,
}

impl<V: Clone> StateSubscription<V> {
  pub(crate) fn new(rx: watch::Receiver<StreamResult<V>>) -> Self {
    Self { rx }
  }

  pub fn current(&self) -> StreamResult<V> {
    self.rx.borrow().clone()
  }

  /// Waits for the next published state. `None` once the projector and its
  /// runs are gone.
  pub async fn next(&mut self) -> Option<StreamResult<V>> {
    self.rx.changed().await.ok()?;
    Some(self.rx.borrow_and_update().clone())
  }

  /// Returns the current state if it has `status`, otherwise waits for the
  /// first published state that does.
  pub async fn wait_for(&mut self, status: StreamStatus) -> Option<StreamResult<V>> {
    let state = self.rx.wait_for(|state| state.status() == status).await.ok()?;
    Some(state.clone())
  }
}

impl<V: Clone + Send + Sync + 'static> StateSubscription<V> {
  pub fn into_stream(self) -> impl Stream<Item = StreamResult<V>> + Send + 'static {
    stream::unfold(self, |mut subscription| async move {
      let state = subscription.next().await?;
      Some((state, subscription))
    })
  }
}

impl<V> std::fmt::Debug for StateSubscription<V> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("StateSubscription")
      .field("status", &self.rx.borrow().status())
      .finish()
  }
}

/// State stream of a run that outlived its projector.
///
/// The first [`next`](Self::next) yields the state the run had when it was
/// detached; later calls yield each new state. The stream ends right after
/// the run reaches `Done` or `Error`, or returns to `Ready` (abort signal or
/// [`abort`](Self::abort)).
pub struct TransferredStream<V> {
  rx: watch::Receiver<StreamResult<V>>,
  abort: AbortHandle<V>,
  seen_initial: bool,
}

impl<V: Clone> TransferredStream<V> {
  pub(crate) fn new(rx: watch::Receiver<StreamResult<V>>, abort: AbortHandle<V>) -> Self {
    Self {
      rx,
      abort,
      seen_initial: false,
    }
  }

  pub fn current(&self) -> StreamResult<V> {
    self.rx.borrow().clone()
  }

  /// True once the run is over and no further state will arrive.
  pub fn is_closed(&self) -> bool {
    self.rx.has_changed().is_err()
  }

  /// Aborts the detached run; the stream yields `Ready` and ends.
  pub fn abort(&self) -> bool {
    self.abort.abort()
  }

  pub async fn next(&mut self) -> Option<StreamResult<V>> {
    if !self.seen_initial {
      self.seen_initial = true;
      return Some(self.rx.borrow_and_update().clone());
    }
    self.rx.changed().await.ok()?;
    Some(self.rx.borrow_and_update().clone())
  }

  /// Waits for the stream to end and returns its final state.
  pub async fn last(mut self) -> StreamResult<V> {
    let mut last = self.current();
    while let Some(state) = self.next().await {
      last = state;
    }
    last
  }
}

impl<V: Clone + Send + Sync + 'static> TransferredStream<V> {
  pub fn into_stream(self) -> impl Stream<Item = StreamResult<V>> + Send + 'static {
    stream::unfold(self, |mut transferred| async move {
      let state = transferred.next().await?;
      Some((state, transferred))
    })
  }
}

impl<V> std::fmt::Debug for TransferredStream<V> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("TransferredStream")
      .field("run", &self.abort.run_id())
      .field("seen_initial", &self.seen_initial)
      .finish()
  }
}
