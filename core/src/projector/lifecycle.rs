// pipestream/src/projector/lifecycle.rs

//! Contains `LifecycleProjector`, which runs pipeline invocations one at a
//! time and publishes each run as a `StreamResult` state.

use crate::core::control::{ExecutionHandle, RunOutcome};
use crate::error::{PipestreamError, PipestreamResult};
use crate::pipeline::{Emissions, Pipeline};
use crate::projector::state::{AbortHandle, ClearHandle, StreamResult};
use crate::projector::transfer::{RawEmissions, RawItem, StateSubscription, TransferredStream};
use futures_util::{FutureExt, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{event, instrument, span, Instrument, Level};

pub(crate) type SharedCore<V> = Arc<Mutex<ProjectorCore<V>>>;

type InvokeFn<P, V> = Box<dyn Fn(P) -> Emissions<V> + Send + Sync>;
type DetachFn<V> = Box<dyn FnOnce(TransferredStream<V>) + Send>;

/// Identity of one run started by a projector. Increases with every `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunId(u64);

impl std::fmt::Display for RunId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "run-{}", self.0)
  }
}

struct OwnedRun<V> {
  id: RunId,
  handle: ExecutionHandle,
  latest: Option<V>,
}

/// State shared between the projector, its driver tasks and the handles
/// embedded in published states.
///
/// The lock is never held across an `.await` or while user code runs.
pub(crate) struct ProjectorCore<V> {
  state: watch::Sender<StreamResult<V>>,
  run: Option<OwnedRun<V>>,
  /// Run whose `Done`/`Error` state is currently on display.
  settled: Option<RunId>,
  next_id: u64,
  torn_down: bool,
  transfer: Option<watch::Sender<StreamResult<V>>>,
  detach: Option<DetachFn<V>>,
}

impl<V> ProjectorCore<V> {
  fn owns(&self, id: RunId) -> bool {
    self.run.as_ref().is_some_and(|run| run.id == id)
  }

  fn publish(&mut self, next: StreamResult<V>) {
    event!(Level::TRACE, status = ?next.status(), "Publishing state.");
    if let Some(transfer) = &self.transfer {
      transfer.send_replace(next);
    } else if !self.torn_down {
      self.state.send_replace(next);
    }
  }

  fn close_transfer(&mut self) {
    if self.transfer.take().is_some() {
      event!(Level::DEBUG, "Transferred stream closed.");
    }
  }

  /// Cancels run `id` and returns to `Ready`, if `id` is still the owned run.
  pub(crate) fn abort_run(core: &SharedCore<V>, id: RunId) -> bool {
    let mut core = core.lock();
    if !core.owns(id) {
      return false;
    }
    if let Some(run) = core.run.take() {
      run.handle.cancel();
    }
    event!(Level::DEBUG, run = %id, "Run aborted.");
    core.publish(StreamResult::Ready);
    core.close_transfer();
    true
  }

  /// Clears the terminal state of run `id`, if it is still on display.
  pub(crate) fn clear_settled(core: &SharedCore<V>, id: RunId) -> bool {
    let mut core = core.lock();
    if core.settled != Some(id) {
      return false;
    }
    core.settled = None;
    core.publish(StreamResult::Ready);
    true
  }
}

enum Flow {
  Continue,
  Finished,
}

/// Moves one run's emissions into the shared core.
struct RunDriver<V> {
  core: SharedCore<V>,
  id: RunId,
  handle: ExecutionHandle,
  emissions: Emissions<V>,
  raw: mpsc::UnboundedSender<RawItem<V>>,
}

impl<V: Clone + Send + Sync + 'static> RunDriver<V> {
  /// Handles everything the run can produce without suspending. Returns
  /// `true` once the run is over.
  fn drain_ready(&mut self) -> bool {
    while let Some(item) = self.emissions.next().now_or_never() {
      if let Flow::Finished = self.apply(item) {
        return true;
      }
    }
    false
  }

  async fn drive(mut self) {
    loop {
      let item = self.emissions.next().await;
      if let Flow::Finished = self.apply(item) {
        break;
      }
    }
    event!(Level::TRACE, run = %self.id, "Driver finished.");
  }

  fn apply(&self, item: Option<PipestreamResult<V>>) -> Flow {
    let mut core = self.core.lock();
    if !core.owns(self.id) {
      event!(Level::TRACE, run = %self.id, "Ignoring callback from a superseded run.");
      return Flow::Finished;
    }

    match item {
      Some(Ok(value)) => {
        let _ = self.raw.send(Ok(value.clone()));
        if let Some(run) = core.run.as_mut() {
          run.latest = Some(value.clone());
        }
        let abort = AbortHandle::new(Arc::downgrade(&self.core), self.id, self.handle.clone());
        core.publish(StreamResult::InProgress { value, abort });
        Flow::Continue
      }
      Some(Err(error)) => {
        let error = Arc::new(error);
        let _ = self.raw.send(Err(Arc::clone(&error)));
        core.run = None;
        if error.is_abort() {
          event!(Level::DEBUG, run = %self.id, "Run stopped by an abort signal.");
          core.publish(StreamResult::Ready);
        } else {
          event!(Level::DEBUG, run = %self.id, error = %error, "Run failed.");
          core.settled = Some(self.id);
          let clear = ClearHandle::new(Arc::downgrade(&self.core), self.id);
          core.publish(StreamResult::Error { error, clear });
        }
        core.close_transfer();
        Flow::Finished
      }
      None => {
        let latest = core.run.take().and_then(|run| run.latest);
        match (self.emissions.outcome(), latest) {
          (Some(RunOutcome::Completed), Some(value)) => {
            event!(Level::DEBUG, run = %self.id, "Run done.");
            core.settled = Some(self.id);
            let clear = ClearHandle::new(Arc::downgrade(&self.core), self.id);
            core.publish(StreamResult::Done { value, clear });
          }
          (outcome, _) => {
            event!(Level::WARN, run = %self.id, ?outcome, "Run ended without a final value.");
            core.publish(StreamResult::Ready);
          }
        }
        core.close_transfer();
        Flow::Finished
      }
    }
  }
}

/// Runs pipeline invocations and publishes each one as a [`StreamResult`].
///
/// - `start(params)` begins a run and cancels any run already owned (last
///   caller wins).
/// - The current state is readable with [`state`](Self::state); every
///   transition reaches the [`StateSubscription`] returned by
///   [`subscribe`](Self::subscribe).
/// - `teardown()` (also done on drop) hands an unfinished run over to the
///   detach callback if one was registered, or cancels it otherwise.
///
/// Runs are driven by tasks spawned on the ambient tokio runtime. Emissions
/// that are ready without suspending are handled inside `start` itself.
pub struct LifecycleProjector<P, V>
where
  P: Send + 'static,
  V: Clone + Send + Sync + 'static,
{
  invoke: InvokeFn<P, V>,
  core: SharedCore<V>,
  state: watch::Receiver<StreamResult<V>>,
}

impl<P, V> LifecycleProjector<P, V>
where
  P: Send + 'static,
  V: Clone + Send + Sync + 'static,
{
  pub fn new(invoke: impl Fn(P) -> Emissions<V> + Send + Sync + 'static) -> Self {
    let (state_tx, state_rx) = watch::channel(StreamResult::Ready);
    Self {
      invoke: Box::new(invoke),
      core: Arc::new(Mutex::new(ProjectorCore {
        state: state_tx,
        run: None,
        settled: None,
        next_id: 0,
        torn_down: false,
        transfer: None,
        detach: None,
      })),
      state: state_rx,
    }
  }

  pub fn for_pipeline<Out>(pipeline: Pipeline<P, Out, V>) -> Self
  where
    Out: Clone + Into<V> + Send + 'static,
  {
    Self::new(pipeline.into_fn())
  }

  /// Registers the callback that receives an unfinished run on teardown.
  pub fn with_detach(self, on_detach: impl FnOnce(TransferredStream<V>) + Send + 'static) -> Self {
    self.core.lock().detach = Some(Box::new(on_detach));
    self
  }

  /// Starts a new run with `params`, cancelling the one currently owned.
  ///
  /// Returns the run's raw emissions. Fails with
  /// [`PipestreamError::TornDown`] after [`teardown`](Self::teardown).
  #[instrument(name = "LifecycleProjector::start", skip_all, err(Display))]
  pub fn start(&self, params: P) -> PipestreamResult<RawEmissions<V>> {
    let emissions = (self.invoke)(params);
    let handle = emissions.handle();

    let id = {
      let mut core = self.core.lock();
      if core.torn_down {
        event!(Level::ERROR, "start() called on a projector that was torn down.");
        return Err(PipestreamError::TornDown);
      }
      if let Some(previous) = core.run.take() {
        event!(Level::DEBUG, run = %previous.id, "Superseding owned run.");
        previous.handle.cancel();
      }
      core.settled = None;
      core.next_id += 1;
      let id = RunId(core.next_id);
      core.run = Some(OwnedRun {
        id,
        handle: handle.clone(),
        latest: None,
      });
      id
    };
    event!(Level::DEBUG, run = %id, "Run started.");

    let (raw_tx, raw_rx) = mpsc::unbounded_channel();
    let mut driver = RunDriver {
      core: Arc::clone(&self.core),
      id,
      handle,
      emissions,
      raw: raw_tx,
    };

    if driver.drain_ready() {
      return Ok(RawEmissions::new(raw_rx));
    }

    match tokio::runtime::Handle::try_current() {
      Ok(runtime) => {
        let run_span = span!(Level::DEBUG, "projector_run", run = %id);
        runtime.spawn(driver.drive().instrument(run_span));
        Ok(RawEmissions::new(raw_rx))
      }
      Err(_) => {
        event!(Level::ERROR, run = %id, "No tokio runtime to drive the run.");
        drop(driver);
        ProjectorCore::abort_run(&self.core, id);
        Err(PipestreamError::NoRuntime)
      }
    }
  }

  pub fn state(&self) -> StreamResult<V> {
    self.state.borrow().clone()
  }

  /// Observer registration: the subscription sees every state published
  /// from now on.
  pub fn subscribe(&self) -> StateSubscription<V> {
    StateSubscription::new(self.core.lock().state.subscribe())
  }

  pub fn current_run(&self) -> Option<RunId> {
    self.core.lock().run.as_ref().map(|run| run.id)
  }

  /// Aborts the owned run, if any. Same as calling `abort()` on the current
  /// `InProgress` state.
  pub fn abort(&self) -> bool {
    let Some(id) = self.current_run() else {
      return false;
    };
    ProjectorCore::abort_run(&self.core, id)
  }

  /// Clears a `Done` or `Error` state. Does nothing in `Ready` or
  /// `InProgress`.
  pub fn clear(&self) -> bool {
    let Some(id) = self.core.lock().settled else {
      return false;
    };
    ProjectorCore::clear_settled(&self.core, id)
  }

  pub fn is_torn_down(&self) -> bool {
    self.core.lock().torn_down
  }

  /// Signals that the owner of this projector is gone.
  ///
  /// An owned run is handed to the detach callback as a
  /// [`TransferredStream`] seeded with its latest `InProgress` state (or
  /// `Ready` if it has not emitted yet); without a callback the run is
  /// cancelled. Idempotent.
  pub fn teardown(&self) {
    let handover = {
      let mut core = self.core.lock();
      if core.torn_down {
        return;
      }
      core.torn_down = true;
      let on_detach = core.detach.take();

      let Some((id, handle, latest)) = core
        .run
        .as_ref()
        .map(|run| (run.id, run.handle.clone(), run.latest.clone()))
      else {
        event!(Level::DEBUG, "Projector torn down while idle.");
        return;
      };

      match on_detach {
        Some(on_detach) => {
          let weak = Arc::downgrade(&self.core);
          let seed = match latest {
            Some(value) => StreamResult::InProgress {
              value,
              abort: AbortHandle::new(weak.clone(), id, handle.clone()),
            },
            None => StreamResult::Ready,
          };
          let (transfer_tx, transfer_rx) = watch::channel(seed);
          core.transfer = Some(transfer_tx);
          event!(Level::DEBUG, run = %id, "Projector torn down, detaching run.");
          Some((on_detach, TransferredStream::new(transfer_rx, AbortHandle::new(weak, id, handle))))
        }
        None => {
          event!(Level::DEBUG, run = %id, "Projector torn down, cancelling run.");
          core.run = None;
          handle.cancel();
          None
        }
      }
    };

    if let Some((on_detach, stream)) = handover {
      on_detach(stream);
    }
  }
}

impl<P, V> Drop for LifecycleProjector<P, V>
where
  P: Send + 'static,
  V: Clone + Send + Sync + 'static,
{
  fn drop(&mut self) {
    self.teardown();
  }
}

impl<P, V> std::fmt::Debug for LifecycleProjector<P, V>
where
  P: Send + 'static,
  V: Clone + Send + Sync + 'static,
{
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let core = self.core.lock();
    f.debug_struct("LifecycleProjector")
      .field("run", &core.run.as_ref().map(|run| run.id))
      .field("status", &self.state.borrow().status())
      .field("torn_down", &core.torn_down)
      .finish()
  }
}
