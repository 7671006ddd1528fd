// pipestream/examples/abort_and_detach.rs

use futures_util::StreamExt;
use pipestream::{timeline, LifecycleProjector, Pipeline, StepOutcome, StreamStatus, TimelineConfig};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::info;

fn progress_pipeline() -> Pipeline<u64, f64, f64> {
  Pipeline::<u64, _, f64>::new(|millis: u64| {
    StepOutcome::emitting(timeline(
      TimelineConfig::new(Duration::from_millis(millis)).with_frame_interval(Duration::from_millis(100)),
    ))
  })
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();
  info!("--- Abort and Detach Example ---");

  // 1. Abort a running projection.
  let projector = LifecycleProjector::for_pipeline(progress_pipeline());
  let mut states = projector.subscribe();
  let _raw = projector.start(5_000).expect("projector is alive");

  tokio::time::sleep(Duration::from_millis(500)).await;
  let state = projector.state();
  info!(progress = ?state.value(), "Aborting...");
  state.abort();
  let _ = states.wait_for(StreamStatus::Ready).await;
  info!(status = ?projector.state().status(), "After abort");

  // 2. Hand an unfinished run over when its owner goes away.
  let (tx, rx) = oneshot::channel();
  let owner = LifecycleProjector::for_pipeline(progress_pipeline()).with_detach(move |transferred| {
    let _ = tx.send(transferred);
  });
  let _raw = owner.start(1_000).expect("projector is alive");
  tokio::time::sleep(Duration::from_millis(300)).await;
  drop(owner);

  let transferred = rx.await.expect("run was detached");
  info!(seed = ?transferred.current().status(), "Received detached run");
  let mut updates = Box::pin(transferred.into_stream());
  while let Some(state) = updates.next().await {
    info!(status = ?state.status(), progress = ?state.value(), "Detached update");
  }
}
