// pipestream/examples/error_handling.rs

use futures_util::StreamExt;
use pipestream::{AbortStream, LifecycleProjector, Pipeline, StepOutcome, StreamResult};
use tracing::{error, info};

// 1. Define a custom application error type
#[derive(Debug, thiserror::Error)]
enum ExampleAppError {
  #[error("Order {0} was not found")]
  NotFound(u32),
  #[error("Order {0} is not ready yet")]
  NotReady(u32),
}

fn order_pipeline() -> Pipeline<u32, String, String> {
  Pipeline::<u32, _, String>::new(|id: u32| {
    // Synchronous failure: returned as `Err` before anything is emitted.
    if id == 0 {
      return Err(ExampleAppError::NotFound(id));
    }
    Ok(StepOutcome::plain(format!("order-{}", id)))
  })
  .then(|order: String| {
    StepOutcome::deferred(async move {
      if order.ends_with('3') {
        // Abort signal: the projector goes back to Ready instead of Error.
        return Err(anyhow::Error::new(AbortStream::with_message("order withdrawn")));
      }
      if order.ends_with('4') {
        return Err(ExampleAppError::NotReady(4).into());
      }
      Ok(format!("{} shipped", order))
    })
  })
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();
  info!("--- Error Handling Example ---");

  // Scenario 1: consume the raw emission stream
  info!("Scenario 1: failures in the emission stream");
  for id in [0, 4, 5] {
    let results: Vec<_> = order_pipeline().invoke(id).collect().await;
    for result in results {
      match result {
        Ok(value) => info!(id, %value, "Emitted"),
        Err(e) => error!(id, step = ?e.step_index(), error = %e, "Run failed"),
      }
    }
  }

  // Scenario 2: the same failures seen through a projector
  info!("Scenario 2: failures as lifecycle states");
  let projector = LifecycleProjector::for_pipeline(order_pipeline());
  for id in [3, 4, 5] {
    let raw = projector.start(id).expect("projector is alive");
    let _ = raw.collect::<Vec<_>>().await;

    match projector.state() {
      StreamResult::Ready => info!(id, "Back to Ready (aborted)"),
      StreamResult::Done { value, .. } => info!(id, %value, "Done"),
      StreamResult::Error { error, clear } => {
        error!(id, error = %error, "Error state");
        clear.clear();
      }
      StreamResult::InProgress { .. } => unreachable!("raw stream ended"),
    }
  }
}
