// pipestream/examples/basic_pipeline.rs

use futures_util::StreamExt;
use pipestream::{Pipeline, PipestreamError, RunOutcome, StepOutcome};
use std::time::Duration;
use tracing::info;

// 1. Define the emission type covering every value the steps produce.
#[derive(Clone, Debug, PartialEq)]
enum Reading {
  Raw(String),
  Celsius(f64),
  Label(String),
}

impl From<String> for Reading {
  fn from(s: String) -> Self {
    Reading::Raw(s)
  }
}

impl From<f64> for Reading {
  fn from(c: f64) -> Self {
    Reading::Celsius(c)
  }
}

#[derive(Clone, Debug)]
struct Label(String);

impl From<Label> for Reading {
  fn from(label: Label) -> Self {
    Reading::Label(label.0)
  }
}

#[tokio::main]
async fn main() -> Result<(), PipestreamError> {
  // Initialize tracing (optional, for demonstration)
  tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

  info!("--- Basic Pipeline Example ---");

  // 2. Build the pipeline. Each step receives the last value of the
  //    previous one; the builder checks the types line up.
  let pipeline = Pipeline::<u32, _, Reading>::new(|sensor: u32| {
    // Source step: several raw samples over time.
    StepOutcome::emitting(futures_util::stream::iter(0..3).then(move |i| async move {
      tokio::time::sleep(Duration::from_millis(50)).await;
      format!("sensor-{}:{}", sensor, 20 + i)
    }))
  })
  .then(|raw: String| {
    // Deferred step: one value later.
    StepOutcome::deferred(async move {
      let degrees = raw.rsplit(':').next().unwrap_or_default().parse::<f64>()?;
      Ok::<_, anyhow::Error>(degrees)
    })
  })
  .then(|celsius: f64| {
    // Plain step: available immediately.
    StepOutcome::plain(Label(if celsius > 21.5 { "warm".into() } else { "cool".into() }))
  })
  .named("sensor_readings");

  // 3. Invoke and observe every emission.
  info!("Starting pipeline execution...");
  let mut emissions = pipeline.invoke(7);
  while let Some(reading) = emissions.next().await {
    let reading = reading?;
    info!(?reading, step = ?emissions.step_index(), "Emission");
  }

  // 4. Inspect how the run ended.
  match emissions.outcome() {
    Some(RunOutcome::Completed) => info!("Pipeline completed."),
    other => info!(?other, "Pipeline ended early."),
  }

  Ok(())
}
