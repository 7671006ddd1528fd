// tests/common/mod.rs
#![allow(dead_code)] // Allow unused code in this common test module

use pipestream::{Pipeline, StateSubscription, StepOutcome, StreamResult, StreamStatus};
use std::sync::{
  atomic::{AtomicBool, AtomicUsize, Ordering},
  Arc,
};
use std::time::Duration;
use tracing::Level;

// --- Common emission type for mixed-type pipelines ---
#[derive(Debug, Clone, PartialEq)]
pub enum Emission {
  Text(String),
  Number(i32),
}

impl From<String> for Emission {
  fn from(s: String) -> Self {
    Emission::Text(s)
  }
}

impl From<i32> for Emission {
  fn from(n: i32) -> Self {
    Emission::Number(n)
  }
}

pub fn text(s: &str) -> Emission {
  Emission::Text(s.to_string())
}

// --- Common pipelines ---

/// `n -> n.to_string()` (plain), `s -> parse(s)` (deferred), `n -> n.to_string()` (plain).
pub fn number_round_trip() -> Pipeline<i32, String, Emission> {
  Pipeline::<i32, _, Emission>::new(|n: i32| StepOutcome::plain(n.to_string()))
    .then(|s: String| StepOutcome::deferred(async move { s.parse::<i32>() }))
    .then(|n: i32| StepOutcome::plain(n.to_string()))
}

/// Same shape as `number_round_trip`, but the first two steps each wait `delay`.
pub fn slow_round_trip(delay: Duration) -> Pipeline<i32, String, Emission> {
  Pipeline::<i32, _, Emission>::new(move |n: i32| {
    StepOutcome::deferred(async move {
      tokio::time::sleep(delay).await;
      Ok::<_, anyhow::Error>(n.to_string())
    })
  })
  .then(move |s: String| {
    StepOutcome::deferred(async move {
      tokio::time::sleep(delay).await;
      s.parse::<i32>()
    })
  })
  .then(|n: i32| StepOutcome::plain(n.to_string()))
}

// --- Drop tracking for in-flight step sources ---

#[derive(Clone, Default)]
pub struct DropFlag(Arc<AtomicBool>);

pub struct DropGuard(Arc<AtomicBool>);

impl DropFlag {
  pub fn guard(&self) -> DropGuard {
    DropGuard(Arc::clone(&self.0))
  }

  pub fn dropped(&self) -> bool {
    self.0.load(Ordering::SeqCst)
  }
}

impl Drop for DropGuard {
  fn drop(&mut self) {
    self.0.store(true, Ordering::SeqCst);
  }
}

// --- Projector helpers ---

pub async fn wait_for_status<V: Clone>(states: &mut StateSubscription<V>, status: StreamStatus) -> StreamResult<V> {
  states.wait_for(status).await.expect("projector state channel closed")
}

/// Records every distinct status published on `states` until it closes.
pub fn record_statuses<V: Clone + Send + Sync + 'static>(
  mut states: StateSubscription<V>,
) -> Arc<parking_lot::Mutex<Vec<StreamStatus>>> {
  let record = Arc::new(parking_lot::Mutex::new(vec![states.current().status()]));
  let sink = Arc::clone(&record);
  tokio::spawn(async move {
    while let Some(state) = states.next().await {
      let status = state.status();
      let mut record = sink.lock();
      if record.last() != Some(&status) {
        record.push(status);
      }
    }
  });
  record
}

/// Lets spawned drivers and recorders catch up.
pub async fn settle() {
  tokio::time::sleep(Duration::from_millis(1)).await;
}

// --- Helper for Tracing Setup (call once per test run if needed) ---
use once_cell::sync::Lazy;
static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer() // Important for tests to capture output
    .try_init()
    .ok(); // Allow multiple initializations in tests (ok if fails)
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}

// --- Atomic counters for checking step execution counts ---
pub static STEP_CALLS: Lazy<Arc<AtomicUsize>> = Lazy::new(|| Arc::new(AtomicUsize::new(0)));

pub fn reset_counters() {
  STEP_CALLS.store(0, Ordering::SeqCst);
}

pub fn step_calls() -> usize {
  STEP_CALLS.load(Ordering::SeqCst)
}
