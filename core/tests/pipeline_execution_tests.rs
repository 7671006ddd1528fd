// tests/pipeline_execution_tests.rs
mod common; // Reference the common module

use common::*;
use futures_util::stream::{self, StreamExt};
use pipestream::{Pipeline, PipestreamError, RunOutcome, StepOutcome};
use serial_test::serial;
use std::sync::atomic::Ordering;
use std::time::Duration;

#[tokio::test]
async fn test_mixed_steps_emit_in_order_then_complete() {
  setup_tracing();
  let pipeline = number_round_trip();

  let mut emissions = pipeline.invoke(10);
  let mut records = Vec::new();
  while let Some(item) = emissions.next().await {
    records.push(item.expect("no step fails"));
  }

  assert_eq!(records, vec![text("10"), Emission::Number(10), text("10")]);
  assert_eq!(emissions.outcome(), Some(RunOutcome::Completed));
  assert_eq!(emissions.step_index(), Some(2));
}

#[tokio::test]
async fn test_plain_steps_emit_once_each() {
  setup_tracing();
  let pipeline = Pipeline::<i32, _, i32>::new(|n: i32| StepOutcome::plain(n + 1))
    .then(|n: i32| StepOutcome::plain(n * 2))
    .then(|n: i32| StepOutcome::plain(n - 3))
    .then(|n: i32| StepOutcome::plain(n * 10));
  assert_eq!(pipeline.step_count(), 4);

  let records: Vec<i32> = pipeline.invoke(1).map(|r| r.unwrap()).collect().await;
  assert_eq!(records, vec![2, 4, 1, 10]);
}

#[tokio::test]
async fn test_plain_pipeline_completes_without_suspending() {
  setup_tracing();
  let pipeline = Pipeline::<i32, _, i32>::new(|n: i32| StepOutcome::plain(n + 1)).then(|n: i32| StepOutcome::plain(n + 1));

  let collected = futures_util::FutureExt::now_or_never(pipeline.invoke(0).collect::<Vec<_>>())
    .expect("plain steps never suspend");
  assert_eq!(collected.len(), 2);
}

#[tokio::test]
async fn test_every_source_value_is_forwarded_and_last_one_feeds_next_step() {
  setup_tracing();
  let pipeline = Pipeline::<i32, _, i32>::new(|n: i32| StepOutcome::values(vec![n, n + 1, n + 2]))
    .then(|last: i32| StepOutcome::plain(last * 100));

  let records: Vec<i32> = pipeline.invoke(1).map(|r| r.unwrap()).collect().await;
  assert_eq!(records, vec![1, 2, 3, 300]);
}

#[tokio::test(start_paused = true)]
async fn test_async_source_values_arrive_in_emission_order() {
  setup_tracing();
  let pipeline = Pipeline::<i32, _, Emission>::new(|n: i32| {
    StepOutcome::emitting(stream::iter(0..6).then(move |i| async move {
      tokio::time::sleep(Duration::from_millis(100)).await;
      if i % 2 == 0 {
        Emission::Number(n * i)
      } else {
        Emission::Text((n * i).to_string())
      }
    }))
  })
  .then(|last: Emission| StepOutcome::plain(format!("last={:?}", last)));

  let records: Vec<Emission> = pipeline.invoke(10).map(|r| r.unwrap()).collect().await;
  assert_eq!(
    records,
    vec![
      Emission::Number(0),
      text("10"),
      Emission::Number(20),
      text("30"),
      Emission::Number(40),
      text("50"),
      text("last=Text(\"50\")"),
    ]
  );
}

#[tokio::test]
async fn test_wrapped_pipeline_sees_captured_values() {
  setup_tracing();
  let wrapped = |n: i32| {
    Pipeline::<i32, _, Emission>::new(|n1: i32| StepOutcome::values(vec![n1.to_string()]))
      .then(move |s: String| StepOutcome::deferred(async move { s.parse::<i32>().map(|v| v + n) }))
      .then(move |n3: i32| StepOutcome::plain((n3 + n).to_string()))
      .invoke(n)
  };

  let records: Vec<Emission> = wrapped(10).map(|r| r.unwrap()).collect().await;
  assert_eq!(records, vec![text("10"), Emission::Number(20), text("30")]);
}

#[tokio::test]
async fn test_nested_pipeline_as_source_step() {
  setup_tracing();
  let inner = Pipeline::<i32, _, i32>::new(|n: i32| StepOutcome::plain(n + 1)).then(|n: i32| StepOutcome::plain(n + 1));
  let outer = Pipeline::<i32, _, i32>::new(move |n: i32| StepOutcome::source(inner.invoke(n)))
    .then(|n: i32| StepOutcome::plain(n * 2));

  let records: Vec<i32> = outer.invoke(1).map(|r| r.unwrap()).collect().await;
  assert_eq!(records, vec![2, 3, 6]);
}

#[tokio::test]
async fn test_invocations_are_independent() {
  setup_tracing();
  let pipeline = number_round_trip().named("round_trip");
  assert_eq!(pipeline.name(), Some("round_trip"));

  let first = pipeline.invoke(1);
  let second = pipeline.clone().invoke(2);
  let (a, b) = tokio::join!(first.collect::<Vec<_>>(), second.collect::<Vec<_>>());

  let a: Vec<Emission> = a.into_iter().map(|r| r.unwrap()).collect();
  let b: Vec<Emission> = b.into_iter().map(|r| r.unwrap()).collect();
  assert_eq!(a, vec![text("1"), Emission::Number(1), text("1")]);
  assert_eq!(b, vec![text("2"), Emission::Number(2), text("2")]);
}

#[tokio::test]
#[serial]
async fn test_nothing_runs_until_polled() {
  setup_tracing();
  reset_counters();
  let pipeline = Pipeline::<i32, _, i32>::new(|n: i32| {
    STEP_CALLS.fetch_add(1, Ordering::SeqCst);
    StepOutcome::plain(n)
  });

  let emissions = pipeline.invoke(1);
  assert_eq!(step_calls(), 0);
  assert_eq!(emissions.step_index(), None);
  drop(emissions);
  assert_eq!(step_calls(), 0);
}

#[tokio::test]
#[serial]
async fn test_dropping_the_stream_stops_further_steps() {
  setup_tracing();
  reset_counters();
  let pipeline = Pipeline::<i32, _, Emission>::new(|n: i32| StepOutcome::values(vec![n.to_string()]))
    .then(|s: String| StepOutcome::deferred(async move { s.parse::<i32>() }))
    .then(|n: i32| {
      STEP_CALLS.fetch_add(1, Ordering::SeqCst);
      StepOutcome::plain(n.to_string())
    });

  let mut emissions = pipeline.invoke(10);
  let handle = emissions.handle();
  let mut records = Vec::new();
  while let Some(item) = emissions.next().await {
    records.push(item.unwrap());
    if records.len() == 2 {
      break;
    }
  }
  drop(emissions);

  assert_eq!(records, vec![text("10"), Emission::Number(10)]);
  assert_eq!(step_calls(), 0, "third step must never run");
  assert!(handle.is_cancelled());
  assert_eq!(handle.emitted(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_from_another_task_releases_in_flight_step() {
  setup_tracing();
  let flag = DropFlag::default();
  let guard_source = flag.clone();
  let pipeline = Pipeline::<i32, _, i32>::new(|n: i32| StepOutcome::plain(n)).then(move |n: i32| {
    let guard = guard_source.guard();
    StepOutcome::deferred(async move {
      let _guard = guard;
      tokio::time::sleep(Duration::from_secs(5)).await;
      Ok::<_, anyhow::Error>(n + 1)
    })
  });

  let mut emissions = pipeline.invoke(1);
  assert_eq!(emissions.next().await.unwrap().unwrap(), 1);

  let handle = emissions.handle();
  tokio::spawn(async move {
    tokio::time::sleep(Duration::from_secs(1)).await;
    handle.cancel();
  });

  let started = tokio::time::Instant::now();
  assert!(emissions.next().await.is_none());
  assert!(started.elapsed() < Duration::from_secs(5));
  assert_eq!(emissions.outcome(), Some(RunOutcome::Cancelled));
  assert!(flag.dropped(), "in-flight step must be dropped on cancel");

  assert!(!emissions.cancel(), "second cancel is a no-op");
  assert!(emissions.next().await.is_none());
}

#[tokio::test]
async fn test_empty_source_fails_the_run() {
  setup_tracing();
  let pipeline = Pipeline::<i32, _, i32>::new(|n: i32| StepOutcome::plain(n))
    .then(|_: i32| StepOutcome::values(Vec::<i32>::new()))
    .then(|n: i32| StepOutcome::plain(n + 1));

  let records: Vec<_> = pipeline.invoke(7).collect().await;
  assert_eq!(records.len(), 2);
  assert_eq!(*records[0].as_ref().unwrap(), 7);
  match &records[1] {
    Err(PipestreamError::EmptyEmission { step_index }) => assert_eq!(*step_index, 1),
    other => panic!("Expected EmptyEmission, got {:?}", other),
  }
}

#[tokio::test]
async fn test_empty_final_step_also_fails() {
  setup_tracing();
  let pipeline = Pipeline::<i32, _, i32>::new(|_: i32| StepOutcome::values(Vec::<i32>::new()));

  let mut emissions = pipeline.invoke(7);
  let err = emissions.next().await.unwrap().unwrap_err();
  assert_eq!(err.step_index(), Some(0));
  assert!(matches!(err, PipestreamError::EmptyEmission { .. }));
  assert!(emissions.next().await.is_none());
  assert_eq!(emissions.outcome(), Some(RunOutcome::Failed));
}
