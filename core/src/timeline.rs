// pipestream/src/timeline.rs

//! Time-driven progress source, usable as a `Source` step through
//! `StepOutcome::emitting(timeline(..))`.

use futures_util::stream::{self, Stream};
use std::time::Duration;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(16);
const MIN_FRAME_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelineConfig {
  /// Wait before the first emission.
  pub delay: Duration,
  /// Length of one pass from 0 to 1.
  pub duration: Duration,
  /// Restart from 0 after every pass instead of ending.
  pub repeat: bool,
  pub frame_interval: Duration,
}

impl Default for TimelineConfig {
  fn default() -> Self {
    Self {
      delay: Duration::ZERO,
      duration: Duration::from_secs(1),
      repeat: false,
      frame_interval: DEFAULT_FRAME_INTERVAL,
    }
  }
}

impl TimelineConfig {
  pub fn new(duration: Duration) -> Self {
    Self {
      duration,
      ..Self::default()
    }
  }

  pub fn with_delay(mut self, delay: Duration) -> Self {
    self.delay = delay;
    self
  }

  pub fn repeating(mut self, repeat: bool) -> Self {
    self.repeat = repeat;
    self
  }

  pub fn with_frame_interval(mut self, frame_interval: Duration) -> Self {
    self.frame_interval = frame_interval;
    self
  }
}

struct Clock {
  config: TimelineConfig,
  ticker: Option<Interval>,
  pass_start: Instant,
  /// The previous frame closed a pass and `repeat` is set.
  restarting: bool,
  finished: bool,
}

impl Clock {
  fn progress(&self) -> f64 {
    if self.config.duration.is_zero() {
      return 1.0;
    }
    let elapsed = self.pass_start.elapsed().as_secs_f64();
    (elapsed / self.config.duration.as_secs_f64()).clamp(0.0, 1.0)
  }
}

/// Progress fractions in `[0, 1]`, one per frame.
///
/// After `delay` the stream yields `0.0`, then `elapsed / duration` on every
/// frame. A pass always ends with exactly `1.0`; the stream then ends, or,
/// when `repeat` is set, starts the next pass with `0.0` on the following
/// frame. Uses the tokio clock, so a
/// paused test runtime drives it deterministically.
pub fn timeline(config: TimelineConfig) -> impl Stream<Item = f64> + Send + 'static {
  let clock = Clock {
    config,
    ticker: None,
    pass_start: Instant::now(),
    restarting: false,
    finished: false,
  };

  stream::unfold(clock, |mut clock| async move {
    if clock.finished {
      return None;
    }

    let Some(ticker) = clock.ticker.as_mut() else {
      if !clock.config.delay.is_zero() {
        time::sleep(clock.config.delay).await;
      }
      let mut ticker = time::interval(clock.config.frame_interval.max(MIN_FRAME_INTERVAL));
      ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
      // The first tick completes immediately.
      ticker.tick().await;
      clock.ticker = Some(ticker);
      clock.pass_start = Instant::now();
      return Some((0.0, clock));
    };

    ticker.tick().await;
    if clock.restarting {
      clock.restarting = false;
      clock.pass_start = Instant::now();
      return Some((0.0, clock));
    }

    let progress = clock.progress();
    if progress >= 1.0 {
      if clock.config.repeat {
        clock.restarting = true;
      } else {
        clock.finished = true;
      }
    }
    Some((progress, clock))
  })
}
