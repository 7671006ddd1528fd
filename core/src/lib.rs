// src/lib.rs

//! pipestream: sequential async step pipelines with observable emissions and
//! a cancellable lifecycle state machine.
//!
//! pipestream lets you:
//!  - Chain steps whose input is the previous step's last value, with the
//!    chain type-checked by a builder.
//!  - Return a plain value, a future, or a stream from any step.
//!  - Observe every value a step emits, not just its final one.
//!  - Cancel a run at any point; in-flight futures and streams are dropped.
//!  - Project runs onto `Ready` / `InProgress` / `Done` / `Error` states with
//!    `abort()` and `clear()` actions.
//!  - Hand an unfinished run over to a new owner when the first owner
//!    goes away.

pub mod core;
pub mod error;
pub mod pipeline;
pub mod projector;
pub mod timeline;

// --- Re-exports for the Public API ---

pub use crate::core::control::{ExecutionHandle, RunOutcome};
pub use crate::core::step::{IntoStepOutcome, StepKind, StepOutcome, StepSource};

pub use crate::pipeline::{Emissions, Pipeline};

pub use crate::projector::{
  AbortHandle, ClearHandle, LifecycleProjector, RawEmissions, RawItem, RunId, StateSubscription, StreamResult,
  StreamStatus, TransferredStream,
};

pub use crate::timeline::{timeline, TimelineConfig};

pub use crate::error::{AbortStream, PipestreamError, PipestreamResult};

/*
    Core Workflow:
    1. Define an emission type `E` covering every value your steps produce
       (or reuse the single type if all steps agree), with `From` impls.
    2. Build a `Pipeline::<In, _, E>::new(first_step)` and chain
       `.then(next_step)` for each further step.
    3. Either consume `pipeline.invoke(input)` directly as a stream, or wrap
       the pipeline in `LifecycleProjector::for_pipeline(pipeline)`.
    4. Call `projector.start(params)`, watch `projector.subscribe()`, and use
       `abort()` / `clear()` on the published states.
    5. Register `.with_detach(..)` to receive unfinished runs when the
       projector is torn down.
*/
