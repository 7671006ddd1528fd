pub mod control;
pub(crate) mod erased;
pub mod step;

// Re-export key types for easier access from other pipestream modules (and lib.rs)
pub use control::{ExecutionHandle, RunOutcome};
pub use step::{IntoStepOutcome, StepKind, StepOutcome, StepSource};
