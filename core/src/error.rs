// pipestream/src/error.rs
use anyhow::Error as AnyhowError;
use thiserror::Error;

/// Distinguished failure a step raises to request "return to idle".
///
/// A projector observing this failure goes back to `Ready` instead of
/// surfacing an `Error` state. It is recognised by type, never by message.
#[derive(Debug, Clone, Default, Error)]
#[error("stream aborted{}", abort_suffix(.message))]
pub struct AbortStream {
  pub message: Option<String>,
}

impl AbortStream {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_message(message: impl Into<String>) -> Self {
    Self {
      message: Some(message.into()),
    }
  }
}

#[derive(Debug, Error)]
pub enum PipestreamError {
  #[error("Step {step_index} failed. Source: {source}")]
  StepFailed {
    step_index: usize,
    #[source]
    source: AnyhowError,
  },

  #[error("Step {step_index} completed without emitting a value")]
  EmptyEmission { step_index: usize },

  #[error("Type mismatch at step {step_index} (expected {expected_type})")]
  TypeMismatch {
    step_index: usize,
    expected_type: &'static str,
  },

  #[error("Projector was started after its owner was torn down")]
  TornDown,

  #[error("No tokio runtime available to drive the run")]
  NoRuntime,

  #[error("Internal pipestream error: {0}")]
  Internal(String),
}

impl PipestreamError {
  /// True when the failure is an [`AbortStream`] raised by a step, including
  /// one raised inside a nested pipeline.
  pub fn is_abort(&self) -> bool {
    match self {
      PipestreamError::StepFailed { source, .. } => source.chain().any(|cause| cause.is::<AbortStream>()),
      _ => false,
    }
  }

  /// Index of the step the failure is attributed to, if any.
  pub fn step_index(&self) -> Option<usize> {
    match self {
      PipestreamError::StepFailed { step_index, .. }
      | PipestreamError::EmptyEmission { step_index }
      | PipestreamError::TypeMismatch { step_index, .. } => Some(*step_index),
      _ => None,
    }
  }
}

fn abort_suffix(message: &Option<String>) -> String {
  message.as_ref().map(|m| format!(": {m}")).unwrap_or_default()
}

pub type PipestreamResult<T, E = PipestreamError> = std::result::Result<T, E>;
