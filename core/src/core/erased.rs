// pipestream/src/core/erased.rs

//! Type-erased step plumbing. The public builder keeps the step chain
//! statically typed; the engine only sees `ErasedStep<E>` and moves values
//! between steps as `Box<dyn Any + Send>`.

use crate::core::step::IntoStepOutcome;
use crate::error::{PipestreamError, PipestreamResult};
use futures_util::stream::{BoxStream, StreamExt, TryStreamExt};
use std::any::Any;
use std::marker::PhantomData;
use tracing::{event, Level};

pub(crate) type AnyValue = Box<dyn Any + Send>;

/// One emission of a step: the copy forwarded downstream and the typed value
/// kept as the next step's input.
pub(crate) struct Carried<E> {
  pub(crate) emitted: E,
  pub(crate) value: AnyValue,
}

pub(crate) type CarriedSource<E> = BoxStream<'static, anyhow::Result<Carried<E>>>;

pub(crate) trait ErasedStep<E>: Send + Sync {
  /// Calls the step with the previous step's value. A synchronous failure of
  /// the step comes back as `Err`.
  fn call(&self, input: AnyValue, step_index: usize) -> PipestreamResult<CarriedSource<E>>;

  fn input_type(&self) -> &'static str;
}

pub(crate) struct TypedStep<F, In, O> {
  f: F,
  _marker: PhantomData<fn(In) -> O>,
}

impl<F, In, O> TypedStep<F, In, O> {
  pub(crate) fn new(f: F) -> Self {
    Self { f, _marker: PhantomData }
  }
}

impl<F, In, O, E> ErasedStep<E> for TypedStep<F, In, O>
where
  F: Fn(In) -> O + Send + Sync + 'static,
  In: Send + 'static,
  O: IntoStepOutcome,
  O::Output: Clone + Into<E>,
  E: Send + 'static,
{
  fn call(&self, input: AnyValue, step_index: usize) -> PipestreamResult<CarriedSource<E>> {
    let input = downcast_input::<In>(input, step_index)?;
    let outcome = (self.f)(input)
      .into_step_outcome()
      .map_err(|source| PipestreamError::StepFailed { step_index, source })?;
    event!(Level::TRACE, step_index, kind = ?outcome.kind(), "Step returned.");

    Ok(
      outcome
        .into_source()
        .map_ok(|value: O::Output| Carried {
          emitted: value.clone().into(),
          value: Box::new(value),
        })
        .boxed(),
    )
  }

  fn input_type(&self) -> &'static str {
    std::any::type_name::<In>()
  }
}

pub(crate) fn downcast_input<In: 'static>(value: AnyValue, step_index: usize) -> PipestreamResult<In> {
  value
    .downcast::<In>()
    .map(|boxed| *boxed)
    .map_err(|_| PipestreamError::TypeMismatch {
      step_index,
      expected_type: std::any::type_name::<In>(),
    })
}
