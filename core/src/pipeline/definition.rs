// pipestream/src/pipeline/definition.rs

//! Contains the `Pipeline<In, Out, E>` struct and its type-checked builder.

use crate::core::erased::{ErasedStep, TypedStep};
use crate::core::step::IntoStepOutcome;
use crate::pipeline::execution::Emissions;
use std::marker::PhantomData;
use std::sync::Arc;

pub(crate) type StepList<E> = Arc<[Arc<dyn ErasedStep<E>>]>;

/// An ordered, non-empty chain of steps.
///
/// - `In` is the input of the first step.
/// - `Out` is the value type of the last step.
/// - `E` is what every emission is converted into before it is forwarded
///   downstream. Each step's value type must be `Clone + Into<E>`; a
///   pipeline whose steps all produce the same type can use that type as `E`.
///
/// The builder enforces that every step's input is the previous step's value
/// type. A `Pipeline` holds no run state: it can be invoked any number of
/// times, concurrently, and each call gets its own run.
pub struct Pipeline<In, Out, E> {
  pub(crate) name: Option<Arc<str>>,
  pub(crate) steps: StepList<E>,
  _marker: PhantomData<fn(In) -> Out>,
}

impl<In, Out, E> Pipeline<In, Out, E>
where
  In: Send + 'static,
  Out: Clone + Into<E> + Send + 'static,
  E: Send + 'static,
{
  /// Starts a pipeline with its first step.
  pub fn new<F, O>(step: F) -> Self
  where
    F: Fn(In) -> O + Send + Sync + 'static,
    O: IntoStepOutcome<Output = Out>,
  {
    let first: Arc<dyn ErasedStep<E>> = Arc::new(TypedStep::<F, In, O>::new(step));
    Self {
      name: None,
      steps: Arc::from(vec![first]),
      _marker: PhantomData,
    }
  }

  /// Appends a step fed with the last value of the current final step.
  pub fn then<Next, F, O>(self, step: F) -> Pipeline<In, Next, E>
  where
    F: Fn(Out) -> O + Send + Sync + 'static,
    O: IntoStepOutcome<Output = Next>,
    Next: Clone + Into<E> + Send + 'static,
  {
    let mut steps = self.steps.to_vec();
    steps.push(Arc::new(TypedStep::<F, Out, O>::new(step)));
    Pipeline {
      name: self.name,
      steps: Arc::from(steps),
      _marker: PhantomData,
    }
  }

  /// Names the pipeline in tracing output.
  pub fn named(mut self, name: impl Into<String>) -> Self {
    self.name = Some(Arc::from(name.into()));
    self
  }

  pub fn name(&self) -> Option<&str> {
    self.name.as_deref()
  }

  pub fn step_count(&self) -> usize {
    self.steps.len()
  }

  /// Creates a fresh run fed with `input`. Nothing executes until the
  /// returned stream is polled; dropping it cancels the run.
  pub fn invoke(&self, input: In) -> Emissions<E> {
    Emissions::new(self.name.clone(), Arc::clone(&self.steps), Box::new(input))
  }

  /// The pipeline as a plain invocation function, for wrapping in other
  /// pipelines or handing to a projector.
  pub fn into_fn(self) -> impl Fn(In) -> Emissions<E> + Send + Sync + 'static {
    move |input| self.invoke(input)
  }
}

impl<In, Out, E> Clone for Pipeline<In, Out, E> {
  fn clone(&self) -> Self {
    Self {
      name: self.name.clone(),
      steps: Arc::clone(&self.steps),
      _marker: PhantomData,
    }
  }
}

impl<In, Out, E> std::fmt::Debug for Pipeline<In, Out, E> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Pipeline")
      .field("name", &self.name)
      .field("steps", &self.steps.len())
      .field("input_type", &std::any::type_name::<In>())
      .field("output_type", &std::any::type_name::<Out>())
      .finish()
  }
}
