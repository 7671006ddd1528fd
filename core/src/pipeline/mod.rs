// pipestream/src/pipeline/mod.rs

//! Defines the `Pipeline<In, Out, E>` builder and the `Emissions` stream that
//! executes one run of it.

pub mod definition;
pub mod execution;

// Re-export the main Pipeline struct
pub use definition::Pipeline;
pub use execution::Emissions;
