// pipestream/src/projector/mod.rs

//! Projects pipeline runs onto a four-state lifecycle (`Ready`,
//! `InProgress`, `Done`, `Error`) with abort/clear actions and detach on
//! teardown.

pub mod lifecycle;
pub mod state;
pub mod transfer;

pub use lifecycle::{LifecycleProjector, RunId};
pub use state::{AbortHandle, ClearHandle, StreamResult, StreamStatus};
pub use transfer::{RawEmissions, RawItem, StateSubscription, TransferredStream};
