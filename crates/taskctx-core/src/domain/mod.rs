//! Domain model (IDs, states, errors, aggregate failures).

pub mod aggregate;
pub mod errors;
pub mod ids;
pub mod state;

pub use aggregate::{AggregateError, CapturedError};
pub use errors::{BoxError, Cancelled, SchedulerError, SubmitError, TaskError};
pub use ids::{Id, IdMarker, TaskId, WalkId};
pub use state::{TaskState, Timeline};
