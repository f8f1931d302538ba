//! Application services for server supervision.

mod lifecycle;
mod polling;

pub use lifecycle::{
    EnvironmentFailure, ServerSupervisor, StartOutcome, StopOutcome, SupervisorError,
    SupervisorResult,
};
pub use polling::poll_until;
