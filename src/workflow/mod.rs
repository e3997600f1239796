// Provisioning workflow: transition table, run loop and its bounds.

pub mod engine;
pub mod errors;
pub mod limits;
pub mod power;
pub mod transitions;

pub use engine::{drive_to_state, DriveRequest, ProvisionEngine, WorkflowSettings};
pub use errors::WorkflowError;
pub use limits::RunLimits;
pub use power::PowerSettings;
pub use transitions::{next_step, next_step_for, settle_step, Decision};
