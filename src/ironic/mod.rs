// Ironic node API: wire types, transport client and the busy-retry policy.

pub mod client;
pub mod errors;
pub mod retry;
pub mod types;

pub use client::{ClientOptions, IronicClient, NodeApi};
pub use errors::ApiError;
pub use retry::RetryPolicy;
pub use types::{
    ApiVersion, CleanStep, DeployStep, Node, PatchOp, PatchOperation, PowerState, PowerStateRequest,
    ProvisionState, ProvisionStateRequest, TargetPowerState, TargetProvisionState,
};
