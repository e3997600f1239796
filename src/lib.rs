// ironic-provision library - bare-metal provisioning workflows against OpenStack Ironic
// This exposes the core components for the CLI and for integration tests

pub mod config;
pub mod configdrive;
pub mod ironic;
pub mod locks;
pub mod observability;
pub mod shutdown;
pub mod telemetry;
pub mod workflow;

// Re-export key types for easy access
pub use config::ProvisionConfig;
pub use configdrive::{ConfigDriveBuilder, ConfigDriveError, ConfigDriveInput, ConfigDrivePayload};
pub use ironic::{
    ApiError, ApiVersion, ClientOptions, IronicClient, Node, NodeApi, ProvisionState, RetryPolicy,
    TargetPowerState, TargetProvisionState,
};
pub use locks::{NodeGuard, NodeLocks};
pub use observability::{api_metrics, create_workflow_span, ApiMetrics, OperationTimer};
pub use shutdown::ShutdownCoordinator;
pub use telemetry::{generate_correlation_id, init_telemetry};
pub use workflow::{drive_to_state, DriveRequest, ProvisionEngine, RunLimits, WorkflowError, WorkflowSettings};
