use std::time::Duration;
use thiserror::Error;

use crate::ironic::{ApiError, Node, PowerState, ProvisionState, TargetPowerState, TargetProvisionState};

/// Why a workflow run stopped short of its target.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("invalid provisioning request: {0}")]
    InvalidRequest(String),

    /// Transport failure, or Ironic still busy after the retry budget.
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("cannot go from state '{state}' to '{target}' for node {node}{}", last_error_suffix(.last_error))]
    Unreachable {
        node: String,
        target: TargetProvisionState,
        state: ProvisionState,
        last_error: Option<String>,
    },

    #[error("node {node} is in failure state '{state}' while moving to '{target}'{}", last_error_suffix(.last_error))]
    RemoteFailure {
        node: String,
        target: TargetProvisionState,
        state: ProvisionState,
        last_error: Option<String>,
    },

    #[error("timed out after {budget:?} waiting for node {node} to reach '{target}', last seen in state '{state}'")]
    Timeout {
        node: String,
        target: String,
        state: String,
        budget: Duration,
    },

    #[error("provisioning of node {node} toward '{target}' was cancelled in state '{state}'")]
    Cancelled {
        node: String,
        target: String,
        state: String,
    },

    #[error("node {node} settled in power state '{actual}' after requesting '{requested}'{}", last_error_suffix(.last_error))]
    PowerMismatch {
        node: String,
        requested: TargetPowerState,
        actual: String,
        last_error: Option<String>,
    },
}

impl WorkflowError {
    /// Error for a node that has no legal move toward `target`. Failure states
    /// are reported as such so callers see Ironic's own diagnosis.
    pub fn stuck(node: &Node, target: TargetProvisionState) -> Self {
        let last_error = node.last_error().map(str::to_string);
        if node.provision_state.is_failure() {
            WorkflowError::RemoteFailure {
                node: node.uuid.clone(),
                target,
                state: node.provision_state.clone(),
                last_error,
            }
        } else {
            WorkflowError::Unreachable {
                node: node.uuid.clone(),
                target,
                state: node.provision_state.clone(),
                last_error,
            }
        }
    }

    pub(crate) fn power_mismatch(node: &Node, requested: TargetPowerState) -> Self {
        WorkflowError::PowerMismatch {
            node: node.uuid.clone(),
            requested,
            actual: node
                .power_state
                .as_ref()
                .map(PowerState::to_string)
                .unwrap_or_else(|| "unknown".to_string()),
            last_error: node.last_error().map(str::to_string),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, WorkflowError::Timeout { .. })
    }
}

fn last_error_suffix(last_error: &Option<String>) -> String {
    match last_error {
        Some(e) => format!(": {e}"),
        None => String::new(),
    }
}
