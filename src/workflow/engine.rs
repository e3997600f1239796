// Provisioning workflow engine.
//
// One run drives one node toward one target: reload the node, look the
// observed state up in the transition table, then either issue a single
// verb, wait, detour through a prerequisite target, or stop. Ironic is the
// only source of truth; the engine never assumes a request took effect until
// a reload shows it.

use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, Instrument};

use crate::configdrive::ConfigDrivePayload;
use crate::ironic::{
    CleanStep, DeployStep, Node, NodeApi, PatchOperation, ProvisionState, ProvisionStateRequest,
    RetryPolicy, TargetProvisionState,
};
use crate::observability::{api_metrics, create_workflow_span, OperationTimer};
use crate::telemetry::generate_correlation_id;
use crate::workflow::limits::PauseContext;
use crate::workflow::power::PowerSettings;
use crate::workflow::transitions::{self, Decision};
use crate::workflow::{RunLimits, WorkflowError};

/// Timing knobs for a workflow run.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowSettings {
    /// Wait between reloads while a transition is in progress.
    pub poll_interval: Duration,
    /// Wait between reloads once a deploy has been requested.
    pub deploy_poll_interval: Duration,
    pub retry: RetryPolicy,
    pub power: PowerSettings,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            deploy_poll_interval: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            power: PowerSettings::default(),
        }
    }
}

/// Extra inputs for a run. Only the verb that accepts each field gets it:
/// the config drive and deploy steps go with `active`, clean steps with `clean`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DriveRequest {
    pub config_drive: Option<ConfigDrivePayload>,
    pub clean_steps: Vec<CleanStep>,
    pub deploy_steps: Vec<DeployStep>,
}

/// Drives nodes through Ironic's provisioning states.
///
/// The engine holds no per-node state, so one instance can serve many
/// concurrent runs. It does not serialize runs against the same node; callers
/// do that with [`crate::locks::NodeLocks`].
pub struct ProvisionEngine<C: ?Sized> {
    settings: WorkflowSettings,
    client: Arc<C>,
}

impl<C: NodeApi + ?Sized> ProvisionEngine<C> {
    pub fn new(client: Arc<C>, settings: WorkflowSettings) -> Self {
        Self { settings, client }
    }

    pub fn settings(&self) -> &WorkflowSettings {
        &self.settings
    }

    pub(crate) fn client(&self) -> &C {
        &self.client
    }

    /// Drive `node_id` until its provision state matches `target`.
    ///
    /// Returns once Ironic reports the terminal state for `target`; fails
    /// when the node has no legal path there, Ironic parks it in a failure
    /// state, a request keeps hitting 409 past the retry budget, or `limits`
    /// expire. Nothing is rolled back on failure.
    pub async fn drive_to_state(
        &self,
        node_id: &str,
        target: TargetProvisionState,
        request: &DriveRequest,
        limits: &RunLimits,
    ) -> Result<(), WorkflowError> {
        if node_id.trim().is_empty() {
            return Err(WorkflowError::InvalidRequest("node id must not be empty".to_string()));
        }
        if request.config_drive.is_some() && target != TargetProvisionState::Active {
            debug!(node = %node_id, target = %target, "Ignoring config drive for non-deploy target");
        }

        let correlation_id = generate_correlation_id();
        let span = create_workflow_span(node_id, target.as_str(), &correlation_id);
        let timer = OperationTimer::new("provision_workflow");
        let result = self.run(node_id, target, request, limits).instrument(span).await;
        timer.finish();
        result
    }

    /// Apply a JSON patch to the node, retrying while Ironic is busy.
    pub async fn update_node(&self, node_id: &str, patch: &[PatchOperation]) -> Result<Node, WorkflowError> {
        let node = self
            .settings
            .retry
            .execute("update_node", || self.client.update_node(node_id, patch))
            .await?;
        Ok(node)
    }

    // Boxed so prerequisite targets can re-enter the same entry point.
    fn run<'s>(
        &'s self,
        node_id: &'s str,
        target: TargetProvisionState,
        request: &'s DriveRequest,
        limits: &'s RunLimits,
    ) -> BoxFuture<'s, Result<(), WorkflowError>> {
        Box::pin(async move {
            if transitions::is_maintenance(target) {
                self.run_maintenance(node_id, target, request, limits).await
            } else {
                self.run_converging(node_id, target, request, limits).await
            }
        })
    }

    async fn run_converging(
        &self,
        node_id: &str,
        target: TargetProvisionState,
        request: &DriveRequest,
        limits: &RunLimits,
    ) -> Result<(), WorkflowError> {
        let mut poll_interval = self.settings.poll_interval;

        loop {
            let node = self.reload(node_id).await?;

            match transitions::next_step_for(target, &node) {
                Decision::Done => {
                    info!(node = %node_id, state = %node.provision_state, target = %target, "Node reached target");
                    return Ok(());
                }
                Decision::Poll => {
                    debug!(node = %node_id, state = %node.provision_state, target = %target, "Transition in progress");
                }
                Decision::Request(verb) => {
                    if verb == TargetProvisionState::Active {
                        poll_interval = self.settings.deploy_poll_interval;
                    }
                    self.request_transition(node_id, verb, request).await?;
                }
                Decision::Prerequisite(prerequisite) => {
                    info!(
                        node = %node_id,
                        state = %node.provision_state,
                        target = %target,
                        "Node must reach '{}' first",
                        prerequisite
                    );
                    self.run(node_id, prerequisite, &DriveRequest::default(), limits).await?;
                }
                Decision::Fatal => return Err(WorkflowError::stuck(&node, target)),
            }

            limits
                .pause(poll_interval, pause_context(node_id, target, &node.provision_state))
                .await?;
        }
    }

    /// `clean` and `inspect`: get to manageable, request the operation
    /// unconditionally, then wait for the node to come back to manageable.
    async fn run_maintenance(
        &self,
        node_id: &str,
        target: TargetProvisionState,
        request: &DriveRequest,
        limits: &RunLimits,
    ) -> Result<(), WorkflowError> {
        let node = self.reload(node_id).await?;
        if let Decision::Prerequisite(prerequisite) = transitions::next_step(target, &node.provision_state) {
            self.run(node_id, prerequisite, &DriveRequest::default(), limits).await?;
        }
        self.request_transition(node_id, target, request).await?;

        // Both paths leave the node manageable when the request goes out.
        let mut state = ProvisionState::Manageable;
        loop {
            limits
                .pause(self.settings.poll_interval, pause_context(node_id, target, &state))
                .await?;
            let node = self.reload(node_id).await?;

            match transitions::settle_step(target, &node.provision_state) {
                // Ironic has not picked the request up yet.
                Decision::Done if node.is_transitioning() => {
                    debug!(node = %node_id, target = %target, "Operation accepted but not started");
                }
                Decision::Done => {
                    info!(node = %node_id, target = %target, "Node finished '{}' and is manageable again", target);
                    return Ok(());
                }
                Decision::Poll => {
                    debug!(node = %node_id, state = %node.provision_state, target = %target, "Operation in progress");
                }
                Decision::Request(_) | Decision::Prerequisite(_) | Decision::Fatal => {
                    return Err(WorkflowError::stuck(&node, target));
                }
            }
            state = node.provision_state;
        }
    }

    async fn reload(&self, node_id: &str) -> Result<Node, WorkflowError> {
        let node = self.client.get_node(node_id).await?;
        debug!(
            node = %node_id,
            state = %node.provision_state,
            in_flight = ?node.target_provision_state,
            "Node current state"
        );
        Ok(node)
    }

    async fn request_transition(
        &self,
        node_id: &str,
        verb: TargetProvisionState,
        request: &DriveRequest,
    ) -> Result<(), WorkflowError> {
        let body = ProvisionStateRequest::for_target(
            verb,
            request.config_drive.as_ref(),
            &request.clean_steps,
            &request.deploy_steps,
        );
        info!(node = %node_id, target = %verb, "Requesting provision state change");
        api_metrics().record_transition();

        self.settings
            .retry
            .execute("change_provision_state", || {
                self.client.change_provision_state(node_id, &body)
            })
            .await?;
        Ok(())
    }
}

fn pause_context<'a>(node: &'a str, target: TargetProvisionState, state: &'a ProvisionState) -> PauseContext<'a> {
    PauseContext {
        node,
        target: target.as_str(),
        state: state.as_str(),
    }
}

/// One-shot run with default settings and no deadline.
///
/// The caller must hold the node's lock for the duration; see
/// [`crate::locks::NodeLocks`].
pub async fn drive_to_state<C: NodeApi + ?Sized>(
    client: Arc<C>,
    node_id: &str,
    target: TargetProvisionState,
    config_drive: Option<ConfigDrivePayload>,
    clean_steps: Vec<CleanStep>,
    deploy_steps: Vec<DeployStep>,
) -> Result<(), WorkflowError> {
    let engine = ProvisionEngine::new(client, WorkflowSettings::default());
    let request = DriveRequest {
        config_drive,
        clean_steps,
        deploy_steps,
    };
    engine
        .drive_to_state(node_id, target, &request, &RunLimits::unbounded())
        .await
}
