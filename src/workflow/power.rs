// Power state changes.
//
// Unlike provisioning, a power change carries a fixed budget: the node must
// finish any in-flight power change, accept ours, and settle again before
// the budget (300 s by default) is spent.

use std::time::Duration;
use tracing::{debug, info};

use crate::ironic::{Node, NodeApi, PowerStateRequest, TargetPowerState};
use crate::workflow::{ProvisionEngine, WorkflowError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowerSettings {
    /// Total time allowed for the whole change, both waits included.
    pub timeout: Duration,
    pub check_interval: Duration,
}

impl Default for PowerSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            check_interval: Duration::from_secs(5),
        }
    }
}

impl<C: NodeApi + ?Sized> ProvisionEngine<C> {
    /// Move the node to `target` power state and wait until Ironic reports it.
    ///
    /// `soft_timeout` is forwarded to Ironic for the soft variants only.
    pub async fn change_power_state(
        &self,
        node_id: &str,
        target: TargetPowerState,
        soft_timeout: Option<u64>,
    ) -> Result<(), WorkflowError> {
        if node_id.trim().is_empty() {
            return Err(WorkflowError::InvalidRequest("node id must not be empty".to_string()));
        }
        let settings = &self.settings().power;
        let mut remaining = settings.timeout;

        self.wait_for_power_idle(node_id, target, &mut remaining).await?;

        let request = PowerStateRequest {
            target,
            timeout: soft_timeout.filter(|_| target.accepts_timeout()),
        };
        info!(node = %node_id, target = %target, "Requesting power state change");
        self.settings()
            .retry
            .execute("change_power_state", || {
                self.client().change_power_state(node_id, &request)
            })
            .await?;

        let node = self.wait_for_power_idle(node_id, target, &mut remaining).await?;
        if node.power_state.as_ref() != Some(&target.settled_state()) {
            return Err(WorkflowError::power_mismatch(&node, target));
        }
        info!(node = %node_id, power_state = %target.settled_state(), "Power state change complete");
        Ok(())
    }

    /// Poll until Ironic has no power change in flight, spending `remaining`.
    async fn wait_for_power_idle(
        &self,
        node_id: &str,
        target: TargetPowerState,
        remaining: &mut Duration,
    ) -> Result<Node, WorkflowError> {
        let settings = &self.settings().power;
        loop {
            let node = self.client().get_node(node_id).await?;
            if node.power_settled() {
                return Ok(node);
            }
            debug!(
                node = %node_id,
                pending = ?node.target_power_state,
                "Power change in flight, waiting {:?}",
                settings.check_interval
            );

            tokio::time::sleep(settings.check_interval).await;
            *remaining = remaining.saturating_sub(settings.check_interval);
            if remaining.is_zero() {
                return Err(WorkflowError::Timeout {
                    node: node_id.to_string(),
                    target: target.to_string(),
                    state: node
                        .target_power_state
                        .map(|s| format!("changing to {s}"))
                        .unwrap_or_default(),
                    budget: settings.timeout,
                });
            }
        }
    }
}
