//! Scripted in-memory Ironic for workflow tests.
//!
//! Each accepted provision request queues the states the node walks through
//! afterwards; every `get_node` reveals the next one. Calls are recorded so
//! tests can assert on exactly what the workflow sent.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use ironic_provision::ironic::{
    ApiError, Node, NodeApi, PatchOp, PatchOperation, PowerState, PowerStateRequest, ProvisionState,
    ProvisionStateRequest, TargetProvisionState,
};

pub const NODE_ID: &str = "1be26c0b-03f2-4d2e-ae87-c02d7f33c123";

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Reload(ProvisionState),
    Provision(ProvisionStateRequest),
    Power(PowerStateRequest),
    Patch(Vec<PatchOperation>),
}

#[derive(Debug)]
struct FakeState {
    node: Node,
    pending: VecDeque<ProvisionState>,
    scripts: HashMap<TargetProvisionState, Vec<ProvisionState>>,
    busy_responses: u32,
    busy_rejections: u32,
    power_settles_after: Option<u32>,
    calls: Vec<Call>,
}

#[derive(Debug)]
pub struct FakeIronic {
    state: Mutex<FakeState>,
}

/// States Ironic walks through after accepting each verb.
pub fn default_script(target: TargetProvisionState) -> Vec<ProvisionState> {
    use ProvisionState as S;
    match target {
        TargetProvisionState::Manage => vec![S::Verifying, S::Manageable],
        TargetProvisionState::Provide => vec![S::Cleaning, S::CleanWait, S::Available],
        TargetProvisionState::Active => vec![S::Deploying, S::DeployWait, S::Active],
        TargetProvisionState::Deleted => vec![S::Deleting, S::Cleaning, S::Available],
        TargetProvisionState::Clean => vec![S::Cleaning, S::CleanWait, S::Manageable],
        TargetProvisionState::Inspect => vec![S::Inspecting, S::InspectWait, S::Manageable],
    }
}

impl FakeIronic {
    pub fn new(initial: ProvisionState) -> Self {
        let mut node = Node::new(NODE_ID, initial);
        node.power_state = Some(PowerState::Off);

        let scripts = TargetProvisionState::ALL
            .iter()
            .map(|target| (*target, default_script(*target)))
            .collect();

        Self {
            state: Mutex::new(FakeState {
                node,
                pending: VecDeque::new(),
                scripts,
                busy_responses: 0,
                busy_rejections: 0,
                power_settles_after: Some(1),
                calls: Vec::new(),
            }),
        }
    }

    /// Replace what happens after `target` is accepted. The last state sticks.
    pub fn with_script(self, target: TargetProvisionState, states: Vec<ProvisionState>) -> Self {
        self.state.lock().unwrap().scripts.insert(target, states);
        self
    }

    pub fn with_last_error(self, error: &str) -> Self {
        self.state.lock().unwrap().node.last_error = Some(error.to_string());
        self
    }

    /// Answer the next `count` state-change requests with HTTP 409.
    pub fn with_busy_responses(self, count: u32) -> Self {
        self.state.lock().unwrap().busy_responses = count;
        self
    }

    pub fn with_power_state(self, power_state: PowerState) -> Self {
        self.state.lock().unwrap().node.power_state = Some(power_state);
        self
    }

    /// Power changes settle after this many reloads; `None` never settles.
    pub fn with_power_settling_after(self, reloads: Option<u32>) -> Self {
        self.state.lock().unwrap().power_settles_after = reloads;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn provision_requests(&self) -> Vec<ProvisionStateRequest> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Provision(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    pub fn requested_targets(&self) -> Vec<TargetProvisionState> {
        self.provision_requests().iter().map(|r| r.target).collect()
    }

    pub fn reloaded_states(&self) -> Vec<ProvisionState> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Reload(state) => Some(state),
                _ => None,
            })
            .collect()
    }

    pub fn busy_rejections(&self) -> u32 {
        self.state.lock().unwrap().busy_rejections
    }

    pub fn node(&self) -> Node {
        self.state.lock().unwrap().node.clone()
    }

    fn reject_if_busy(state: &mut FakeState) -> Result<(), ApiError> {
        if state.busy_responses > 0 {
            state.busy_responses -= 1;
            state.busy_rejections += 1;
            return Err(ApiError::Conflict {
                message: format!("Node {NODE_ID} is locked by host conductor-1"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl NodeApi for FakeIronic {
    async fn get_node(&self, node_id: &str) -> Result<Node, ApiError> {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        if node_id != NODE_ID && state.node.name.as_deref() != Some(node_id) {
            return Err(ApiError::NotFound(node_id.to_string()));
        }

        if let Some(next) = state.pending.pop_front() {
            state.node.provision_state = next;
            state.node.target_provision_state = state.pending.back().cloned();
        }

        if let Some(remaining) = state.power_settles_after.as_mut() {
            if state.node.target_power_state.is_some() {
                if *remaining == 0 {
                    state.node.power_state = state.node.target_power_state.take();
                } else {
                    *remaining -= 1;
                }
            }
        }

        let node = state.node.clone();
        state.calls.push(Call::Reload(node.provision_state.clone()));
        Ok(node)
    }

    async fn change_provision_state(
        &self,
        _node_id: &str,
        request: &ProvisionStateRequest,
    ) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        Self::reject_if_busy(&mut state)?;

        let script = state.scripts.get(&request.target).cloned().unwrap_or_default();
        state.node.target_provision_state = script.last().cloned();
        state.pending = script.into();
        state.calls.push(Call::Provision(request.clone()));
        Ok(())
    }

    async fn change_power_state(&self, _node_id: &str, request: &PowerStateRequest) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        Self::reject_if_busy(&mut state)?;

        state.node.target_power_state = Some(request.target.settled_state());
        state.calls.push(Call::Power(request.clone()));
        Ok(())
    }

    async fn update_node(&self, _node_id: &str, patch: &[PatchOperation]) -> Result<Node, ApiError> {
        let mut state = self.state.lock().unwrap();
        Self::reject_if_busy(&mut state)?;

        for op in patch {
            if op.path == "/name" {
                state.node.name = match op.op {
                    PatchOp::Remove => None,
                    _ => op.value.as_ref().and_then(|v| v.as_str()).map(str::to_string),
                };
            }
        }
        state.calls.push(Call::Patch(patch.to_vec()));
        Ok(state.node.clone())
    }
}
