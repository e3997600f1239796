// Transition table for the provisioning workflow.
//
// Ironic owns the node state machine and only accepts particular verbs from
// particular states. Given the verb we are working toward and the state we
// just observed, these functions say what the driver does next. Any state a
// row does not mention is fatal: the driver reports it instead of guessing.

use crate::ironic::{Node, ProvisionState, TargetProvisionState};

/// What the workflow does after observing a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Target reached.
    Done,
    /// A transition is in flight; sleep and reload.
    Poll,
    /// Issue this verb to Ironic.
    Request(TargetProvisionState),
    /// Drive the node to this target first, then come back.
    Prerequisite(TargetProvisionState),
    /// No path from here to the target.
    Fatal,
}

/// Next step toward `target` from `state`.
///
/// For `clean` and `inspect` this only covers the entry into the operation:
/// request it from `manageable`, otherwise get to `manageable` first. Use
/// [`settle_step`] once the operation has been requested.
pub fn next_step(target: TargetProvisionState, state: &ProvisionState) -> Decision {
    use Decision::*;
    use ProvisionState as S;
    use TargetProvisionState as T;

    match target {
        T::Manage => match state {
            S::Manageable => Done,
            S::Enroll | S::AdoptFailed | S::CleanFailed | S::InspectFailed | S::Available => Request(T::Manage),
            S::Verifying => Poll,
            _ => Fatal,
        },
        T::Provide => match state {
            S::Available => Done,
            S::Manageable => Request(T::Provide),
            S::Cleaning | S::CleanWait => Poll,
            _ => Prerequisite(T::Manage),
        },
        T::Active => match state {
            S::Active => Done,
            S::Available => Request(T::Active),
            S::Deploying | S::DeployWait => Poll,
            _ => Prerequisite(T::Provide),
        },
        T::Deleted => match state {
            S::Manageable | S::Available | S::Enroll => Done,
            S::Active | S::DeployWait | S::DeployFailed | S::Error => Request(T::Deleted),
            S::Cleaning | S::Deleting => Poll,
            S::InspectFailed | S::CleanFailed => Prerequisite(T::Manage),
            _ => Fatal,
        },
        T::Clean | T::Inspect => match state {
            S::Manageable => Request(target),
            _ => Prerequisite(T::Manage),
        },
    }
}

/// Next step toward `target` for a freshly reloaded node.
///
/// Same as [`next_step`], except that a verb is never sent while Ironic
/// reports a transition in flight (`target_provision_state` set): a node
/// seen in `wait call-back` after `deleted` was accepted is still
/// undeploying, and a second request would be rejected.
pub fn next_step_for(target: TargetProvisionState, node: &Node) -> Decision {
    match next_step(target, &node.provision_state) {
        Decision::Request(_) if node.is_transitioning() => Decision::Poll,
        decision => decision,
    }
}

/// Step while waiting for a requested `clean` or `inspect` to finish; both
/// return the node to `manageable`. Other targets defer to [`next_step`].
pub fn settle_step(target: TargetProvisionState, state: &ProvisionState) -> Decision {
    use Decision::*;
    use ProvisionState as S;
    use TargetProvisionState as T;

    match target {
        T::Clean => match state {
            S::Manageable => Done,
            S::Cleaning | S::CleanWait => Poll,
            _ => Fatal,
        },
        T::Inspect => match state {
            S::Manageable => Done,
            S::Inspecting | S::InspectWait => Poll,
            _ => Fatal,
        },
        T::Manage | T::Provide | T::Active | T::Deleted => next_step(target, state),
    }
}

/// Whether `target` is an operation that runs and returns to `manageable`
/// rather than a state the node converges on.
pub fn is_maintenance(target: TargetProvisionState) -> bool {
    matches!(target, TargetProvisionState::Clean | TargetProvisionState::Inspect)
}
