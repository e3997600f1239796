//! Row-by-row checks of the provisioning transition table.

use ironic_provision::ironic::{Node, ProvisionState, TargetProvisionState};
use ironic_provision::workflow::{next_step, next_step_for, settle_step, Decision};

use Decision::*;
use ProvisionState as S;
use TargetProvisionState as T;

const EVERY_STATE: [S; 22] = [
    S::Enroll,
    S::Verifying,
    S::Manageable,
    S::Available,
    S::Active,
    S::Deploying,
    S::DeployWait,
    S::DeployFailed,
    S::Cleaning,
    S::CleanWait,
    S::CleanFailed,
    S::Inspecting,
    S::InspectWait,
    S::InspectFailed,
    S::Deleting,
    S::Error,
    S::Adopting,
    S::AdoptFailed,
    S::Rescuing,
    S::RescueWait,
    S::RescueFailed,
    S::Rescue,
];

/// Explicit rows; every (target, state) pair not listed falls back to the
/// target's default decision below.
fn table() -> Vec<(T, S, Decision)> {
    vec![
        (T::Manage, S::Manageable, Done),
        (T::Manage, S::Enroll, Request(T::Manage)),
        (T::Manage, S::AdoptFailed, Request(T::Manage)),
        (T::Manage, S::CleanFailed, Request(T::Manage)),
        (T::Manage, S::InspectFailed, Request(T::Manage)),
        (T::Manage, S::Available, Request(T::Manage)),
        (T::Manage, S::Verifying, Poll),
        (T::Provide, S::Available, Done),
        (T::Provide, S::Manageable, Request(T::Provide)),
        (T::Provide, S::Cleaning, Poll),
        (T::Provide, S::CleanWait, Poll),
        (T::Active, S::Active, Done),
        (T::Active, S::Available, Request(T::Active)),
        (T::Active, S::Deploying, Poll),
        (T::Active, S::DeployWait, Poll),
        (T::Deleted, S::Manageable, Done),
        (T::Deleted, S::Available, Done),
        (T::Deleted, S::Enroll, Done),
        (T::Deleted, S::Active, Request(T::Deleted)),
        (T::Deleted, S::DeployWait, Request(T::Deleted)),
        (T::Deleted, S::DeployFailed, Request(T::Deleted)),
        (T::Deleted, S::Error, Request(T::Deleted)),
        (T::Deleted, S::Cleaning, Poll),
        (T::Deleted, S::Deleting, Poll),
        (T::Deleted, S::InspectFailed, Prerequisite(T::Manage)),
        (T::Deleted, S::CleanFailed, Prerequisite(T::Manage)),
        (T::Clean, S::Manageable, Request(T::Clean)),
        (T::Inspect, S::Manageable, Request(T::Inspect)),
    ]
}

fn fallback(target: T) -> Decision {
    match target {
        T::Manage | T::Deleted => Fatal,
        T::Provide => Prerequisite(T::Manage),
        T::Active => Prerequisite(T::Provide),
        T::Clean | T::Inspect => Prerequisite(T::Manage),
    }
}

#[test]
fn test_every_target_and_state_pair() {
    let rows = table();
    for target in T::ALL {
        for state in EVERY_STATE.iter().cloned().chain([S::Unknown("servicing".to_string())]) {
            let expected = rows
                .iter()
                .find(|(t, s, _)| *t == target && *s == state)
                .map(|(_, _, decision)| *decision)
                .unwrap_or_else(|| fallback(target));
            assert_eq!(
                next_step(target, &state),
                expected,
                "next_step({target}, '{state}')"
            );
        }
    }
}

#[test]
fn test_terminal_states_are_idempotent() {
    let terminal = [
        (T::Manage, S::Manageable),
        (T::Provide, S::Available),
        (T::Active, S::Active),
        (T::Deleted, S::Manageable),
        (T::Deleted, S::Available),
        (T::Deleted, S::Enroll),
    ];
    for (target, state) in terminal {
        assert_eq!(next_step(target, &state), Done, "{target} from '{state}'");
    }
}

#[test]
fn test_requested_verb_is_never_a_different_target_family() {
    // A converging target only ever requests itself; detours go through Prerequisite.
    for target in T::ALL {
        for state in EVERY_STATE.iter() {
            if let Request(verb) = next_step(target, state) {
                assert_eq!(verb, target, "next_step({target}, '{state}') requested {verb}");
            }
        }
    }
}

#[test]
fn test_maintenance_settling() {
    let rows = [
        (T::Clean, S::Manageable, Done),
        (T::Clean, S::Cleaning, Poll),
        (T::Clean, S::CleanWait, Poll),
        (T::Clean, S::CleanFailed, Fatal),
        (T::Clean, S::Available, Fatal),
        (T::Inspect, S::Manageable, Done),
        (T::Inspect, S::Inspecting, Poll),
        (T::Inspect, S::InspectWait, Poll),
        (T::Inspect, S::InspectFailed, Fatal),
        (T::Inspect, S::Cleaning, Fatal),
    ];
    for (target, state, expected) in rows {
        assert_eq!(settle_step(target, &state), expected, "settle_step({target}, '{state}')");
    }

    for state in EVERY_STATE.iter() {
        assert_eq!(settle_step(T::Active, state), next_step(T::Active, state));
    }
}

#[test]
fn test_no_request_while_a_transition_is_in_flight() {
    for target in T::ALL {
        for state in EVERY_STATE.iter() {
            let mut node = Node::new("n1", state.clone());
            assert_eq!(next_step_for(target, &node), next_step(target, state));

            node.target_provision_state = Some(S::Available);
            let expected = match next_step(target, state) {
                Request(_) => Poll,
                other => other,
            };
            assert_eq!(next_step_for(target, &node), expected, "{target} from '{state}' in flight");
        }
    }
}
