//! Lifecycle state-machine invariants, exercised through the registry.
//!
//! Every (state, action) pair is driven end to end: legal pairs land in the
//! documented target state, illegal ones fail and leave the record exactly
//! as it was.

use citadel_core::{
    apply, Capability, CapabilityRegistry, CapabilityState, Error, LifecycleAction, TrustLevel,
};

use CapabilityState::*;
use LifecycleAction::*;

const ALL_ACTIONS: [LifecycleAction; 5] = [Enable, Suspend, Resume, Throttle, Revoke];

/// Drive a fresh capability into the requested state via legal actions.
fn registry_in_state(state: CapabilityState) -> CapabilityRegistry {
    let mut registry = CapabilityRegistry::new();
    registry
        .register(Capability::new("app.test", TrustLevel::Community))
        .unwrap();
    let path: &[LifecycleAction] = match state {
        Installed => &[],
        Enabled => &[Enable],
        Suspended => &[Enable, Suspend],
        Throttled => &[Enable, Throttle],
        Revoked => &[Revoke],
    };
    for action in path {
        registry.transition("app.test", *action).unwrap();
    }
    assert_eq!(registry.get("app.test").unwrap().state, state);
    registry
}

#[test]
fn every_pair_agrees_with_the_transition_table() {
    for state in [Installed, Enabled, Suspended, Throttled, Revoked] {
        for action in ALL_ACTIONS {
            let mut registry = registry_in_state(state);
            let result = registry.transition("app.test", action);
            match apply(state, action) {
                Some(target) => {
                    assert_eq!(result.unwrap(), target, "{action} from {state}");
                    assert_eq!(registry.get("app.test").unwrap().state, target);
                }
                None => {
                    assert!(
                        matches!(result, Err(Error::IllegalTransition { .. })),
                        "{action} from {state} must be rejected"
                    );
                    assert_eq!(
                        registry.get("app.test").unwrap().state,
                        state,
                        "rejected {action} from {state} must not move the record"
                    );
                }
            }
        }
    }
}

#[test]
fn revoked_capability_stays_revoked() {
    let mut registry = registry_in_state(Revoked);
    for action in ALL_ACTIONS {
        assert!(registry.transition("app.test", action).is_err());
    }
    assert_eq!(registry.get("app.test").unwrap().state, Revoked);
}

#[test]
fn suspend_resume_cycle_is_repeatable() {
    let mut registry = registry_in_state(Enabled);
    for _ in 0..3 {
        registry.transition("app.test", Suspend).unwrap();
        registry.transition("app.test", Resume).unwrap();
    }
    assert_eq!(registry.get("app.test").unwrap().state, Enabled);
}

#[test]
fn unregister_then_reregister_starts_fresh() {
    let mut registry = registry_in_state(Enabled);
    assert!(registry.unregister("app.test"));
    registry
        .register(Capability::new("app.test", TrustLevel::Unknown))
        .unwrap();
    assert_eq!(registry.get("app.test").unwrap().state, Installed);
    assert_eq!(registry.get("app.test").unwrap().throttle_count, 0);
}
