//! Investor lifecycle integration tests
//!
//! Drives the state machine and the lifecycle service through complete
//! investor journeys, plus property tests over arbitrary state pairs and
//! transition sequences.

use std::sync::Arc;

use ob_onboarding::lifecycle::guards::ALL_GUARDS;
use ob_onboarding::lifecycle::{
    GuardContext, InMemoryTransitionStore, InvestorState, LifecycleEntity, LifecycleError,
    LifecycleService, LifecycleStateMachine, TransitionStore, TRANSITIONS,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::json;
use uuid::Uuid;

/// Context satisfying every guard
fn permissive_context() -> GuardContext {
    let mut ctx: GuardContext = ALL_GUARDS
        .iter()
        .map(|g| (g.context_key.to_string(), json!(true)))
        .collect();
    ctx.insert("units_outstanding".to_string(), json!(0));
    ctx
}

fn arb_state() -> impl Strategy<Value = InvestorState> {
    prop::sample::select(InvestorState::ALL.to_vec())
}

// =============================================================================
// JOURNEYS
// =============================================================================

#[test]
fn test_full_journey_to_offboarding() {
    let machine = LifecycleStateMachine::new();
    let (mut entity, initial) =
        machine.initialize(Uuid::new_v4(), "investor.create", "onboarding-desk");
    assert_eq!(initial.from_state, None);

    let path = machine
        .state_transition_path(InvestorState::Opportunity, InvestorState::Offboarded)
        .unwrap();
    assert_eq!(path.first(), Some(&InvestorState::Opportunity));
    assert_eq!(path.last(), Some(&InvestorState::Offboarded));

    let ctx = permissive_context();
    let mut history = vec![initial];
    for &to in &path[1..] {
        let record = machine
            .transition_state(&mut entity, to, "investor.set-status", &ctx, "onboarding-desk")
            .unwrap();
        history.push(record);
    }

    assert_eq!(entity.state(), InvestorState::Offboarded);
    assert!(machine.is_terminal_state(entity.state()));
    assert_eq!(history.len(), path.len());

    // Each record chains from the previous one
    for pair in history.windows(2) {
        assert_eq!(pair[1].from_state, Some(pair[0].to_state));
        assert_eq!(pair[1].sequence, pair[0].sequence + 1);
    }

    let rebuilt = LifecycleEntity::from_history(entity.entity_id(), &history).unwrap();
    assert_eq!(rebuilt, entity);
}

#[test]
fn test_kyc_rejection_and_resubmission() {
    let machine = LifecycleStateMachine::new();
    let (mut entity, _) = machine.initialize(Uuid::new_v4(), "investor.create", "ops");
    let ctx = permissive_context();

    machine
        .transition_state(
            &mut entity,
            InvestorState::Prechecks,
            "investor.record-indication",
            &ctx,
            "ops",
        )
        .unwrap();
    machine
        .transition_state(&mut entity, InvestorState::KycPending, "kyc.start", &ctx, "ops")
        .unwrap();

    // Screening hit blocks approval
    let mut screening_hit = ctx.clone();
    screening_hit.insert("screening_clear".to_string(), json!(false));
    let err = machine
        .transition_state(
            &mut entity,
            InvestorState::KycApproved,
            "kyc.approve",
            &screening_hit,
            "ops",
        )
        .unwrap_err();
    assert_eq!(
        err,
        LifecycleError::GuardConditionFailed {
            name: "screening_clear".to_string()
        }
    );
    assert_eq!(entity.state(), InvestorState::KycPending);

    // Rolled back to prechecks, then resubmitted
    machine
        .transition_state(
            &mut entity,
            InvestorState::Prechecks,
            "kyc.reject",
            &GuardContext::new(),
            "ops",
        )
        .unwrap();
    machine
        .transition_state(&mut entity, InvestorState::KycPending, "kyc.start", &ctx, "ops")
        .unwrap();
    machine
        .transition_state(&mut entity, InvestorState::KycApproved, "kyc.approve", &ctx, "ops")
        .unwrap();
    assert_eq!(entity.state(), InvestorState::KycApproved);
}

#[test]
fn test_offboarding_requires_zero_units() {
    let machine = LifecycleStateMachine::new();
    assert!(LifecycleEntity::from_history(Uuid::new_v4(), &[]).is_none());

    let (mut entity, _) = machine.initialize(Uuid::new_v4(), "investor.create", "ops");
    let ctx = permissive_context();
    for &to in &machine
        .state_transition_path(InvestorState::Opportunity, InvestorState::Redeemed)
        .unwrap()[1..]
    {
        machine.transition_state(&mut entity, to, "investor.set-status", &ctx, "ops").unwrap();
    }

    let mut still_holding = ctx.clone();
    still_holding.insert("units_outstanding".to_string(), json!(12.5));
    assert_eq!(
        machine.transition_state(
            &mut entity,
            InvestorState::Offboarded,
            "investor.offboard",
            &still_holding,
            "ops",
        ),
        Err(LifecycleError::GuardConditionFailed {
            name: "zero_balance".to_string()
        })
    );
    assert_eq!(entity.state(), InvestorState::Redeemed);
}

#[test]
fn test_transition_table_shape() {
    let machine = LifecycleStateMachine::new();
    for edge in TRANSITIONS {
        assert_ne!(edge.from, edge.to);
        assert!(machine.can_transition(edge.from, edge.to));
    }
    for state in InvestorState::ALL {
        assert_eq!(
            machine.is_terminal_state(state),
            machine.valid_transitions(state).is_empty()
        );
    }
    assert_eq!(
        InvestorState::ALL.iter().filter(|s| machine.is_terminal_state(**s)).count(),
        1
    );
}

// =============================================================================
// SERVICE
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_service_serializes_racing_transitions() {
    let service = Arc::new(LifecycleService::new(Arc::new(InMemoryTransitionStore::new())));
    let id = Uuid::new_v4();
    service.start(id, "investor.create", "ops").await.unwrap();

    let ctx = permissive_context();
    let mut handles = Vec::new();
    for n in 0..8 {
        let service = Arc::clone(&service);
        let ctx = ctx.clone();
        handles.push(tokio::spawn(async move {
            service
                .transition(
                    id,
                    InvestorState::Prechecks,
                    "investor.record-indication",
                    &ctx,
                    &format!("agent-{n}"),
                )
                .await
        }));
    }

    let mut won = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => won += 1,
            Err(LifecycleError::InvalidTransition { from, to }) => {
                assert_eq!(from, InvestorState::Prechecks);
                assert_eq!(to, InvestorState::Prechecks);
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(won, 1);
    assert_eq!(service.store().history(id).await.unwrap().len(), 2);
    assert_eq!(service.active_locks(), 0);
}

#[tokio::test]
async fn test_service_entities_are_independent() {
    let service = LifecycleService::new(Arc::new(InMemoryTransitionStore::new()));
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    service.start(a, "investor.create", "ops").await.unwrap();
    service.start(b, "investor.create", "ops").await.unwrap();

    let ctx = permissive_context();
    service
        .transition(a, InvestorState::Prechecks, "investor.record-indication", &ctx, "ops")
        .await
        .unwrap();

    assert_eq!(service.current_state(a).await.unwrap(), Some(InvestorState::Prechecks));
    assert_eq!(service.current_state(b).await.unwrap(), Some(InvestorState::Opportunity));
    assert!(matches!(
        service.start(a, "investor.create", "ops").await,
        Err(LifecycleError::AlreadyInitialized(_))
    ));
    assert!(matches!(
        service
            .transition(Uuid::new_v4(), InvestorState::Prechecks, "x", &ctx, "ops")
            .await,
        Err(LifecycleError::EntityNotFound(_))
    ));
}

// =============================================================================
// PROPERTIES
// =============================================================================

proptest! {
    #[test]
    fn no_self_transitions(state in arb_state()) {
        let machine = LifecycleStateMachine::new();
        prop_assert!(!machine.can_transition(state, state));
    }

    #[test]
    fn paths_are_legal_and_anchored(from in arb_state(), to in arb_state()) {
        let machine = LifecycleStateMachine::new();
        match machine.state_transition_path(from, to) {
            Ok(path) => {
                prop_assert_eq!(path.first(), Some(&from));
                prop_assert_eq!(path.last(), Some(&to));
                for hop in path.windows(2) {
                    prop_assert!(machine.can_transition(hop[0], hop[1]));
                }
                if from == to {
                    prop_assert_eq!(path.len(), 1);
                }
            }
            Err(e) => {
                prop_assert_eq!(e, LifecycleError::NoPathExists { from, to });
                prop_assert_ne!(from, to);
            }
        }
    }

    #[test]
    fn failed_transitions_leave_entity_untouched(
        targets in prop::collection::vec(arb_state(), 0..30),
        grant in prop::collection::vec(any::<bool>(), 10),
    ) {
        let machine = LifecycleStateMachine::new();
        let (mut entity, _) = machine.initialize(Uuid::new_v4(), "investor.create", "prop");

        // Each guard key is granted or withheld for the whole run
        let mut ctx: GuardContext = ALL_GUARDS
            .iter()
            .zip(&grant)
            .map(|(g, ok)| (g.context_key.to_string(), json!(*ok)))
            .collect();
        ctx.insert(
            "units_outstanding".to_string(),
            if grant[9] { json!(0) } else { json!(1) },
        );

        for to in targets {
            let before = entity.clone();
            match machine.transition_state(&mut entity, to, "investor.set-status", &ctx, "prop") {
                Ok(record) => {
                    prop_assert!(machine.can_transition(before.state(), to));
                    prop_assert_eq!(record.from_state, Some(before.state()));
                    prop_assert_eq!(entity.state(), to);
                    prop_assert_eq!(entity.version(), before.version() + 1);
                }
                Err(_) => {
                    prop_assert_eq!(&entity, &before);
                }
            }
        }
    }

    #[test]
    fn named_boundary_matches_typed(from in arb_state(), to in arb_state()) {
        let machine = LifecycleStateMachine::new();
        prop_assert_eq!(
            machine.can_transition_named(from.as_str(), to.as_str()),
            machine.can_transition(from, to)
        );
        prop_assert_eq!(machine.is_terminal_named(from.as_str()), machine.is_terminal_state(from));
        prop_assert!(!machine.can_transition_named("NOT_A_STATE", to.as_str()));
    }
}
