//! Transition Table
//!
//! The static edge list of the investor lifecycle, indexed once into an
//! adjacency map (state → allowed targets) and a guard map ((from, to) →
//! guards). Both indexes are immutable after first use, so concurrent readers
//! need no locking.

use std::collections::HashMap;
use std::sync::OnceLock;

use super::guards::{
    GuardCondition, CASH_RECEIVED, INDICATION_RECORDED, INVESTOR_ELIGIBLE,
    KYC_DOCUMENTS_COMPLETE, NAV_STRUCK, REDEMPTION_REQUESTED, REDEMPTION_SETTLED,
    SCREENING_CLEAR, SUBSCRIPTION_ORDER_RECEIVED, ZERO_BALANCE,
};
use super::state::InvestorState;

use InvestorState::*;

/// A structurally legal (from, to) pair and the guards gating it
#[derive(Debug, Clone, Copy)]
pub struct TransitionEdge {
    pub from: InvestorState,
    pub to: InvestorState,
    /// Evaluated in this order; the first failure is reported
    pub guards: &'static [GuardCondition],
    /// Rollback edges move an entity back to an earlier stage
    pub rollback: bool,
}

const fn edge(
    from: InvestorState,
    to: InvestorState,
    guards: &'static [GuardCondition],
) -> TransitionEdge {
    TransitionEdge {
        from,
        to,
        guards,
        rollback: false,
    }
}

const fn rollback(from: InvestorState, to: InvestorState) -> TransitionEdge {
    TransitionEdge {
        from,
        to,
        guards: &[],
        rollback: true,
    }
}

/// Every legal edge. Order within a source state is the BFS exploration order.
pub const TRANSITIONS: &[TransitionEdge] = &[
    edge(Opportunity, Prechecks, &[INDICATION_RECORDED]),
    edge(Prechecks, KycPending, &[INVESTOR_ELIGIBLE]),
    edge(KycPending, KycApproved, &[KYC_DOCUMENTS_COMPLETE, SCREENING_CLEAR]),
    rollback(KycPending, Prechecks),
    edge(KycApproved, SubPendingCash, &[SUBSCRIPTION_ORDER_RECEIVED]),
    edge(SubPendingCash, FundedPendingNav, &[CASH_RECEIVED]),
    edge(FundedPendingNav, Issued, &[NAV_STRUCK]),
    edge(Issued, Active, &[]),
    // Top-up subscription from an existing holding
    edge(Active, SubPendingCash, &[SUBSCRIPTION_ORDER_RECEIVED]),
    edge(Active, RedeemPending, &[REDEMPTION_REQUESTED]),
    edge(RedeemPending, Redeemed, &[REDEMPTION_SETTLED]),
    // Redemption withdrawn before settlement
    rollback(RedeemPending, Active),
    edge(Redeemed, Offboarded, &[ZERO_BALANCE]),
];

pub(crate) struct TransitionIndex {
    pub adjacency: HashMap<InvestorState, Vec<InvestorState>>,
    pub guards: HashMap<(InvestorState, InvestorState), &'static [GuardCondition]>,
}

static INDEX: OnceLock<TransitionIndex> = OnceLock::new();

/// The shared, lazily built transition index
pub(crate) fn index() -> &'static TransitionIndex {
    INDEX.get_or_init(|| {
        let mut adjacency: HashMap<InvestorState, Vec<InvestorState>> = InvestorState::ALL
            .iter()
            .map(|s| (*s, Vec::new()))
            .collect();
        let mut guards = HashMap::new();

        for t in TRANSITIONS {
            if t.from == t.to {
                // Self-edges are never legal
                continue;
            }
            let targets = adjacency.entry(t.from).or_default();
            if !targets.contains(&t.to) {
                targets.push(t.to);
            }
            guards.insert((t.from, t.to), t.guards);
        }

        TransitionIndex { adjacency, guards }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_self_edges() {
        assert!(TRANSITIONS.iter().all(|t| t.from != t.to));
    }

    #[test]
    fn test_every_non_terminal_state_has_an_exit() {
        let idx = index();
        for state in InvestorState::ALL {
            let exits = &idx.adjacency[&state];
            if state == Offboarded {
                assert!(exits.is_empty());
            } else {
                assert!(!exits.is_empty(), "{} has no outgoing edge", state);
            }
        }
    }

    #[test]
    fn test_rollback_edges_are_unguarded() {
        for t in TRANSITIONS.iter().filter(|t| t.rollback) {
            assert!(t.guards.is_empty(), "{} -> {}", t.from, t.to);
        }
    }
}
