//! Investor Lifecycle
//!
//! Guarded finite-state machine governing legal status changes of an
//! onboarding entity.
//!
//! ```text
//! OPPORTUNITY → PRECHECKS ⇄ KYC_PENDING → KYC_APPROVED → SUB_PENDING_CASH
//!     → FUNDED_PENDING_NAV → ISSUED → ACTIVE ⇄ REDEEM_PENDING → REDEEMED → OFFBOARDED
//!                                      ACTIVE → SUB_PENDING_CASH (top-up)
//! ```

pub mod guards;
pub mod machine;
pub mod record;
pub mod state;
pub mod store;
pub mod transitions;

use thiserror::Error;
use uuid::Uuid;

pub use guards::{GuardCondition, GuardContext};
pub use machine::LifecycleStateMachine;
pub use record::{LifecycleEntity, LifecycleTransitionRecord};
pub use state::InvestorState;
pub use store::{InMemoryTransitionStore, LifecycleService, StoreError, TransitionStore};
pub use transitions::{TransitionEdge, TRANSITIONS};

/// Lifecycle failures. None of these are retried by the machine itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    /// Edge not in the static table; surfaced verbatim, never retried
    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition {
        from: InvestorState,
        to: InvestorState,
    },

    /// Precondition missing; the caller may resolve it and retry later
    #[error("guard condition failed: {name}")]
    GuardConditionFailed { name: String },

    #[error("no path exists from {from} to {to}")]
    NoPathExists {
        from: InvestorState,
        to: InvestorState,
    },

    #[error("unknown lifecycle state: '{0}'")]
    UnknownState(String),

    #[error("entity {0} has no lifecycle history")]
    EntityNotFound(Uuid),

    #[error("entity {0} is already in the lifecycle")]
    AlreadyInitialized(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}
