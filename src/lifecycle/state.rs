//! Investor Lifecycle States
//!
//! The closed set of states an investor moves through from first contact to
//! offboarding. Names match the SCREAMING_SNAKE_CASE values stored by the
//! external persistence layer and used in DSL status arguments.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::LifecycleError;

/// One state of the investor lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvestorState {
    /// Prospect identified, no commitment yet
    Opportunity,
    /// Eligibility and suitability checks
    Prechecks,
    /// KYC documents requested / under review
    KycPending,
    /// KYC signed off
    KycApproved,
    /// Subscription order received, awaiting cash
    SubPendingCash,
    /// Cash received, awaiting NAV strike
    FundedPendingNav,
    /// Units issued at the struck NAV
    Issued,
    /// Holding units
    Active,
    /// Redemption requested
    RedeemPending,
    /// Redemption settled
    Redeemed,
    /// Relationship closed (terminal)
    Offboarded,
}

impl InvestorState {
    /// Every modeled state, in lifecycle order
    pub const ALL: [InvestorState; 11] = [
        InvestorState::Opportunity,
        InvestorState::Prechecks,
        InvestorState::KycPending,
        InvestorState::KycApproved,
        InvestorState::SubPendingCash,
        InvestorState::FundedPendingNav,
        InvestorState::Issued,
        InvestorState::Active,
        InvestorState::RedeemPending,
        InvestorState::Redeemed,
        InvestorState::Offboarded,
    ];

    /// State every new entity starts in
    pub const INITIAL: InvestorState = InvestorState::Opportunity;

    /// Canonical storage name
    pub fn as_str(&self) -> &'static str {
        match self {
            InvestorState::Opportunity => "OPPORTUNITY",
            InvestorState::Prechecks => "PRECHECKS",
            InvestorState::KycPending => "KYC_PENDING",
            InvestorState::KycApproved => "KYC_APPROVED",
            InvestorState::SubPendingCash => "SUB_PENDING_CASH",
            InvestorState::FundedPendingNav => "FUNDED_PENDING_NAV",
            InvestorState::Issued => "ISSUED",
            InvestorState::Active => "ACTIVE",
            InvestorState::RedeemPending => "REDEEM_PENDING",
            InvestorState::Redeemed => "REDEEMED",
            InvestorState::Offboarded => "OFFBOARDED",
        }
    }
}

impl std::fmt::Display for InvestorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for InvestorState {
    type Err = LifecycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        InvestorState::ALL
            .iter()
            .copied()
            .find(|state| state.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| LifecycleError::UnknownState(s.to_string()))
    }
}
