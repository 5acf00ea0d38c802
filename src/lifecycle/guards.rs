//! Guard Conditions
//!
//! Named predicates gating individual lifecycle transitions. Guards are pure:
//! they read only the caller-supplied context map and never perform I/O. The
//! keys each guard expects are part of the contract between this registry and
//! the callers that assemble the context (usually the executor of the
//! triggering verb).

use serde_json::Value;
use std::collections::HashMap;

/// Caller-supplied key/value facts a guard is evaluated against
pub type GuardContext = HashMap<String, Value>;

/// A named boolean predicate attached to one or more transition edges
#[derive(Clone, Copy)]
pub struct GuardCondition {
    /// Stable guard name, surfaced in `GuardConditionFailed`
    pub name: &'static str,
    /// Human-readable description of the precondition
    pub description: &'static str,
    /// Context key the guard reads
    pub context_key: &'static str,
    check: fn(&GuardContext, &str) -> bool,
}

impl GuardCondition {
    /// Guard that passes iff `context_key` holds JSON `true`
    pub const fn flag(
        name: &'static str,
        description: &'static str,
        context_key: &'static str,
    ) -> Self {
        Self {
            name,
            description,
            context_key,
            check: flag_is_set,
        }
    }

    /// Guard that passes iff `context_key` holds a number equal to zero
    pub const fn zero(
        name: &'static str,
        description: &'static str,
        context_key: &'static str,
    ) -> Self {
        Self {
            name,
            description,
            context_key,
            check: is_zero,
        }
    }

    /// Evaluate the predicate against a context
    pub fn check(&self, context: &GuardContext) -> bool {
        (self.check)(context, self.context_key)
    }
}

impl std::fmt::Debug for GuardCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardCondition")
            .field("name", &self.name)
            .field("context_key", &self.context_key)
            .finish()
    }
}

impl PartialEq for GuardCondition {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.context_key == other.context_key
    }
}

fn flag_is_set(context: &GuardContext, key: &str) -> bool {
    matches!(context.get(key), Some(Value::Bool(true)))
}

fn is_zero(context: &GuardContext, key: &str) -> bool {
    context.get(key).is_some_and(|v| {
        v.as_u64() == Some(0) || v.as_i64() == Some(0) || v.as_f64() == Some(0.0)
    })
}

// ============================================================================
// Built-in guards
// ============================================================================

pub const INDICATION_RECORDED: GuardCondition = GuardCondition::flag(
    "indication_recorded",
    "Investor has recorded an indication of interest",
    "indication",
);

pub const INVESTOR_ELIGIBLE: GuardCondition = GuardCondition::flag(
    "investor_eligible",
    "Eligibility and suitability prechecks passed",
    "eligible",
);

pub const KYC_DOCUMENTS_COMPLETE: GuardCondition = GuardCondition::flag(
    "kyc_documents_complete",
    "All required KYC documents received and reviewed",
    "documents_complete",
);

pub const SCREENING_CLEAR: GuardCondition = GuardCondition::flag(
    "screening_clear",
    "Sanctions / PEP / adverse media screening has no open hits",
    "screening_clear",
);

pub const SUBSCRIPTION_ORDER_RECEIVED: GuardCondition = GuardCondition::flag(
    "subscription_order_received",
    "Signed subscription order is on file",
    "subscription_order",
);

pub const CASH_RECEIVED: GuardCondition = GuardCondition::flag(
    "cash_received",
    "Subscription cash has been received and matched",
    "cash_received",
);

pub const NAV_STRUCK: GuardCondition = GuardCondition::flag(
    "nav_struck",
    "NAV for the dealing date has been struck",
    "nav_struck",
);

pub const REDEMPTION_REQUESTED: GuardCondition = GuardCondition::flag(
    "redemption_requested",
    "Redemption request received from the investor",
    "redemption_request",
);

pub const REDEMPTION_SETTLED: GuardCondition = GuardCondition::flag(
    "redemption_settled",
    "Redemption proceeds paid out",
    "redemption_settled",
);

pub const ZERO_BALANCE: GuardCondition = GuardCondition::zero(
    "zero_balance",
    "No units remain outstanding",
    "units_outstanding",
);

/// Every built-in guard, for introspection
pub const ALL_GUARDS: [GuardCondition; 10] = [
    INDICATION_RECORDED,
    INVESTOR_ELIGIBLE,
    KYC_DOCUMENTS_COMPLETE,
    SCREENING_CLEAR,
    SUBSCRIPTION_ORDER_RECEIVED,
    CASH_RECEIVED,
    NAV_STRUCK,
    REDEMPTION_REQUESTED,
    REDEMPTION_SETTLED,
    ZERO_BALANCE,
];

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(pairs: &[(&str, Value)]) -> GuardContext {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_flag_guard() {
        assert!(INDICATION_RECORDED.check(&ctx(&[("indication", json!(true))])));
        assert!(!INDICATION_RECORDED.check(&ctx(&[("indication", json!(false))])));
        assert!(!INDICATION_RECORDED.check(&ctx(&[])));
        // Truthy strings are not booleans
        assert!(!INDICATION_RECORDED.check(&ctx(&[("indication", json!("true"))])));
    }

    #[test]
    fn test_zero_guard() {
        assert!(ZERO_BALANCE.check(&ctx(&[("units_outstanding", json!(0))])));
        assert!(ZERO_BALANCE.check(&ctx(&[("units_outstanding", json!(0.0))])));
        assert!(!ZERO_BALANCE.check(&ctx(&[("units_outstanding", json!(12.5))])));
        assert!(!ZERO_BALANCE.check(&ctx(&[("units_outstanding", json!(1e-17))])));
        assert!(!ZERO_BALANCE.check(&ctx(&[("units_outstanding", json!(-1e-17))])));
        assert!(!ZERO_BALANCE.check(&ctx(&[("units_outstanding", json!("0"))])));
        assert!(!ZERO_BALANCE.check(&ctx(&[])));
    }

    #[test]
    fn test_guard_names_unique() {
        let mut names: Vec<_> = ALL_GUARDS.iter().map(|g| g.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), ALL_GUARDS.len());
    }
}
