//! Domain Ordering Rules
//!
//! Known business-process ordering between onboarding verbs, expressed as
//! conservative string heuristics over verb names. They do not infer data
//! flow. Each rule only looks at operations declared *before* the one being
//! placed, so declaration order stands in for causal intent: a verification
//! declared after the custody set-up it should gate adds no edge.

use dsl_types::Operation;

/// A named rule contributing REQUIRES edges to the dependency graph
pub trait OrderingRule: Send + Sync {
    fn name(&self) -> &'static str;

    /// Indices of operations that `ops[index]` must wait for
    fn dependencies_for(&self, index: usize, ops: &[Operation]) -> Vec<usize>;
}

// =============================================================================
// Verb predicates
// =============================================================================

/// Custody resource set-up: a `resources.create` verb in the custody sub-domain
pub fn is_custody_resource_creation(op: &Operation) -> bool {
    op.verb().contains("resources.create")
        && (op.verb().contains("custody")
            || op.parameters().iter().any(|p| p.contains("custody")))
}

/// Completion of KYC or UBO due diligence
pub fn is_due_diligence_completion(verb: &str) -> bool {
    verb.contains("ubo.verify") || verb.contains("kyc.complete") || verb.contains("kyc.verify")
}

pub fn is_ubo_verification(verb: &str) -> bool {
    verb.contains("ubo.verify")
}

pub fn is_ubo_discovery(verb: &str) -> bool {
    verb.contains("ubo.discover") || verb.contains("ubo.identify")
}

pub fn is_kyc_verification(verb: &str) -> bool {
    verb.contains("kyc.verify") || verb.contains("kyc.complete")
}

pub fn is_kyc_collection(verb: &str) -> bool {
    verb.contains("kyc.collect") || verb.contains("kyc.start")
}

fn all_preceding(index: usize, ops: &[Operation], pred: fn(&str) -> bool) -> Vec<usize> {
    ops[..index.min(ops.len())]
        .iter()
        .enumerate()
        .filter(|(_, op)| pred(op.verb()))
        .map(|(i, _)| i)
        .collect()
}

// =============================================================================
// Rules
// =============================================================================

/// Custody resources wait for the nearest preceding KYC/UBO completion
pub struct CustodyAfterDueDiligence;

impl OrderingRule for CustodyAfterDueDiligence {
    fn name(&self) -> &'static str {
        "custody_after_due_diligence"
    }

    fn dependencies_for(&self, index: usize, ops: &[Operation]) -> Vec<usize> {
        match ops.get(index) {
            Some(op) if is_custody_resource_creation(op) => ops[..index]
                .iter()
                .rposition(|prior| is_due_diligence_completion(prior.verb()))
                .into_iter()
                .collect(),
            _ => vec![],
        }
    }
}

/// UBO verification waits for every preceding discovery
pub struct UboVerificationAfterDiscovery;

impl OrderingRule for UboVerificationAfterDiscovery {
    fn name(&self) -> &'static str {
        "ubo_verification_after_discovery"
    }

    fn dependencies_for(&self, index: usize, ops: &[Operation]) -> Vec<usize> {
        match ops.get(index) {
            Some(op) if is_ubo_verification(op.verb()) => {
                all_preceding(index, ops, is_ubo_discovery)
            }
            _ => vec![],
        }
    }
}

/// KYC verification waits for every preceding collection
pub struct KycVerificationAfterCollection;

impl OrderingRule for KycVerificationAfterCollection {
    fn name(&self) -> &'static str {
        "kyc_verification_after_collection"
    }

    fn dependencies_for(&self, index: usize, ops: &[Operation]) -> Vec<usize> {
        match ops.get(index) {
            Some(op) if is_kyc_verification(op.verb()) => {
                all_preceding(index, ops, is_kyc_collection)
            }
            _ => vec![],
        }
    }
}

/// The built-in rules, in precedence order
pub fn default_rules() -> Vec<Box<dyn OrderingRule>> {
    vec![
        Box::new(CustodyAfterDueDiligence),
        Box::new(UboVerificationAfterDiscovery),
        Box::new(KycVerificationAfterCollection),
    ]
}
