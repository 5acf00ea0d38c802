//! Registry validation
//!
//! Checks every operation against the verb and attribute registries. Problems
//! are collected, never raised: graph construction always proceeds so the
//! caller sees the full picture in one compilation.

use dsl_types::Operation;
use tracing::debug;

use super::dag::op_node_id;
use super::diagnostics::{unregistered_verb, CompileDiagnostic, DiagnosticCode};
use super::registry::{AttributeRegistry, VerbRegistry};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ValidationOutcome {
    /// Critical: unregistered verbs
    pub errors: Vec<CompileDiagnostic>,
    /// Advisory: unknown attribute references
    pub warnings: Vec<CompileDiagnostic>,
}

impl ValidationOutcome {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }
}

pub fn validate(
    ops: &[Operation],
    verbs: &VerbRegistry,
    attributes: &AttributeRegistry,
) -> ValidationOutcome {
    let mut outcome = ValidationOutcome::default();

    for (idx, op) in ops.iter().enumerate() {
        let node_id = op_node_id(idx);

        if !verbs.contains(op.verb()) {
            let suggestions = verbs.suggestions(op.verb());
            debug!(
                verb = op.verb(),
                ?suggestions,
                "unregistered verb at line {}",
                op.source_line()
            );
            outcome
                .errors
                .push(unregistered_verb(op.verb(), &node_id, op.source_line(), suggestions));
        }

        for attr in op.attribute_refs() {
            if !attributes.contains(attr) {
                outcome.warnings.push(
                    CompileDiagnostic::warning(
                        DiagnosticCode::UnknownAttribute,
                        format!(
                            "attribute '{}' referenced by {} is not in the dictionary",
                            attr,
                            op.verb()
                        ),
                    )
                    .at_node(&node_id, op.source_line()),
                );
            }
        }
    }

    outcome
}
