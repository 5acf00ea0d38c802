//! Compilation Diagnostics
//!
//! Single diagnostic type used by validation, graph construction, planning
//! and the optimization passes. Callers must check both the critical list and
//! the warning list before trusting a plan.

use dsl_types::Severity;
use serde::{Deserialize, Serialize};

/// Diagnostic codes for categorizing issues
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticCode {
    // =========================================================================
    // Compile-critical
    // =========================================================================
    UnregisteredVerb,
    CyclicDependency,
    UnknownNode,

    // =========================================================================
    // Compile-advisory
    // =========================================================================
    UnknownAttribute,
    PassFailed,
    DuplicateOperation,
    ConcurrencyBudgetExceeded,
}

/// A diagnostic attached to a compilation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompileDiagnostic {
    pub severity: Severity,
    pub code: DiagnosticCode,
    pub message: String,
    /// Graph node the diagnostic concerns, if any
    pub node_id: Option<String>,
    pub source_line: Option<usize>,
    /// Candidate fixes (e.g. registered verbs close to an unknown one)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

impl CompileDiagnostic {
    fn new(severity: Severity, code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            severity,
            code,
            message: message.into(),
            node_id: None,
            source_line: None,
            suggestions: vec![],
        }
    }

    /// Create a plan-blocking diagnostic
    pub fn critical(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::new(Severity::Critical, code, message)
    }

    /// Create an advisory diagnostic
    pub fn warning(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, code, message)
    }

    pub fn at_node(mut self, node_id: impl Into<String>, source_line: usize) -> Self {
        self.node_id = Some(node_id.into());
        self.source_line = Some(source_line);
        self
    }

    pub fn with_node(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }

    pub fn is_critical(&self) -> bool {
        self.severity.is_blocking()
    }
}

impl std::fmt::Display for CompileDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {:?}: {}", self.severity, self.code, self.message)?;
        if let Some(line) = self.source_line {
            write!(f, " (line {})", line)?;
        }
        if let Some(first) = self.suggestions.first() {
            write!(f, "\n  Did you mean: {}?", first)?;
        }
        Ok(())
    }
}

/// Record of an optimization pass annotating the plan
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizationRecord {
    pub pass: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub node_ids: Vec<String>,
}

// =============================================================================
// Convenience Builders
// =============================================================================

/// Create an error for a verb missing from the registry
pub fn unregistered_verb(
    verb: &str,
    node_id: &str,
    source_line: usize,
    suggestions: Vec<String>,
) -> CompileDiagnostic {
    CompileDiagnostic::critical(
        DiagnosticCode::UnregisteredVerb,
        format!("verb '{}' is not registered", verb),
    )
    .at_node(node_id, source_line)
    .with_suggestions(suggestions)
}

/// Create an error for cyclic dependency
pub fn cycle_error(involved: &[String]) -> CompileDiagnostic {
    CompileDiagnostic::critical(
        DiagnosticCode::CyclicDependency,
        format!("Circular dependency detected involving: {}", involved.join(" -> ")),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_suggestion() {
        let d = unregistered_verb("kyc.verfy", "op_1", 4, vec!["kyc.verify".into()]);
        let text = d.to_string();
        assert!(text.starts_with("[critical] UnregisteredVerb"));
        assert!(text.contains("(line 4)"));
        assert!(text.contains("Did you mean: kyc.verify?"));
        assert!(d.is_critical());
    }

    #[test]
    fn test_warning_not_critical() {
        let d = CompileDiagnostic::warning(DiagnosticCode::UnknownAttribute, "unknown attribute");
        assert!(!d.is_critical());
        assert_eq!(d.node_id, None);
    }
}
