//! DSL Types - Level 1 Foundation Types
//!
//! This crate contains the pure data structures shared by the lifecycle state
//! machine and the execution-plan compiler. It sits at the bottom of the
//! dependency hierarchy and depends on NOTHING else in the workspace.
//!
//! ## Contents
//!
//! - [`Operation`]: one declared DSL action (verb, domain, parameters, source line)
//! - [`OperationSpec`]: the wire form an external parser hands us
//! - [`Severity`]: diagnostic severity shared by validation and compilation
//! - Attribute reference helpers for the `@attr{<id>}` parameter form
//!
//! ## Critical Rules
//!
//! 1. **NO BUSINESS LOGIC** - Only data structures and their accessors
//! 2. **NO WORKSPACE DEPENDENCIES** - Cannot depend on other workspace crates
//! 3. **SERIALIZABLE** - All types must support serde

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// OPERATION MODEL
// ============================================================================

/// Prefix of an attribute reference inside an operation parameter
pub const ATTR_REF_PREFIX: &str = "@attr{";

/// A declared DSL operation, e.g. `(kyc.verify :investor @attr{legal-name})`.
///
/// The domain is always derived from the verb's first dotted segment, so the
/// fields are private: an `Operation` cannot be built with a domain that
/// disagrees with its verb, and it is never mutated after parsing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "OperationSpec")]
pub struct Operation {
    verb: String,
    domain: String,
    parameters: Vec<String>,
    source_line: usize,
}

impl Operation {
    /// Create an operation; the domain is derived from `verb`
    pub fn new(verb: impl Into<String>, parameters: Vec<String>, source_line: usize) -> Self {
        let verb = verb.into();
        let domain = domain_of(&verb).to_string();
        Self {
            verb,
            domain,
            parameters,
            source_line,
        }
    }

    /// Create an operation, rejecting verbs that cannot name a domain
    pub fn try_new(
        verb: impl Into<String>,
        parameters: Vec<String>,
        source_line: usize,
    ) -> Result<Self, OperationError> {
        let verb = verb.into();
        if verb.trim().is_empty() {
            return Err(OperationError::EmptyVerb { source_line });
        }
        if verb.starts_with('.') || verb.ends_with('.') || verb.contains("..") {
            return Err(OperationError::MalformedVerb { verb, source_line });
        }
        Ok(Self::new(verb, parameters, source_line))
    }

    /// Full dotted verb name (e.g. "kyc.verify")
    pub fn verb(&self) -> &str {
        &self.verb
    }

    /// Owning domain (first dotted segment of the verb)
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Ordered parameters as written in the source
    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    /// Line of the declaration in its source document
    pub fn source_line(&self) -> usize {
        self.source_line
    }

    /// Attribute ids referenced via `@attr{<id>}` in any parameter, in order
    pub fn attribute_refs(&self) -> Vec<&str> {
        self.parameters
            .iter()
            .flat_map(|p| attribute_refs_in(p))
            .collect()
    }

    /// Human-readable one-line description
    pub fn describe(&self) -> String {
        if self.parameters.is_empty() {
            format!("({})", self.verb)
        } else {
            format!("({} {})", self.verb, self.parameters.join(" "))
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.describe())
    }
}

/// Wire form of an operation as produced by the external DSL parser
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationSpec {
    pub verb: String,
    #[serde(default)]
    pub parameters: Vec<String>,
    #[serde(default)]
    pub source_line: usize,
}

impl From<OperationSpec> for Operation {
    fn from(spec: OperationSpec) -> Self {
        Operation::new(spec.verb, spec.parameters, spec.source_line)
    }
}

impl From<&Operation> for OperationSpec {
    fn from(op: &Operation) -> Self {
        Self {
            verb: op.verb.clone(),
            parameters: op.parameters.clone(),
            source_line: op.source_line,
        }
    }
}

/// Errors raised when constructing an operation from untrusted input
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperationError {
    #[error("empty verb at line {source_line}")]
    EmptyVerb { source_line: usize },

    #[error("malformed verb '{verb}' at line {source_line}")]
    MalformedVerb { verb: String, source_line: usize },
}

/// Domain of a dotted verb name: `kyc.verify` → `kyc`
pub fn domain_of(verb: &str) -> &str {
    verb.split('.').next().unwrap_or(verb)
}

/// Extract every `@attr{<id>}` reference from a single parameter
pub fn attribute_refs_in(parameter: &str) -> Vec<&str> {
    let mut refs = Vec::new();
    let mut rest = parameter;
    while let Some(start) = rest.find(ATTR_REF_PREFIX) {
        let after = &rest[start + ATTR_REF_PREFIX.len()..];
        match after.find('}') {
            Some(end) => {
                let id = after[..end].trim().trim_matches('"');
                if !id.is_empty() {
                    refs.push(id);
                }
                rest = &after[end + 1..];
            }
            None => break,
        }
    }
    refs
}

// ============================================================================
// DIAGNOSTIC SEVERITY
// ============================================================================

/// Severity levels for validation and compilation diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational record (e.g. an applied optimization)
    Info,
    /// Advisory issue; the plan remains usable
    Warning,
    /// Blocks execution of the produced plan
    Critical,
}

impl Severity {
    /// Get human-readable severity name
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }

    /// Whether a diagnostic at this level makes a plan unusable
    pub fn is_blocking(&self) -> bool {
        matches!(self, Severity::Critical)
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
