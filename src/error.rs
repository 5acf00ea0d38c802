//! Crate-wide error type
//!
//! Each subsystem keeps its own `thiserror` enum; `OnboardingError` wraps them
//! for callers that drive more than one subsystem.

use thiserror::Error;

use crate::compiler::CompileError;
use crate::executor::ExecutorError;
use crate::lifecycle::LifecycleError;

#[derive(Error, Debug)]
pub enum OnboardingError {
    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("Execution error: {0}")]
    Executor(#[from] ExecutorError),

    #[error("Operation error: {0}")]
    Operation(#[from] dsl_types::OperationError),

    #[error("Configuration error: {0:#}")]
    Config(#[from] anyhow::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, OnboardingError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::InvestorState;

    #[test]
    fn test_conversions() {
        fn guard() -> Result<()> {
            let checked: std::result::Result<(), LifecycleError> =
                Err(LifecycleError::GuardConditionFailed {
                    name: "cash_received".into(),
                });
            checked?;
            Ok(())
        }
        let err = guard().unwrap_err();
        assert!(matches!(err, OnboardingError::Lifecycle(_)));
        assert_eq!(err.to_string(), "Lifecycle error: guard condition failed: cash_received");

        let err: OnboardingError = LifecycleError::NoPathExists {
            from: InvestorState::Offboarded,
            to: InvestorState::Active,
        }
        .into();
        assert!(err.to_string().contains("OFFBOARDED"));
    }

    #[test]
    fn test_yaml_error_converts() {
        let parsed: std::result::Result<Vec<String>, _> = serde_yaml::from_str("{ not: [a list");
        let err: OnboardingError = parsed.unwrap_err().into();
        assert!(matches!(err, OnboardingError::Yaml(_)));
    }
}
