//! OB Onboarding - Investor Lifecycle and Execution Planning
//!
//! Coordinates a multi-step financial-onboarding workflow:
//!
//! - [`lifecycle`]: guarded finite-state machine over the legal investor
//!   states, plus a service that serializes transitions per entity
//! - [`compiler`]: turns an unordered bag of DSL operations into a validated,
//!   leveled, parallelizable execution plan
//! - [`executor`]: runs a compiled plan phase by phase with bounded concurrency
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use dsl_types::Operation;
//! use ob_onboarding::compiler::{describe_plan, AttributeRegistry, PlanCompiler, VerbRegistry};
//!
//! let verbs: VerbRegistry = ["kyc.start", "kyc.verify", "resources.create.custody"]
//!     .into_iter()
//!     .collect();
//! let compiler = PlanCompiler::new(Arc::new(verbs), Arc::new(AttributeRegistry::default()));
//!
//! let result = compiler.compile(&[
//!     Operation::new("kyc.start", vec![], 1),
//!     Operation::new("kyc.verify", vec![], 2),
//!     Operation::new("resources.create.custody", vec![], 3),
//! ]);
//! assert!(result.is_executable());
//! if let Some(plan) = &result.plan {
//!     println!("{}", describe_plan(plan));
//! }
//! ```

// Core error handling
pub mod error;

// Configuration and registry loading
pub mod config;

// Investor lifecycle state machine
pub mod lifecycle;

// Execution-plan compiler
pub mod compiler;

// Plan execution
pub mod executor;

pub use compiler::{CompilationResult, CompileError, ExecutionPlan, PlanCompiler};
pub use config::{ConfigLoader, OnboardingConfig};
pub use error::{OnboardingError, Result};
pub use executor::{OperationHandler, PlanExecutor};
pub use lifecycle::{InvestorState, LifecycleError, LifecycleService, LifecycleStateMachine};

// Re-export foundation types
pub use dsl_types::{Operation, OperationSpec, Severity};
