//! Execution-plan compiler
//!
//! Turns an unordered bag of declared operations into a validated, leveled,
//! parallelizable execution plan:
//!
//! ```text
//! validate → build graph → level → phase → order → critical path → passes
//! ```
//!
//! Compilation is synchronous over immutable inputs. A `PlanCompiler` holds
//! only read-only registries, rules and config, so one instance can serve
//! concurrent requests.

pub mod dag;
pub mod diagnostics;
pub mod execution_plan;
pub mod passes;
pub mod registry;
pub mod rules;
pub mod validation;

use std::sync::Arc;

use dsl_types::Operation;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

pub use dag::{
    op_node_id, parse_op_index, DependencyEdge, DependencyGraph, DependencyGraphBuilder,
    DependencyNode, EdgeKind, NodeType,
};
pub use diagnostics::{CompileDiagnostic, DiagnosticCode, OptimizationRecord};
pub use execution_plan::{describe_plan, ExecutionPhase, ExecutionPlan, PhaseOperation, SyncPoint};
pub use passes::{OptimizationPass, PassInput, PassOutput};
pub use registry::{AttributeRegistry, VerbRegistry};
pub use rules::OrderingRule;

use crate::config::{CompilerConfig, ConfigLoader, ExecutorConfig, OnboardingConfig};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("cyclic dependency: {}", cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    #[error("unknown graph node: {0}")]
    UnknownNode(String),
}

impl From<&CompileError> for CompileDiagnostic {
    fn from(err: &CompileError) -> Self {
        match err {
            CompileError::CyclicDependency { cycle } => diagnostics::cycle_error(cycle),
            CompileError::UnknownNode(id) => {
                CompileDiagnostic::critical(DiagnosticCode::UnknownNode, err.to_string())
                    .with_node(id.clone())
            }
        }
    }
}

/// Everything one compilation produced
#[derive(Debug, Clone, Serialize)]
pub struct CompilationResult {
    pub graph: DependencyGraph,
    /// `None` when the graph could not be leveled
    pub plan: Option<ExecutionPlan>,
    pub errors: Vec<CompileDiagnostic>,
    pub warnings: Vec<CompileDiagnostic>,
    pub optimizations: Vec<OptimizationRecord>,
}

impl CompilationResult {
    /// A plan exists and no critical diagnostic was raised
    pub fn is_executable(&self) -> bool {
        self.plan.is_some() && self.errors.is_empty()
    }

    /// Errors then warnings
    pub fn diagnostics(&self) -> impl Iterator<Item = &CompileDiagnostic> {
        self.errors.iter().chain(self.warnings.iter())
    }
}

pub struct PlanCompiler {
    verbs: Arc<VerbRegistry>,
    attributes: Arc<AttributeRegistry>,
    rules: Vec<Box<dyn OrderingRule>>,
    passes: Vec<Box<dyn OptimizationPass>>,
    config: CompilerConfig,
    executor: ExecutorConfig,
}

impl PlanCompiler {
    /// Compiler with the built-in rules, passes and default config
    pub fn new(verbs: Arc<VerbRegistry>, attributes: Arc<AttributeRegistry>) -> Self {
        Self {
            verbs,
            attributes,
            rules: rules::default_rules(),
            passes: passes::default_passes(),
            config: CompilerConfig::default(),
            executor: ExecutorConfig::default(),
        }
    }

    /// Load registries and tuning from a config directory
    pub fn from_loader(loader: &ConfigLoader) -> anyhow::Result<Self> {
        let verbs = Arc::new(loader.load_verbs()?);
        let attributes = Arc::new(loader.load_attributes()?);
        Ok(Self::new(verbs, attributes).with_config(loader.load_config()?))
    }

    pub fn with_config(mut self, config: OnboardingConfig) -> Self {
        self.config = config.compiler;
        self.executor = config.executor;
        self
    }

    /// Register an extra ordering rule, applied after the existing ones
    pub fn with_rule(mut self, rule: Box<dyn OrderingRule>) -> Self {
        self.rules.push(rule);
        self
    }

    /// Register an extra pass, run after the existing ones
    pub fn with_pass(mut self, pass: Box<dyn OptimizationPass>) -> Self {
        self.passes.push(pass);
        self
    }

    pub fn verbs(&self) -> &VerbRegistry {
        &self.verbs
    }

    pub fn attributes(&self) -> &AttributeRegistry {
        &self.attributes
    }

    pub fn compile(&self, ops: &[Operation]) -> CompilationResult {
        let validation = validation::validate(ops, &self.verbs, &self.attributes);
        let mut errors = validation.errors;
        let mut warnings = validation.warnings;

        let built = DependencyGraphBuilder::new(&self.rules).build(ops);
        let mut graph = built.graph;
        errors.extend(built.diagnostics);

        Self::mark_blocked(&mut graph, &errors);

        let plan = match execution_plan::generate_plan(&mut graph, &self.config, &self.executor) {
            Ok(plan) => Some(plan),
            Err(e) => {
                warn!("plan generation failed: {}", e);
                errors.push(CompileDiagnostic::from(&e));
                None
            }
        };

        let mut optimizations = Vec::new();
        if let Some(plan) = &plan {
            let input = PassInput {
                graph: &graph,
                plan,
                executor: &self.executor,
            };
            for pass in &self.passes {
                let mut output = PassOutput::default();
                let result = pass.run(&input, &mut output);
                let (records, pass_warnings) = output.into_parts();
                optimizations.extend(records);
                warnings.extend(pass_warnings);

                if let Err(e) = result {
                    warn!(pass = pass.name(), "optimization pass failed: {:#}", e);
                    warnings.push(CompileDiagnostic::warning(
                        DiagnosticCode::PassFailed,
                        format!("pass '{}' failed: {:#}", pass.name(), e),
                    ));
                }
            }
        }

        info!(
            operations = ops.len(),
            phases = plan.as_ref().map(|p| p.parallel_groups).unwrap_or(0),
            errors = errors.len(),
            warnings = warnings.len(),
            optimizations = optimizations.len(),
            "compiled execution plan"
        );

        CompilationResult {
            graph,
            plan,
            errors,
            warnings,
            optimizations,
        }
    }

    /// BLOCKS edges from each operation carrying a critical diagnostic
    fn mark_blocked(graph: &mut DependencyGraph, errors: &[CompileDiagnostic]) {
        for err in errors.iter().filter(|e| e.is_critical()) {
            let Some(node_id) = err.node_id.as_deref() else { continue };
            let Some(node) = graph.node(node_id) else { continue };
            let dependents: Vec<String> = node.dependents.iter().cloned().collect();
            for dependent in dependents {
                graph.add_annotation(node_id, &dependent, EdgeKind::Blocks);
            }
        }
    }
}
