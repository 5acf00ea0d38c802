//! Optimization Passes
//!
//! Advisory analyses run after a plan exists. A pass sees the graph and plan
//! read-only and may only append optimization records and warnings; it can
//! never reorder the plan. A pass that errors is reported as a warning by the
//! compiler and the remaining passes still run.

use std::collections::BTreeMap;

use super::dag::DependencyGraph;
use super::diagnostics::{CompileDiagnostic, DiagnosticCode, OptimizationRecord};
use super::execution_plan::ExecutionPlan;
use crate::config::ExecutorConfig;

/// Read-only view handed to each pass
pub struct PassInput<'a> {
    pub graph: &'a DependencyGraph,
    pub plan: &'a ExecutionPlan,
    pub executor: &'a ExecutorConfig,
}

/// Append-only sink for pass results
#[derive(Debug, Default)]
pub struct PassOutput {
    optimizations: Vec<OptimizationRecord>,
    warnings: Vec<CompileDiagnostic>,
}

impl PassOutput {
    pub fn record(&mut self, pass: &str, description: impl Into<String>, node_ids: Vec<String>) {
        self.optimizations.push(OptimizationRecord {
            pass: pass.to_string(),
            description: description.into(),
            node_ids,
        });
    }

    /// Only non-critical diagnostics are accepted; passes cannot block a plan
    pub fn warn(&mut self, mut diagnostic: CompileDiagnostic) {
        if diagnostic.is_critical() {
            diagnostic.severity = dsl_types::Severity::Warning;
        }
        self.warnings.push(diagnostic);
    }

    pub fn optimizations(&self) -> &[OptimizationRecord] {
        &self.optimizations
    }

    pub fn warnings(&self) -> &[CompileDiagnostic] {
        &self.warnings
    }

    pub(crate) fn into_parts(self) -> (Vec<OptimizationRecord>, Vec<CompileDiagnostic>) {
        (self.optimizations, self.warnings)
    }
}

pub trait OptimizationPass: Send + Sync {
    fn name(&self) -> &'static str;

    fn run(&self, input: &PassInput<'_>, output: &mut PassOutput) -> anyhow::Result<()>;
}

/// The built-in passes, in run order
pub fn default_passes() -> Vec<Box<dyn OptimizationPass>> {
    vec![
        Box::new(ParallelismAnalysis),
        Box::new(DuplicateOperations),
        Box::new(CriticalPathAnalysis),
        Box::new(ConcurrencyBudget),
    ]
}

// =============================================================================
// Built-in passes
// =============================================================================

/// Records every phase that can run in parallel
pub struct ParallelismAnalysis;

impl OptimizationPass for ParallelismAnalysis {
    fn name(&self) -> &'static str {
        "parallelism_analysis"
    }

    fn run(&self, input: &PassInput<'_>, output: &mut PassOutput) -> anyhow::Result<()> {
        for phase in input.plan.phases.iter().filter(|p| p.can_parallelize) {
            output.record(
                self.name(),
                format!("phase {} runs {} operations in parallel", phase.phase_id, phase.len()),
                phase.operations.iter().map(|op| op.node_id.clone()).collect(),
            );
        }
        Ok(())
    }
}

/// Warns on operations with identical verb and parameters
pub struct DuplicateOperations;

impl OptimizationPass for DuplicateOperations {
    fn name(&self) -> &'static str {
        "duplicate_operations"
    }

    fn run(&self, input: &PassInput<'_>, output: &mut PassOutput) -> anyhow::Result<()> {
        let mut seen: BTreeMap<(&str, &[String]), Vec<String>> = BTreeMap::new();
        for node in input.graph.operation_nodes() {
            let Some(op) = input.graph.operation(node) else { continue };
            seen.entry((op.verb(), op.parameters()))
                .or_default()
                .push(node.id.clone());
        }

        for ((verb, _), node_ids) in seen.into_iter().filter(|(_, ids)| ids.len() > 1) {
            for duplicate in &node_ids[1..] {
                let line = input
                    .graph
                    .node(duplicate)
                    .and_then(|n| input.graph.operation(n))
                    .map(|op| op.source_line())
                    .unwrap_or(0);
                output.warn(
                    CompileDiagnostic::warning(
                        DiagnosticCode::DuplicateOperation,
                        format!(
                            "{} repeats {} ({}) with identical parameters",
                            duplicate, node_ids[0], verb
                        ),
                    )
                    .at_node(duplicate, line),
                );
            }
        }
        Ok(())
    }
}

/// Records the critical path length against the total
pub struct CriticalPathAnalysis;

impl OptimizationPass for CriticalPathAnalysis {
    fn name(&self) -> &'static str {
        "critical_path_analysis"
    }

    fn run(&self, input: &PassInput<'_>, output: &mut PassOutput) -> anyhow::Result<()> {
        let plan = input.plan;
        if plan.critical_path.is_empty() {
            return Ok(());
        }
        output.record(
            self.name(),
            format!(
                "critical path covers {} of {} operations across {} phases",
                plan.critical_path.len(),
                plan.total_operations,
                plan.parallel_groups
            ),
            plan.critical_path.clone(),
        );
        Ok(())
    }
}

/// Warns when a phase is wider than the executor can run at once
pub struct ConcurrencyBudget;

impl OptimizationPass for ConcurrencyBudget {
    fn name(&self) -> &'static str {
        "concurrency_budget"
    }

    fn run(&self, input: &PassInput<'_>, output: &mut PassOutput) -> anyhow::Result<()> {
        let budget = input.executor.max_concurrency;
        for phase in input.plan.phases.iter().filter(|p| p.len() > budget) {
            output.warn(CompileDiagnostic::warning(
                DiagnosticCode::ConcurrencyBudgetExceeded,
                format!(
                    "phase {} has {} operations but max_concurrency is {}; it will run in {} waves",
                    phase.phase_id,
                    phase.len(),
                    budget,
                    phase.len().div_ceil(budget.max(1))
                ),
            ));
        }
        Ok(())
    }
}
