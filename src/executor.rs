//! Plan executor
//!
//! Runs a compiled plan against an [`OperationHandler`]. Phases run strictly
//! in ascending order; operations inside a phase run concurrently, bounded by
//! a semaphore of `max_concurrency` permits. Each phase attempt is bounded by
//! `phase_timeout_ms` and the configured [`OnTimeout`] policy decides what
//! happens when it expires. A retried phase reruns only the operations that
//! had not completed when the previous attempt timed out. Any failed
//! operation fails its phase and no later phase starts.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dsl_types::Operation;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::compiler::{
    parse_op_index, CompilationResult, DependencyGraph, ExecutionPhase, ExecutionPlan,
};
use crate::config::{ExecutorConfig, OnTimeout};

/// Performs one operation; supplied by the caller (database, service calls, ...)
#[async_trait]
pub trait OperationHandler: Send + Sync {
    async fn execute(&self, operation: &Operation) -> anyhow::Result<serde_json::Value>;
}

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("plan is not executable ({errors} critical diagnostics)")]
    PlanNotExecutable { errors: usize },

    #[error("phase {phase} failed at {node_id}: {message}")]
    PhaseFailed {
        phase: usize,
        node_id: String,
        message: String,
    },

    #[error("phase {phase} timed out after {timeout_ms}ms ({attempts} attempts)")]
    PhaseTimedOut {
        phase: usize,
        timeout_ms: u64,
        attempts: u32,
    },

    #[error("plan references unknown operation node {0}")]
    UnknownOperation(String),
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OperationStatus {
    Completed { result: serde_json::Value },
    /// Still running when the phase timed out under `OnTimeout::Continue`
    Abandoned,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationOutcome {
    pub node_id: String,
    pub verb: String,
    #[serde(flatten)]
    pub status: OperationStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseReport {
    pub phase_id: usize,
    pub attempts: u32,
    pub timed_out: bool,
    /// In phase order
    pub outcomes: Vec<OperationOutcome>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub phases: Vec<PhaseReport>,
}

impl ExecutionReport {
    pub fn completed(&self) -> usize {
        self.outcomes()
            .filter(|o| matches!(o.status, OperationStatus::Completed { .. }))
            .count()
    }

    pub fn abandoned(&self) -> usize {
        self.outcomes()
            .filter(|o| o.status == OperationStatus::Abandoned)
            .count()
    }

    pub fn outcomes(&self) -> impl Iterator<Item = &OperationOutcome> {
        self.phases.iter().flat_map(|p| p.outcomes.iter())
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

type TaskResult = (String, anyhow::Result<serde_json::Value>);

pub struct PlanExecutor {
    handler: Arc<dyn OperationHandler>,
    semaphore: Arc<Semaphore>,
    config: ExecutorConfig,
}

impl PlanExecutor {
    pub fn new(handler: Arc<dyn OperationHandler>, config: ExecutorConfig) -> Self {
        Self {
            handler,
            semaphore: Arc::new(Semaphore::new(config.max_concurrency.max(1))),
            config,
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Execute a compilation, refusing one with critical diagnostics
    pub async fn execute_compiled(
        &self,
        compiled: &CompilationResult,
    ) -> Result<ExecutionReport, ExecutorError> {
        match &compiled.plan {
            Some(plan) if compiled.is_executable() => self.execute(&compiled.graph, plan).await,
            _ => Err(ExecutorError::PlanNotExecutable {
                errors: compiled.errors.len(),
            }),
        }
    }

    pub async fn execute(
        &self,
        graph: &DependencyGraph,
        plan: &ExecutionPlan,
    ) -> Result<ExecutionReport, ExecutorError> {
        let mut report = ExecutionReport::default();
        for phase in &plan.phases {
            report.phases.push(self.run_phase(graph, phase).await?);
        }
        info!(
            phases = report.phases.len(),
            completed = report.completed(),
            abandoned = report.abandoned(),
            "plan executed"
        );
        Ok(report)
    }

    async fn run_phase(
        &self,
        graph: &DependencyGraph,
        phase: &ExecutionPhase,
    ) -> Result<PhaseReport, ExecutorError> {
        let ops = Self::resolve(graph, phase)?;
        let limit = Duration::from_millis(self.config.phase_timeout_ms);
        let started = Instant::now();
        let mut attempts = 0u32;
        // Completed results survive a retry; only unfinished operations rerun
        let mut finished: Vec<(String, serde_json::Value)> = Vec::new();

        let timed_out = loop {
            attempts += 1;
            let pending: Vec<_> = ops
                .iter()
                .filter(|(node_id, _)| !finished.iter().any(|(id, _)| id == node_id))
                .cloned()
                .collect();
            debug!(
                phase = phase.phase_id,
                attempt = attempts,
                "starting phase ({} of {} operations pending)",
                pending.len(),
                ops.len()
            );

            let mut tasks = self.spawn_all(&pending);
            let drained =
                timeout(limit, Self::drain(phase.phase_id, &mut tasks, &mut finished)).await;
            tasks.abort_all();

            match drained {
                Ok(Ok(())) => break false,
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    warn!(
                        phase = phase.phase_id,
                        attempt = attempts,
                        policy = ?self.config.on_timeout,
                        "phase timed out after {}ms",
                        self.config.phase_timeout_ms
                    );
                    match self.config.on_timeout {
                        OnTimeout::Continue => break true,
                        OnTimeout::Retry if attempts <= self.config.max_retries => continue,
                        OnTimeout::Fail | OnTimeout::Retry => {
                            return Err(ExecutorError::PhaseTimedOut {
                                phase: phase.phase_id,
                                timeout_ms: self.config.phase_timeout_ms,
                                attempts,
                            })
                        }
                    }
                }
            }
        };

        let outcomes = ops
            .iter()
            .map(|(node_id, op)| {
                let status = finished
                    .iter()
                    .find(|(id, _)| id == node_id)
                    .map(|(_, result)| OperationStatus::Completed {
                        result: result.clone(),
                    })
                    .unwrap_or(OperationStatus::Abandoned);
                OperationOutcome {
                    node_id: node_id.clone(),
                    verb: op.verb().to_string(),
                    status,
                }
            })
            .collect();

        Ok(PhaseReport {
            phase_id: phase.phase_id,
            attempts,
            timed_out,
            outcomes,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }

    fn resolve(
        graph: &DependencyGraph,
        phase: &ExecutionPhase,
    ) -> Result<Vec<(String, Operation)>, ExecutorError> {
        phase
            .operations
            .iter()
            .map(|p| {
                parse_op_index(&p.node_id)
                    .and_then(|i| graph.operations().get(i))
                    .map(|op| (p.node_id.clone(), op.clone()))
                    .ok_or_else(|| ExecutorError::UnknownOperation(p.node_id.clone()))
            })
            .collect()
    }

    fn spawn_all(&self, ops: &[(String, Operation)]) -> JoinSet<TaskResult> {
        let mut tasks = JoinSet::new();
        for (node_id, op) in ops {
            let handler = Arc::clone(&self.handler);
            let semaphore = Arc::clone(&self.semaphore);
            let node_id = node_id.clone();
            let op = op.clone();
            tasks.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => handler.execute(&op).await,
                    Err(e) => Err(e.into()),
                };
                (node_id, result)
            });
        }
        tasks
    }

    /// Collect task results until all finish or one fails
    async fn drain(
        phase: usize,
        tasks: &mut JoinSet<TaskResult>,
        finished: &mut Vec<(String, serde_json::Value)>,
    ) -> Result<(), ExecutorError> {
        while let Some(joined) = tasks.join_next().await {
            let (node_id, result) = joined.map_err(|e| ExecutorError::PhaseFailed {
                phase,
                node_id: "<task>".to_string(),
                message: e.to_string(),
            })?;
            match result {
                Ok(value) => {
                    debug!(phase, node_id = %node_id, "operation completed");
                    finished.push((node_id, value));
                }
                Err(e) => {
                    warn!(phase, node_id = %node_id, "operation failed: {:#}", e);
                    return Err(ExecutorError::PhaseFailed {
                        phase,
                        node_id,
                        message: format!("{:#}", e),
                    });
                }
            }
        }
        Ok(())
    }
}
