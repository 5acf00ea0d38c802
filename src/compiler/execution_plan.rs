//! Execution Plan Generation
//!
//! Turns a dependency graph into phased execution:
//! 1. Level every operation node (longest REQUIRES chain beneath it)
//! 2. Group nodes of equal level into a phase, phases ascending
//! 3. Order each phase by domain priority (stable, so declaration order
//!    breaks ties)
//! 4. Mark the critical path
//!
//! Output depends only on the graph and config; the same graph always yields
//! the same plan.

use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};

use super::dag::{DependencyGraph, DependencyNode};
use super::CompileError;
use crate::config::{CompilerConfig, ExecutorConfig, OnTimeout};

/// One operation scheduled into a phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseOperation {
    pub node_id: String,
    pub verb: String,
    pub domain: String,
    pub source_line: usize,
    pub priority: u32,
}

/// Operations sharing a dependency level
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPhase {
    /// Equals the dependency level of every operation in the phase
    pub phase_id: usize,
    pub operations: Vec<PhaseOperation>,
    pub can_parallelize: bool,
    /// Domains touched by the phase
    pub resources_needed: BTreeSet<String>,
    /// Prerequisites satisfied by earlier phases
    pub wait_conditions: BTreeSet<String>,
    pub estimated_duration_ms: u64,
}

impl ExecutionPhase {
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.operations.iter().any(|op| op.node_id == node_id)
    }
}

/// Barrier between a phase and its successor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPoint {
    pub after_phase: usize,
    pub timeout_ms: u64,
    pub on_timeout: OnTimeout,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub phases: Vec<ExecutionPhase>,
    pub total_operations: usize,
    pub parallel_groups: usize,
    /// Node ids, earliest first
    pub critical_path: Vec<String>,
    pub sync_points: Vec<SyncPoint>,
    /// Sum of phase estimates (metadata only)
    pub estimated_duration_ms: u64,
}

impl ExecutionPlan {
    /// Phase containing `node_id`
    pub fn phase_of(&self, node_id: &str) -> Option<&ExecutionPhase> {
        self.phases.iter().find(|p| p.contains(node_id))
    }
}

// =============================================================================
// LEVELING
// =============================================================================

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Assign `level` to every node: 0 without dependencies, else one more than
/// the deepest dependency.
///
/// Iterative three-colour DFS; reaching an in-progress node is a cycle.
pub fn compute_levels(graph: &mut DependencyGraph) -> Result<(), CompileError> {
    let deps: Vec<Vec<usize>> = graph
        .nodes()
        .iter()
        .map(|n| {
            n.dependencies
                .iter()
                .map(|d| graph.position(d).ok_or_else(|| CompileError::UnknownNode(d.clone())))
                .collect::<Result<Vec<_>, _>>()
        })
        .collect::<Result<_, _>>()?;

    let mut marks = vec![Mark::Unvisited; deps.len()];
    let mut levels = vec![0usize; deps.len()];

    for root in 0..deps.len() {
        if marks[root] != Mark::Unvisited {
            continue;
        }
        marks[root] = Mark::InProgress;
        let mut stack = vec![(root, 0usize)];

        while let Some(top) = stack.last_mut() {
            let node = top.0;
            if let Some(&dep) = deps[node].get(top.1) {
                top.1 += 1;
                match marks[dep] {
                    Mark::Done => {}
                    Mark::InProgress => {
                        let start = stack.iter().position(|&(n, _)| n == dep).unwrap_or(0);
                        let mut cycle: Vec<String> = stack[start..]
                            .iter()
                            .map(|&(n, _)| graph.nodes()[n].id.clone())
                            .collect();
                        cycle.push(graph.nodes()[dep].id.clone());
                        return Err(CompileError::CyclicDependency { cycle });
                    }
                    Mark::Unvisited => {
                        marks[dep] = Mark::InProgress;
                        stack.push((dep, 0));
                    }
                }
            } else {
                levels[node] = deps[node].iter().map(|&d| levels[d] + 1).max().unwrap_or(0);
                marks[node] = Mark::Done;
                stack.pop();
            }
        }
    }

    for (node, level) in graph.nodes_mut().iter_mut().zip(levels) {
        node.level = level;
    }
    Ok(())
}

// =============================================================================
// PHASES
// =============================================================================

/// Group operation nodes by level (ascending), declaration order within a phase
pub fn group_into_phases(graph: &DependencyGraph, config: &CompilerConfig) -> Vec<ExecutionPhase> {
    let mut by_level: BTreeMap<usize, Vec<&DependencyNode>> = BTreeMap::new();
    for node in graph.operation_nodes() {
        by_level.entry(node.level).or_default().push(node);
    }

    by_level
        .into_iter()
        .map(|(level, nodes)| {
            let operations: Vec<PhaseOperation> = nodes
                .iter()
                .filter_map(|node| {
                    let op = graph.operation(node)?;
                    Some(PhaseOperation {
                        node_id: node.id.clone(),
                        verb: op.verb().to_string(),
                        domain: op.domain().to_string(),
                        source_line: op.source_line(),
                        priority: config.priority_for(op.domain()),
                    })
                })
                .collect();

            let resources_needed = operations.iter().map(|op| op.domain.clone()).collect();
            let wait_conditions = nodes
                .iter()
                .flat_map(|n| n.dependencies.iter().cloned())
                .collect();
            let estimated_duration_ms = operations
                .iter()
                .map(|op| config.duration_for(&op.domain))
                .max()
                .unwrap_or(0);

            ExecutionPhase {
                phase_id: level,
                can_parallelize: operations.len() > 1,
                operations,
                resources_needed,
                wait_conditions,
                estimated_duration_ms,
            }
        })
        .collect()
}

/// Sort a phase by descending domain priority; equal priorities keep their order
pub fn order_within_phase(phase: &mut ExecutionPhase, config: &CompilerConfig) {
    for op in &mut phase.operations {
        op.priority = config.priority_for(&op.domain);
    }
    phase.operations.sort_by_key(|op| Reverse(op.priority));
}

// =============================================================================
// CRITICAL PATH
// =============================================================================

/// Longest REQUIRES chain, earliest first. Ties go to the earliest-declared
/// node at each step. Marks the chain's nodes `critical`.
pub fn compute_critical_path(graph: &mut DependencyGraph) -> Vec<String> {
    let mut path = Vec::new();

    // max_by_key keeps the last maximum; reverse to keep the first
    let Some(mut current) = graph
        .operation_nodes()
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .max_by_key(|n| n.level)
        .map(|n| n.id.clone())
    else {
        return path;
    };

    loop {
        path.push(current.clone());
        let Some(node) = graph.node(&current) else { break };
        if node.level == 0 {
            break;
        }
        let want = node.level - 1;
        let next = node
            .dependencies
            .iter()
            .filter_map(|d| graph.node(d))
            .filter(|d| d.level == want)
            .min_by_key(|d| d.operation_index.unwrap_or(usize::MAX))
            .map(|d| d.id.clone());
        match next {
            Some(next) => current = next,
            None => break,
        }
    }
    path.reverse();

    for node in graph.nodes_mut() {
        node.critical = path.contains(&node.id);
    }
    path
}

// =============================================================================
// PLAN
// =============================================================================

/// Level, phase, order and mark `graph`, producing the plan
pub fn generate_plan(
    graph: &mut DependencyGraph,
    compiler: &CompilerConfig,
    executor: &ExecutorConfig,
) -> Result<ExecutionPlan, CompileError> {
    compute_levels(graph)?;

    let mut phases = group_into_phases(graph, compiler);
    for phase in &mut phases {
        order_within_phase(phase, compiler);
    }
    let critical_path = compute_critical_path(graph);

    let sync_points = phases
        .iter()
        .map(|p| SyncPoint {
            after_phase: p.phase_id,
            timeout_ms: executor.phase_timeout_ms,
            on_timeout: executor.on_timeout,
        })
        .collect();

    Ok(ExecutionPlan {
        total_operations: phases.iter().map(ExecutionPhase::len).sum(),
        parallel_groups: phases.len(),
        estimated_duration_ms: phases.iter().map(|p| p.estimated_duration_ms).sum(),
        phases,
        critical_path,
        sync_points,
    })
}

/// Pretty-print an execution plan for debugging / dry-run
pub fn describe_plan(plan: &ExecutionPlan) -> String {
    let mut output = String::new();
    output.push_str("Execution Plan\n");
    output.push_str("==============\n\n");
    output.push_str(&format!("Total operations: {}\n", plan.total_operations));
    output.push_str(&format!("Phases: {}\n", plan.parallel_groups));
    output.push_str(&format!("Estimated duration: {}ms\n\n", plan.estimated_duration_ms));

    for phase in &plan.phases {
        output.push_str(&format!(
            "Phase {}{} [{}ms]\n",
            phase.phase_id,
            if phase.can_parallelize { " (parallel)" } else { "" },
            phase.estimated_duration_ms
        ));
        output.push_str(&"-".repeat(40));
        output.push('\n');

        for op in &phase.operations {
            let marker = if plan.critical_path.contains(&op.node_id) { "*" } else { " " };
            output.push_str(&format!(
                " {}[line {}] {} ({})\n",
                marker, op.source_line, op.verb, op.node_id
            ));
        }
        if !phase.wait_conditions.is_empty() {
            let waits: Vec<&str> = phase.wait_conditions.iter().map(String::as_str).collect();
            output.push_str(&format!("  waits on: {}\n", waits.join(", ")));
        }
        output.push('\n');
    }

    if !plan.critical_path.is_empty() {
        output.push_str(&format!("Critical path: {}\n", plan.critical_path.join(" -> ")));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::dag::DependencyGraphBuilder;
    use crate::compiler::rules::default_rules;
    use dsl_types::Operation;
    use pretty_assertions::assert_eq;

    fn graph_for(verbs: &[&str]) -> DependencyGraph {
        let ops: Vec<Operation> = verbs
            .iter()
            .enumerate()
            .map(|(i, v)| Operation::new(*v, vec![], i + 1))
            .collect();
        DependencyGraphBuilder::new(&default_rules()).build(&ops).graph
    }

    fn plan_for(verbs: &[&str]) -> (DependencyGraph, ExecutionPlan) {
        let mut graph = graph_for(verbs);
        let plan = generate_plan(
            &mut graph,
            &CompilerConfig::default(),
            &ExecutorConfig::default(),
        )
        .unwrap();
        (graph, plan)
    }

    fn level(graph: &DependencyGraph, id: &str) -> usize {
        graph.node(id).unwrap().level
    }

    #[test]
    fn test_kyc_chain_levels() {
        let (graph, plan) = plan_for(&["kyc.start", "kyc.verify", "resources.create.custody"]);
        assert_eq!(level(&graph, "op_0"), 0);
        assert_eq!(level(&graph, "op_1"), 1);
        assert_eq!(level(&graph, "op_2"), 2);
        assert_eq!(plan.parallel_groups, 3);
        assert_eq!(plan.critical_path, vec!["op_0", "op_1", "op_2"]);
        assert!(graph.node("op_1").unwrap().critical);
    }

    #[test]
    fn test_reversed_declaration_levels() {
        let (graph, plan) = plan_for(&["kyc.start", "resources.create.custody", "kyc.verify"]);
        assert_eq!(level(&graph, "op_1"), 0);
        assert_eq!(level(&graph, "op_2"), 1);
        assert_eq!(plan.phases[0].len(), 2);
        assert!(plan.phases[0].can_parallelize);
    }

    #[test]
    fn test_diamond_takes_longest_chain() {
        let mut graph = graph_for(&["a.x", "b.x", "c.x", "d.x"]);
        graph.add_requires("op_0", "op_1").unwrap();
        graph.add_requires("op_1", "op_2").unwrap();
        graph.add_requires("op_0", "op_3").unwrap();
        graph.add_requires("op_2", "op_3").unwrap();
        compute_levels(&mut graph).unwrap();
        assert_eq!(level(&graph, "op_3"), 3);
    }

    #[test]
    fn test_levels_reject_cycle() {
        // Bypass insertion-time rejection to exercise the DFS check
        let mut graph = graph_for(&["a.x", "b.x"]);
        graph.add_requires("op_0", "op_1").unwrap();
        graph.nodes_mut()[0].dependencies.insert("op_1".to_string());

        match compute_levels(&mut graph) {
            Err(CompileError::CyclicDependency { cycle }) => {
                assert_eq!(cycle.first(), cycle.last());
                assert!(cycle.contains(&"op_0".to_string()));
                assert!(cycle.contains(&"op_1".to_string()));
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_priority_order_is_stable() {
        let (_, plan) = plan_for(&[
            "cbu.create",
            "resources.create.custody",
            "ubo.discover",
            "kyc.start",
            "cbu.link",
        ]);
        let verbs: Vec<&str> = plan.phases[0].operations.iter().map(|o| o.verb.as_str()).collect();
        assert_eq!(
            verbs,
            vec!["kyc.start", "ubo.discover", "resources.create.custody", "cbu.create", "cbu.link"]
        );
    }

    #[test]
    fn test_phase_metadata() {
        let mut compiler = CompilerConfig::default();
        compiler.estimated_duration_ms.insert("kyc".into(), 3000);
        let executor = ExecutorConfig {
            phase_timeout_ms: 1234,
            ..Default::default()
        };

        let mut graph = graph_for(&["kyc.start", "cbu.create", "kyc.verify"]);
        let plan = generate_plan(&mut graph, &compiler, &executor).unwrap();

        let first = &plan.phases[0];
        assert_eq!(
            first.resources_needed,
            BTreeSet::from(["cbu".to_string(), "kyc".to_string()])
        );
        assert_eq!(first.estimated_duration_ms, 3000);
        assert!(first.wait_conditions.is_empty());
        assert_eq!(plan.phases[1].wait_conditions, BTreeSet::from(["op_0".to_string()]));
        assert_eq!(plan.estimated_duration_ms, 6000);

        assert_eq!(plan.sync_points.len(), 2);
        assert_eq!(plan.sync_points[1].after_phase, 1);
        assert_eq!(plan.sync_points[1].timeout_ms, 1234);
        assert_eq!(plan.sync_points[1].on_timeout, OnTimeout::Fail);
    }

    #[test]
    fn test_critical_path_tie_prefers_earliest() {
        let (graph, plan) = plan_for(&["ubo.discover", "ubo.verify", "kyc.start", "kyc.verify"]);
        assert_eq!(plan.critical_path, vec!["op_0", "op_1"]);
        assert!(!graph.node("op_3").unwrap().critical);
    }

    #[test]
    fn test_empty_input() {
        let (_, plan) = plan_for(&[]);
        assert!(plan.phases.is_empty());
        assert_eq!(plan.total_operations, 0);
        assert!(plan.critical_path.is_empty());
    }

    #[test]
    fn test_describe_plan() {
        let (_, plan) = plan_for(&["kyc.start", "kyc.verify"]);
        let text = describe_plan(&plan);
        assert!(text.contains("Total operations: 2"));
        assert!(text.contains("*[line 2] kyc.verify (op_1)"));
        assert!(text.contains("waits on: op_0"));
        assert!(text.contains("Critical path: op_0 -> op_1"));
    }
}
