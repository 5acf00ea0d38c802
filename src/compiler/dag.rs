//! Dependency Graph Builder
//!
//! Builds the dependency DAG over one compilation's operations:
//! - One OPERATION node per operation, id `op_<index>`, declaration order kept
//! - REQUIRES edges from the ordering rules (these drive leveling)
//! - Informational ATTRIBUTE / RESOURCE nodes linked by PRODUCES edges
//! - Cycle rejection at edge insertion, so the graph is acyclic by construction

use dsl_types::Operation;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

use super::diagnostics::{cycle_error, CompileDiagnostic};
use super::rules::{is_custody_resource_creation, OrderingRule};
use super::CompileError;

/// Kind of graph node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    Operation,
    Resource,
    Attribute,
}

/// Kind of graph edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeKind {
    /// `from` must complete before `to` starts
    Requires,
    /// `from` creates or populates `to` (diagnostic only)
    Produces,
    /// `from` carries a critical diagnostic that blocks `to` (diagnostic only)
    Blocks,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyNode {
    pub id: String,
    pub node_type: NodeType,
    /// REQUIRES predecessors
    pub dependencies: BTreeSet<String>,
    /// REQUIRES successors
    pub dependents: BTreeSet<String>,
    pub domain: String,
    /// On the critical path
    pub critical: bool,
    /// Computed by the plan generator
    pub level: usize,
    /// Position in the input, for OPERATION nodes
    pub operation_index: Option<usize>,
}

impl DependencyNode {
    fn new(id: String, node_type: NodeType, domain: &str, operation_index: Option<usize>) -> Self {
        Self {
            id,
            node_type,
            dependencies: BTreeSet::new(),
            dependents: BTreeSet::new(),
            domain: domain.to_string(),
            critical: false,
            level: 0,
            operation_index,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub from: String,
    pub to: String,
    pub kind: EdgeKind,
}

/// Node id of the operation at `index`
pub fn op_node_id(index: usize) -> String {
    format!("op_{}", index)
}

/// Inverse of [`op_node_id`]; any non-negative integer index is accepted
pub fn parse_op_index(node_id: &str) -> Option<usize> {
    node_id.strip_prefix("op_")?.parse().ok()
}

// =============================================================================
// GRAPH
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "GraphData")]
pub struct DependencyGraph {
    nodes: Vec<DependencyNode>,
    edges: Vec<DependencyEdge>,
    operations: Vec<Operation>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

/// Wire form of [`DependencyGraph`]; the id index is rebuilt on load
#[derive(Deserialize)]
struct GraphData {
    nodes: Vec<DependencyNode>,
    edges: Vec<DependencyEdge>,
    operations: Vec<Operation>,
}

impl From<GraphData> for DependencyGraph {
    fn from(data: GraphData) -> Self {
        let mut graph = Self {
            nodes: data.nodes,
            edges: data.edges,
            operations: data.operations,
            index: HashMap::new(),
        };
        graph.reindex();
        graph
    }
}

impl DependencyGraph {
    /// Nodes in insertion order (operations first, in declaration order)
    pub fn nodes(&self) -> &[DependencyNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }

    /// The compiled operations, in declaration order
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn node(&self, id: &str) -> Option<&DependencyNode> {
        self.position(id).map(|i| &self.nodes[i])
    }

    pub(crate) fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub(crate) fn nodes_mut(&mut self) -> &mut [DependencyNode] {
        &mut self.nodes
    }

    pub fn operation_nodes(&self) -> impl Iterator<Item = &DependencyNode> {
        self.nodes
            .iter()
            .filter(|n| n.node_type == NodeType::Operation)
    }

    /// The operation behind an OPERATION node
    pub fn operation(&self, node: &DependencyNode) -> Option<&Operation> {
        node.operation_index.and_then(|i| self.operations.get(i))
    }

    pub fn requires_edges(&self) -> impl Iterator<Item = &DependencyEdge> {
        self.edges.iter().filter(|e| e.kind == EdgeKind::Requires)
    }

    /// Edge set as a sorted, de-duplicated collection
    pub fn edge_set(&self) -> BTreeSet<DependencyEdge> {
        self.edges.iter().cloned().collect()
    }

    fn reindex(&mut self) {
        self.index = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.clone(), i))
            .collect();
    }

    fn add_node(&mut self, node: DependencyNode) -> usize {
        if let Some(existing) = self.position(&node.id) {
            return existing;
        }
        let idx = self.nodes.len();
        self.index.insert(node.id.clone(), idx);
        self.nodes.push(node);
        idx
    }

    /// Add a REQUIRES edge `from → to` (`from` runs first).
    ///
    /// Returns `Ok(false)` for a duplicate edge. An edge that would close a
    /// cycle is rejected and the graph is left unchanged.
    pub fn add_requires(&mut self, from: &str, to: &str) -> Result<bool, CompileError> {
        let from_idx = self
            .position(from)
            .ok_or_else(|| CompileError::UnknownNode(from.to_string()))?;
        let to_idx = self
            .position(to)
            .ok_or_else(|| CompileError::UnknownNode(to.to_string()))?;

        if from_idx == to_idx {
            return Err(CompileError::CyclicDependency {
                cycle: vec![from.to_string(), to.to_string()],
            });
        }
        if self.nodes[to_idx].dependencies.contains(from) {
            return Ok(false);
        }
        if let Some(mut path) = self.path_between(to_idx, from_idx) {
            path.push(to.to_string());
            return Err(CompileError::CyclicDependency { cycle: path });
        }

        self.nodes[to_idx].dependencies.insert(from.to_string());
        self.nodes[from_idx].dependents.insert(to.to_string());
        self.edges.push(DependencyEdge {
            from: from.to_string(),
            to: to.to_string(),
            kind: EdgeKind::Requires,
        });
        Ok(true)
    }

    /// Add a PRODUCES or BLOCKS edge; these never affect ordering
    pub(crate) fn add_annotation(&mut self, from: &str, to: &str, kind: EdgeKind) {
        debug_assert_ne!(kind, EdgeKind::Requires);
        let edge = DependencyEdge {
            from: from.to_string(),
            to: to.to_string(),
            kind,
        };
        if !self.edges.contains(&edge) {
            self.edges.push(edge);
        }
    }

    /// Ids along a dependents-path from `start` to `target`, if one exists
    fn path_between(&self, start: usize, target: usize) -> Option<Vec<String>> {
        let mut stack = vec![(start, vec![self.nodes[start].id.clone()])];
        let mut seen = vec![false; self.nodes.len()];

        while let Some((current, path)) = stack.pop() {
            if current == target {
                return Some(path);
            }
            if std::mem::replace(&mut seen[current], true) {
                continue;
            }
            for next in &self.nodes[current].dependents {
                if let Some(next_idx) = self.position(next) {
                    let mut next_path = path.clone();
                    next_path.push(next.clone());
                    stack.push((next_idx, next_path));
                }
            }
        }
        None
    }
}

// =============================================================================
// BUILDER
// =============================================================================

/// Graph plus the diagnostics raised while building it
#[derive(Debug)]
pub struct BuildOutcome {
    pub graph: DependencyGraph,
    pub diagnostics: Vec<CompileDiagnostic>,
}

pub struct DependencyGraphBuilder<'r> {
    rules: &'r [Box<dyn OrderingRule>],
}

impl<'r> DependencyGraphBuilder<'r> {
    pub fn new(rules: &'r [Box<dyn OrderingRule>]) -> Self {
        Self { rules }
    }

    pub fn build(&self, ops: &[Operation]) -> BuildOutcome {
        let mut graph = DependencyGraph {
            operations: ops.to_vec(),
            ..Default::default()
        };
        let mut diagnostics = Vec::new();

        for (idx, op) in ops.iter().enumerate() {
            graph.add_node(DependencyNode::new(
                op_node_id(idx),
                NodeType::Operation,
                op.domain(),
                Some(idx),
            ));
        }

        for (idx, op) in ops.iter().enumerate() {
            let node_id = op_node_id(idx);
            for rule in self.rules {
                for dep in rule.dependencies_for(idx, ops) {
                    if dep >= ops.len() {
                        warn!(rule = rule.name(), dep, "rule returned out-of-range dependency");
                        continue;
                    }
                    let dep_id = op_node_id(dep);
                    match graph.add_requires(&dep_id, &node_id) {
                        Ok(true) => debug!(
                            rule = rule.name(),
                            "{} ({}) requires {} ({})",
                            node_id,
                            op.verb(),
                            dep_id,
                            ops[dep].verb()
                        ),
                        Ok(false) => {}
                        Err(CompileError::CyclicDependency { cycle }) => {
                            warn!(
                                rule = rule.name(),
                                ?cycle,
                                "rejected edge {} -> {}",
                                dep_id,
                                node_id
                            );
                            diagnostics
                                .push(cycle_error(&cycle).at_node(&node_id, op.source_line()));
                        }
                        Err(e) => warn!(rule = rule.name(), "skipped edge: {}", e),
                    }
                }
            }
        }

        Self::annotate_products(&mut graph, ops);

        BuildOutcome { graph, diagnostics }
    }

    /// Attribute and custody-resource nodes with their PRODUCES edges
    fn annotate_products(graph: &mut DependencyGraph, ops: &[Operation]) {
        for (idx, op) in ops.iter().enumerate() {
            let node_id = op_node_id(idx);

            for attr in op.attribute_refs() {
                let attr_id = format!("attr_{}", attr);
                graph.add_node(DependencyNode::new(
                    attr_id.clone(),
                    NodeType::Attribute,
                    op.domain(),
                    None,
                ));
                graph.add_annotation(&node_id, &attr_id, EdgeKind::Produces);
            }

            if is_custody_resource_creation(op) {
                let res_id = format!("res_{}", idx);
                graph.add_node(DependencyNode::new(
                    res_id.clone(),
                    NodeType::Resource,
                    "custody",
                    None,
                ));
                graph.add_annotation(&node_id, &res_id, EdgeKind::Produces);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::rules::default_rules;
    use pretty_assertions::assert_eq;

    fn ops(verbs: &[&str]) -> Vec<Operation> {
        verbs
            .iter()
            .enumerate()
            .map(|(i, v)| Operation::new(*v, vec![], i + 1))
            .collect()
    }

    fn requires(graph: &DependencyGraph) -> Vec<(String, String)> {
        graph
            .requires_edges()
            .map(|e| (e.from.clone(), e.to.clone()))
            .collect()
    }

    #[test]
    fn test_parse_op_index_is_general() {
        assert_eq!(parse_op_index("op_0"), Some(0));
        assert_eq!(parse_op_index("op_4"), Some(4));
        assert_eq!(parse_op_index("op_5"), Some(5));
        assert_eq!(parse_op_index("op_1234"), Some(1234));
        assert_eq!(parse_op_index(&op_node_id(98765)), Some(98765));
        assert_eq!(parse_op_index("op_-1"), None);
        assert_eq!(parse_op_index("attr_1"), None);
        assert_eq!(parse_op_index("op_"), None);
    }

    #[test]
    fn test_one_node_per_operation() {
        let rules = default_rules();
        let outcome = DependencyGraphBuilder::new(&rules).build(&ops(&["cbu.create", "kyc.start"]));
        let ids: Vec<_> = outcome.graph.operation_nodes().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["op_0", "op_1"]);
        assert!(outcome.diagnostics.is_empty());
    }

    #[test]
    fn test_kyc_chain_edges() {
        let rules = default_rules();
        let outcome = DependencyGraphBuilder::new(&rules)
            .build(&ops(&["kyc.start", "kyc.verify", "resources.create.custody"]));
        assert_eq!(
            requires(&outcome.graph),
            vec![
                ("op_0".to_string(), "op_1".to_string()),
                ("op_1".to_string(), "op_2".to_string()),
            ]
        );
        let custody = outcome.graph.node("op_2").unwrap();
        assert!(custody.dependencies.contains("op_1"));
    }

    #[test]
    fn test_verify_declared_after_custody_adds_no_edge() {
        let rules = default_rules();
        let outcome = DependencyGraphBuilder::new(&rules)
            .build(&ops(&["kyc.start", "resources.create.custody", "kyc.verify"]));
        assert_eq!(
            requires(&outcome.graph),
            vec![("op_0".to_string(), "op_2".to_string())]
        );
        assert!(outcome.graph.node("op_1").unwrap().dependencies.is_empty());
    }

    #[test]
    fn test_duplicate_edge_ignored() {
        let mut graph = DependencyGraphBuilder::new(&[]).build(&ops(&["a.x", "b.y"])).graph;
        assert!(graph.add_requires("op_0", "op_1").unwrap());
        assert!(!graph.add_requires("op_0", "op_1").unwrap());
        assert_eq!(graph.requires_edges().count(), 1);
    }

    #[test]
    fn test_cycle_rejected_at_insertion() {
        let mut graph = DependencyGraphBuilder::new(&[])
            .build(&ops(&["a.x", "b.y", "c.z"]))
            .graph;
        graph.add_requires("op_0", "op_1").unwrap();
        graph.add_requires("op_1", "op_2").unwrap();

        let err = graph.add_requires("op_2", "op_0").unwrap_err();
        assert_eq!(
            err,
            CompileError::CyclicDependency {
                cycle: vec!["op_0".into(), "op_1".into(), "op_2".into(), "op_0".into()]
            }
        );
        assert_eq!(graph.requires_edges().count(), 2);
        assert!(graph.node("op_0").unwrap().dependencies.is_empty());
    }

    #[test]
    fn test_self_edge_rejected() {
        let mut graph = DependencyGraphBuilder::new(&[]).build(&ops(&["a.x"])).graph;
        assert!(matches!(
            graph.add_requires("op_0", "op_0"),
            Err(CompileError::CyclicDependency { .. })
        ));
    }

    #[test]
    fn test_unknown_node() {
        let mut graph = DependencyGraphBuilder::new(&[]).build(&ops(&["a.x"])).graph;
        assert_eq!(
            graph.add_requires("op_0", "op_9"),
            Err(CompileError::UnknownNode("op_9".into()))
        );
    }

    #[test]
    fn test_deserialized_graph_is_indexed() {
        let rules = default_rules();
        let built = DependencyGraphBuilder::new(&rules)
            .build(&ops(&["kyc.start", "kyc.verify", "resources.create.custody"]))
            .graph;

        let json = serde_json::to_string(&built).unwrap();
        let mut graph: DependencyGraph = serde_json::from_str(&json).unwrap();
        assert_eq!(graph.node("op_1").map(|n| n.id.as_str()), Some("op_1"));
        assert_eq!(graph.edge_set(), built.edge_set());

        crate::compiler::execution_plan::compute_levels(&mut graph).unwrap();
        let levels: Vec<_> = graph.operation_nodes().map(|n| n.level).collect();
        assert_eq!(levels, vec![0, 1, 2]);
    }

    /// A rule that looks forward, which the built-in rules never do
    struct ForwardRule;

    impl OrderingRule for ForwardRule {
        fn name(&self) -> &'static str {
            "forward"
        }

        fn dependencies_for(&self, index: usize, ops: &[Operation]) -> Vec<usize> {
            if index + 1 < ops.len() {
                vec![index + 1]
            } else {
                vec![]
            }
        }
    }

    #[test]
    fn test_cyclic_rule_records_critical_diagnostic() {
        let rules: Vec<Box<dyn OrderingRule>> = vec![
            Box::new(crate::compiler::rules::KycVerificationAfterCollection),
            Box::new(ForwardRule),
        ];
        let outcome = DependencyGraphBuilder::new(&rules).build(&ops(&["kyc.start", "kyc.verify"]));

        // ForwardRule adds op_1 -> op_0 while placing op_0; the KYC rule's
        // op_0 -> op_1 is then rejected while placing op_1
        assert_eq!(requires(&outcome.graph), vec![("op_1".to_string(), "op_0".to_string())]);
        assert_eq!(outcome.diagnostics.len(), 1);
        assert!(outcome.diagnostics[0].is_critical());
        assert_eq!(outcome.diagnostics[0].node_id.as_deref(), Some("op_1"));
        assert_eq!(outcome.diagnostics[0].source_line, Some(2));
    }

    #[test]
    fn test_attribute_and_resource_nodes() {
        let rules = default_rules();
        let ops = vec![
            Operation::new("kyc.collect", vec!["@attr{legal-name}".into()], 1),
            Operation::new("resources.create.custody", vec![], 2),
        ];
        let graph = DependencyGraphBuilder::new(&rules).build(&ops).graph;

        let attr = graph.node("attr_legal-name").unwrap();
        assert_eq!(attr.node_type, NodeType::Attribute);
        let res = graph.node("res_1").unwrap();
        assert_eq!(res.node_type, NodeType::Resource);

        let produces: Vec<_> = graph
            .edges()
            .iter()
            .filter(|e| e.kind == EdgeKind::Produces)
            .map(|e| (e.from.as_str(), e.to.as_str()))
            .collect();
        assert_eq!(produces, vec![("op_0", "attr_legal-name"), ("op_1", "res_1")]);
        assert_eq!(graph.operation_nodes().count(), 2);
    }
}
