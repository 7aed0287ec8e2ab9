//! Procedure graph model
//!
//! Typed nodes and labelled edges parsed once at the load boundary. Edges
//! whose endpoints are missing never enter the graph.

use std::collections::HashMap;
use std::fmt;

use log::warn;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Correlation id tying together the edges of one condition chain
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupKey(String);

impl GroupKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for GroupKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Step,
    Logic,
    Indicator,
    Controller,
    Condition,
    Feature,
}

impl NodeKind {
    /// Entity type codes of the tabular source data.
    pub fn from_code(code: &str) -> Option<Self> {
        let kind = match code.trim().to_ascii_uppercase().as_str() {
            "PC_ST" | "STEP" => NodeKind::Step,
            "PC_LO" | "LOGIC" => NodeKind::Logic,
            "IC" | "INDICATOR" => NodeKind::Indicator,
            "CT" | "CONTROLLER" => NodeKind::Controller,
            "PC_CD" | "PC_CO" | "CONDITION" => NodeKind::Condition,
            "PC_FT" | "PC_IN" | "FEATURE" => NodeKind::Feature,
            _ => return None,
        };
        Some(kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Is,
    Below,
    Over,
}

/// Semantic tag of an edge
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeLabel {
    Verify,
    CheckIf,
    Compare(Comparison),
    Branch(bool),
    Next,
    Info,
    Action(String),
}

impl EdgeLabel {
    /// Prefix that marks an edge as a plain "go on" link.
    pub const FOLLOW_PREFIX: &'static str = "follow";

    pub fn parse(raw: &str) -> Self {
        let label = raw.trim();
        let lower = label.to_ascii_lowercase();
        match lower.as_str() {
            "verify" => return EdgeLabel::Verify,
            "check_if" => return EdgeLabel::CheckIf,
            "true" | "true_then" => return EdgeLabel::Branch(true),
            "false" | "false_then" => return EdgeLabel::Branch(false),
            "next" | "move_to" => return EdgeLabel::Next,
            "read_the_info" => return EdgeLabel::Info,
            _ => {}
        }
        if lower.starts_with(Self::FOLLOW_PREFIX) {
            return EdgeLabel::Next;
        }
        if lower.starts_with("is_below") || lower.starts_with("is_less") {
            return EdgeLabel::Compare(Comparison::Below);
        }
        if lower.starts_with("is_over") || lower.starts_with("is_larger") {
            return EdgeLabel::Compare(Comparison::Over);
        }
        if lower == "is" || lower.starts_with("is_") {
            return EdgeLabel::Compare(Comparison::Is);
        }
        EdgeLabel::Action(label.to_string())
    }

    /// Comparison and annotation edges describe a node; they are not something to do.
    pub fn is_administrative(&self) -> bool {
        matches!(self, EdgeLabel::Compare(_) | EdgeLabel::Info)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcedureNode {
    pub id: NodeId,
    pub kind: NodeKind,
    pub name: String,
    pub value: Option<String>,
}

impl ProcedureNode {
    pub fn new(id: impl Into<NodeId>, kind: NodeKind, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            name: name.into(),
            value: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcedureEdge {
    pub source: NodeId,
    pub target: NodeId,
    pub label: EdgeLabel,
    pub group: Option<GroupKey>,
}

impl ProcedureEdge {
    pub fn new(source: impl Into<NodeId>, target: impl Into<NodeId>, label: EdgeLabel) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            label,
            group: None,
        }
    }

    pub fn grouped(mut self, group: impl Into<String>) -> Self {
        self.group = Some(GroupKey::new(group));
        self
    }
}

/// Directed graph of procedure nodes. Iteration follows load order.
#[derive(Debug, Clone, Default)]
pub struct ProcedureGraph {
    nodes: HashMap<NodeId, ProcedureNode>,
    order: Vec<NodeId>,
    edges: Vec<ProcedureEdge>,
    outgoing: HashMap<NodeId, Vec<usize>>,
}

impl ProcedureGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph, dropping edges with a missing endpoint.
    pub fn from_parts(nodes: Vec<ProcedureNode>, edges: Vec<ProcedureEdge>) -> Self {
        let mut graph = Self::new();
        for node in nodes {
            graph.add_node(node);
        }
        let mut dropped = 0;
        for edge in edges {
            if !graph.add_edge(edge) {
                dropped += 1;
            }
        }
        if dropped > 0 {
            warn!("[procedure] Dropped {} edges with missing endpoints", dropped);
        }
        graph
    }

    /// Insert or replace a node.
    pub fn add_node(&mut self, node: ProcedureNode) {
        if !self.nodes.contains_key(&node.id) {
            self.order.push(node.id.clone());
        }
        self.nodes.insert(node.id.clone(), node);
    }

    /// Insert an edge. Returns false, leaving the graph unchanged, if either endpoint is unknown.
    pub fn add_edge(&mut self, edge: ProcedureEdge) -> bool {
        if !self.nodes.contains_key(&edge.source) || !self.nodes.contains_key(&edge.target) {
            warn!(
                "[procedure] Edge {} -> {} ({:?}) references a missing node",
                edge.source, edge.target, edge.label
            );
            return false;
        }
        self.outgoing.entry(edge.source.clone()).or_default().push(self.edges.len());
        self.edges.push(edge);
        true
    }

    pub fn node(&self, id: &NodeId) -> Option<&ProcedureNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &ProcedureNode> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    pub fn edges(&self) -> &[ProcedureEdge] {
        &self.edges
    }

    pub fn outgoing<'a>(&'a self, id: &NodeId) -> impl Iterator<Item = &'a ProcedureEdge> + 'a {
        self.outgoing
            .get(id)
            .into_iter()
            .flatten()
            .map(move |&index| &self.edges[index])
    }

    /// First step node in load order: the procedure's entry point.
    pub fn first_step(&self) -> Option<&NodeId> {
        self.nodes().find(|node| node.kind == NodeKind::Step).map(|node| &node.id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_parse_into_semantic_tags() {
        assert_eq!(EdgeLabel::parse("verify"), EdgeLabel::Verify);
        assert_eq!(EdgeLabel::parse("check_if"), EdgeLabel::CheckIf);
        assert_eq!(EdgeLabel::parse("TRUE"), EdgeLabel::Branch(true));
        assert_eq!(EdgeLabel::parse("false_then"), EdgeLabel::Branch(false));
        assert_eq!(EdgeLabel::parse("follow_up"), EdgeLabel::Next);
        assert_eq!(EdgeLabel::parse("move_to"), EdgeLabel::Next);
        assert_eq!(EdgeLabel::parse("is_below_than"), EdgeLabel::Compare(Comparison::Below));
        assert_eq!(EdgeLabel::parse("is_larger_than"), EdgeLabel::Compare(Comparison::Over));
        assert_eq!(EdgeLabel::parse("is_not"), EdgeLabel::Compare(Comparison::Is));
        assert_eq!(EdgeLabel::parse("press"), EdgeLabel::Action("press".to_string()));
        assert!(EdgeLabel::parse("read_the_info").is_administrative());
        assert!(!EdgeLabel::parse("go_to").is_administrative());
    }

    #[test]
    fn dangling_edges_are_dropped() {
        let graph = ProcedureGraph::from_parts(
            vec![
                ProcedureNode::new("a", NodeKind::Step, "A"),
                ProcedureNode::new("b", NodeKind::Step, "B"),
            ],
            vec![
                ProcedureEdge::new("a", "b", EdgeLabel::Next),
                ProcedureEdge::new("a", "ghost", EdgeLabel::Next),
                ProcedureEdge::new("ghost", "b", EdgeLabel::Next),
            ],
        );
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.outgoing(&NodeId::from("a")).count(), 1);
        assert_eq!(graph.outgoing(&NodeId::from("ghost")).count(), 0);
    }

    #[test]
    fn first_step_follows_load_order() {
        let graph = ProcedureGraph::from_parts(
            vec![
                ProcedureNode::new("ic", NodeKind::Indicator, "Meter"),
                ProcedureNode::new("s2", NodeKind::Step, "STEP2"),
                ProcedureNode::new("s1", NodeKind::Step, "STEP1"),
            ],
            vec![],
        );
        assert_eq!(graph.first_step(), Some(&NodeId::from("s2")));
    }
}
