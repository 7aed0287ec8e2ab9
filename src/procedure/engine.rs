//! Step resolution
//!
//! Given the graph and the active step, decide what the operator faces:
//! a plain step, a verification, a binary decision, the end of the
//! procedure, or nothing at all. Resolution is a pure function of
//! `(graph, active step)` and is recomputed on every query.
//!
//! Decision chains may go through shared Indicator and Condition nodes. The
//! `check_if` edge's group key selects which of the shared node's outgoing
//! edges belong to the step being evaluated.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::graph::{EdgeLabel, GroupKey, NodeId, ProcedureEdge, ProcedureGraph};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepKind {
    None,
    Step,
    Verify,
    Decision,
    End,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepAction {
    /// No active step; the caller should offer to enter the first step.
    None,
    Step { next: NodeId },
    /// Confirm `subject`, then continue to `next` if there is one.
    Verify { subject: NodeId, next: Option<NodeId> },
    Decision { true_node: Option<NodeId>, false_node: Option<NodeId> },
    /// Terminal step
    End,
}

impl StepAction {
    pub fn kind(&self) -> StepKind {
        match self {
            StepAction::None => StepKind::None,
            StepAction::Step { .. } => StepKind::Step,
            StepAction::Verify { .. } => StepKind::Verify,
            StepAction::Decision { .. } => StepKind::Decision,
            StepAction::End => StepKind::End,
        }
    }

    /// Where an operator's choice leads, if anywhere.
    pub fn target(&self, choice: StepChoice) -> Option<&NodeId> {
        match (self, choice) {
            (StepAction::Step { next }, StepChoice::Proceed) => Some(next),
            (StepAction::Verify { next, .. }, StepChoice::Proceed) => next.as_ref(),
            (StepAction::Decision { true_node, .. }, StepChoice::Answer(true)) => true_node.as_ref(),
            (StepAction::Decision { false_node, .. }, StepChoice::Answer(false)) => false_node.as_ref(),
            _ => None,
        }
    }
}

/// Operator response to the current step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepChoice {
    /// Acknowledge a plain step or confirm a verification
    Proceed,
    /// Answer a decision
    Answer(bool),
}

/// Problems found while resolving a step. Surfaced to the caller, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ResolveDiagnostic {
    #[error("active step {0} is not in the procedure graph")]
    UnknownStep(NodeId),
    #[error("{indicator} has no comparison edge for group {group:?}")]
    NoMatchingComparison { indicator: NodeId, group: Option<GroupKey> },
    #[error("condition {condition} has no TRUE/FALSE branches")]
    ConditionWithoutBranches { condition: NodeId },
    #[error("step {step} has {count} possible successors; taking the first")]
    AmbiguousSuccessor { step: NodeId, count: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOptions {
    pub action: StepAction,
    pub diagnostics: Vec<ResolveDiagnostic>,
}

impl StepOptions {
    fn plain(action: StepAction) -> Self {
        Self { action, diagnostics: Vec::new() }
    }

    pub fn kind(&self) -> StepKind {
        self.action.kind()
    }
}

/// Resolve the options available at `active`.
pub fn resolve(graph: &ProcedureGraph, active: Option<&NodeId>) -> StepOptions {
    let Some(step) = active else {
        return StepOptions::plain(StepAction::None);
    };
    if !graph.contains(step) {
        return StepOptions {
            action: StepAction::End,
            diagnostics: vec![ResolveDiagnostic::UnknownStep(step.clone())],
        };
    }

    let outgoing: Vec<&ProcedureEdge> = graph.outgoing(step).collect();
    let mut diagnostics = Vec::new();

    // Direct branches
    if let Some(action) = branches(&outgoing, None) {
        return StepOptions { action, diagnostics };
    }

    // Two-hop chain: step -check_if-> indicator -is-> condition -TRUE/FALSE->
    if let Some(check) = outgoing.iter().find(|e| e.label == EdgeLabel::CheckIf) {
        match resolve_chain(graph, check) {
            Ok(action) => return StepOptions { action, diagnostics },
            Err(diagnostic) => {
                log::warn!("[procedure] {}", diagnostic);
                diagnostics.push(diagnostic);
            }
        }
    }

    let next = outgoing
        .iter()
        .find(|e| e.label == EdgeLabel::Next)
        .map(|e| e.target.clone());

    if let Some(verify) = outgoing.iter().find(|e| e.label == EdgeLabel::Verify) {
        let action = StepAction::Verify {
            subject: verify.target.clone(),
            next,
        };
        return StepOptions { action, diagnostics };
    }

    if let Some(next) = next {
        return StepOptions { action: StepAction::Step { next }, diagnostics };
    }

    let actionable: Vec<&&ProcedureEdge> = outgoing
        .iter()
        .filter(|e| !e.label.is_administrative() && e.label != EdgeLabel::CheckIf)
        .collect();
    match actionable.as_slice() {
        [] => StepOptions { action: StepAction::End, diagnostics },
        [only] => StepOptions {
            action: StepAction::Step { next: only.target.clone() },
            diagnostics,
        },
        [first, ..] => {
            let diagnostic = ResolveDiagnostic::AmbiguousSuccessor {
                step: step.clone(),
                count: actionable.len(),
            };
            log::warn!("[procedure] {}", diagnostic);
            diagnostics.push(diagnostic);
            StepOptions {
                action: StepAction::Step { next: first.target.clone() },
                diagnostics,
            }
        }
    }
}

/// TRUE/FALSE edges among `edges`, restricted to `group` when one is given.
/// Edges of the group win; ungrouped edges are the fallback.
fn branches(edges: &[&ProcedureEdge], group: Option<&GroupKey>) -> Option<StepAction> {
    let pick = |value: bool| -> Option<NodeId> {
        let mut candidates = edges.iter().filter(|e| e.label == EdgeLabel::Branch(value));
        let edge = match group {
            None => candidates.next(),
            Some(group) => {
                let candidates: Vec<&&ProcedureEdge> = candidates.collect();
                candidates
                    .iter()
                    .find(|e| e.group.as_ref() == Some(group))
                    .or_else(|| candidates.iter().find(|e| e.group.is_none()))
                    .copied()
            }
        };
        edge.map(|e| e.target.clone())
    };

    let true_node = pick(true);
    let false_node = pick(false);
    if true_node.is_none() && false_node.is_none() {
        return None;
    }
    Some(StepAction::Decision { true_node, false_node })
}

fn resolve_chain(graph: &ProcedureGraph, check: &ProcedureEdge) -> Result<StepAction, ResolveDiagnostic> {
    let indicator = &check.target;
    let group = check.group.as_ref();

    let comparison = graph
        .outgoing(indicator)
        .filter(|e| matches!(e.label, EdgeLabel::Compare(_)))
        .find(|e| match group {
            Some(group) => e.group.as_ref() == Some(group),
            None => true,
        })
        .ok_or_else(|| ResolveDiagnostic::NoMatchingComparison {
            indicator: indicator.clone(),
            group: check.group.clone(),
        })?;

    let condition = &comparison.target;
    let condition_edges: Vec<&ProcedureEdge> = graph.outgoing(condition).collect();
    branches(&condition_edges, group).ok_or_else(|| ResolveDiagnostic::ConditionWithoutBranches {
        condition: condition.clone(),
    })
}
