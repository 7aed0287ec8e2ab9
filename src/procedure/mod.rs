//! Emergency operating procedure
//!
//! The procedure is a directed graph of steps, indicators, conditions and
//! controllers. `engine` resolves what the active step asks of the
//! operator, `navigator` tracks where the operator is, and `rules` holds
//! the plant side effects of entering a step.

pub mod engine;
pub mod graph;
pub mod navigator;
pub mod rules;

pub use engine::{resolve, ResolveDiagnostic, StepAction, StepChoice, StepKind, StepOptions};
pub use graph::{Comparison, EdgeLabel, GroupKey, NodeId, NodeKind, ProcedureEdge, ProcedureGraph, ProcedureNode};
pub use navigator::StepNavigator;
pub use rules::{ProcedureRule, RuleBook, RuleEffect, RuleTrigger, RuleUpdate, ScenarioFilter};
