//! Active step and back-navigation history

use serde::{Deserialize, Serialize};

use super::graph::NodeId;

/// Active step plus a LIFO history of the steps that led to it.
/// Forward moves push; going back pops exactly one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepNavigator {
    initial: Option<NodeId>,
    active: Option<NodeId>,
    history: Vec<NodeId>,
}

impl StepNavigator {
    pub fn new(initial: Option<NodeId>) -> Self {
        Self {
            active: initial.clone(),
            initial,
            history: Vec::new(),
        }
    }

    pub fn active(&self) -> Option<&NodeId> {
        self.active.as_ref()
    }

    pub fn history(&self) -> &[NodeId] {
        &self.history
    }

    pub fn initial(&self) -> Option<&NodeId> {
        self.initial.as_ref()
    }

    /// Make `id` the active step, remembering the previous one.
    pub fn set_active_step(&mut self, id: NodeId) {
        if let Some(previous) = self.active.replace(id) {
            self.history.push(previous);
        }
    }

    /// Restore the previous step. No-op on an empty history.
    pub fn go_to_previous_step(&mut self) -> bool {
        match self.history.pop() {
            Some(previous) => {
                self.active = Some(previous);
                true
            }
            None => false,
        }
    }

    /// Back to the initial step with an empty history.
    pub fn reset(&mut self) {
        self.active = self.initial.clone();
        self.history.clear();
    }
}
