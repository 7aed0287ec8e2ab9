//! Scripted value transitions
//!
//! Procedure rules may schedule a smooth change of a plant variable. A
//! transition linearly interpolates from its start value to its target over
//! its duration and overrides the integrated value while it runs. There is
//! at most one transition per variable.

use std::collections::BTreeMap;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::physics::PhysicsConfig;
use crate::plant::{constants, PlantState, PlantVariable};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveTransition {
    pub variable: PlantVariable,
    pub start_value: f64,
    pub target_value: f64,
    pub start_time: f64,   // [s]
    pub duration: f64,     // [s]
}

impl ActiveTransition {
    /// Interpolated value at `now`, and whether the transition has finished.
    pub fn value_at(&self, now: f64) -> (f64, bool) {
        let elapsed = now - self.start_time;
        if elapsed >= self.duration {
            return (self.target_value, true);
        }
        let progress = (elapsed / self.duration.max(constants::EPSILON)).clamp(0.0, 1.0);
        (self.start_value + (self.target_value - self.start_value) * progress, false)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransitionSet {
    active: BTreeMap<PlantVariable, ActiveTransition>,
}

impl TransitionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a transition, replacing any running one for the same variable.
    pub fn schedule(&mut self, transition: ActiveTransition) {
        self.active.insert(transition.variable, transition);
    }

    pub fn get(&self, variable: PlantVariable) -> Option<&ActiveTransition> {
        self.active.get(&variable)
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn clear(&mut self) {
        self.active.clear();
    }

    pub fn to_vec(&self) -> Vec<ActiveTransition> {
        self.active.values().cloned().collect()
    }

    /// Override plant values with every running transition at the state's current time.
    pub fn apply(&mut self, state: &mut PlantState, config: &PhysicsConfig) {
        let now = state.time;
        self.active.retain(|variable, transition| {
            let (value, finished) = transition.value_at(now);
            state.set_value(*variable, value, config);
            if finished {
                debug!("[transition] {:?} reached {:.3}", variable, transition.target_value);
            }
            !finished
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transition(variable: PlantVariable, target: f64, start_time: f64) -> ActiveTransition {
        ActiveTransition {
            variable,
            start_value: 0.0,
            target_value: target,
            start_time,
            duration: 2.0,
        }
    }

    #[test]
    fn interpolates_linearly_then_finishes() {
        let t = transition(PlantVariable::CoreTemp, 100.0, 1.0);
        assert_eq!(t.value_at(2.0), (50.0, false));
        assert_eq!(t.value_at(3.0), (100.0, true));
        assert_eq!(t.value_at(9.0), (100.0, true));
    }

    #[test]
    fn new_transition_replaces_old_for_same_variable() {
        let mut set = TransitionSet::new();
        set.schedule(transition(PlantVariable::SgLevel, 30.0, 0.0));
        set.schedule(transition(PlantVariable::SgLevel, 70.0, 1.0));
        set.schedule(transition(PlantVariable::CoreTemp, 200.0, 0.0));
        assert_eq!(set.len(), 2);
        assert_eq!(set.get(PlantVariable::SgLevel).map(|t| t.target_value), Some(70.0));
    }

    #[test]
    fn apply_overrides_and_retires() {
        let config = PhysicsConfig::default();
        let mut state = PlantState::default();
        let mut set = TransitionSet::new();
        set.schedule(ActiveTransition {
            variable: PlantVariable::TurbineBypassCv,
            start_value: 0.0,
            target_value: 1.0,
            start_time: 0.0,
            duration: 1.0,
        });

        state.time = 0.44;
        set.apply(&mut state, &config);
        assert_eq!(state.controls.turbine_bypass_cv, 0.4);
        assert_eq!(set.len(), 1);

        state.time = 1.0;
        set.apply(&mut state, &config);
        assert_eq!(state.controls.turbine_bypass_cv, 1.0);
        assert!(set.is_empty());
    }
}
