//! Procedure rules
//!
//! Optional side effects of entering a step (or of the fault onset), keyed
//! by step and scenario: boolean control assignments and scripted value
//! transitions. Rules fire again every time their step is re-entered.

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::physics::PhysicsConfig;
use crate::plant::{Command, PlantState, PlantVariable};
use crate::scenario::Scenario;
use crate::transition::{ActiveTransition, TransitionSet};

use super::graph::NodeId;

/// Reserved trigger key for rules that fire when the fault latches
pub const FAULT_ONSET_KEY: &str = "5sec";

pub const DEFAULT_TRANSITION_S: f64 = 3.0;
pub const SLOW_TRANSITION_S: f64 = 5.0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleTrigger {
    /// Normalised step key, e.g. `4_2`, or a raw step id
    Step(String),
    FaultOnset,
}

impl RuleTrigger {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw == FAULT_ONSET_KEY {
            RuleTrigger::FaultOnset
        } else {
            RuleTrigger::Step(raw.to_string())
        }
    }

    pub fn matches_step(&self, step: &NodeId) -> bool {
        match self {
            RuleTrigger::Step(key) => key == step.as_str() || *key == normalize_step_key(step.as_str()),
            RuleTrigger::FaultOnset => false,
        }
    }
}

/// `pc_st_04_02` -> `4_2`. Anything else is returned unchanged.
pub fn normalize_step_key(id: &str) -> String {
    let parts: Vec<&str> = id.split('_').collect();
    if let ["pc", "st", major, minor, ..] = parts.as_slice() {
        if let (Ok(major), Ok(minor)) = (major.parse::<u32>(), minor.parse::<u32>()) {
            return format!("{}_{}", major, minor);
        }
    }
    id.to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioFilter {
    All,
    Only(Scenario),
}

impl ScenarioFilter {
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.trim().eq_ignore_ascii_case("all") {
            return Some(ScenarioFilter::All);
        }
        Scenario::from_code(raw).map(ScenarioFilter::Only)
    }

    pub fn admits(self, scenario: Scenario) -> bool {
        match self {
            ScenarioFilter::All => true,
            ScenarioFilter::Only(only) => only == scenario,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleUpdate {
    Assign { command: Command, value: bool },
    Transition { variable: PlantVariable, target: f64, duration: f64 },
}

impl RuleUpdate {
    /// Interpret one `key=value` cell of a rule table.
    ///
    /// Annunciator-named keys map onto the command that drives the annunciator,
    /// so `fw_pump_trip=TRUE` stops the feedwater pump.
    pub fn parse(key: &str, value: &str) -> Option<Self> {
        let key = key.trim();
        let value = value.trim();

        let flag = if value.eq_ignore_ascii_case("true") {
            Some(true)
        } else if value.eq_ignore_ascii_case("false") {
            Some(false)
        } else {
            None
        };

        if let Some(flag) = flag {
            let (command, value) = match key {
                "trip_reactor" | "all_rods_down" => (Command::TripReactor, flag),
                "activate_si" | "safety_injection_engaged" => (Command::SafetyInjection, flag),
                "rcp" => (Command::ReactorCoolantPump, flag),
                "reactor_coolant_pump_trip" => (Command::ReactorCoolantPump, !flag),
                "fw_pump" => (Command::FeedwaterPump, flag),
                "fw_pump_trip" => (Command::FeedwaterPump, !flag),
                "trip_turbine" | "turbine_trip" => (Command::TripTurbine, flag),
                "porviv" => (Command::PorvIsolation, flag),
                "fwiv" => (Command::FeedwaterIsolation, flag),
                "msiv" => (Command::MainSteamIsolation, flag),
                "fwcv_mode" => (Command::FwcvAuto, flag),
                _ => return None,
            };
            return Some(RuleUpdate::Assign { command, value });
        }

        let variable = PlantVariable::from_key(key)?;
        let (duration, number) = match value.strip_prefix('_') {
            Some(rest) => (SLOW_TRANSITION_S, rest),
            None => (DEFAULT_TRANSITION_S, value),
        };
        let target: f64 = number.parse().ok()?;
        if !target.is_finite() {
            return None;
        }
        Some(RuleUpdate::Transition { variable, target, duration })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcedureRule {
    pub trigger: RuleTrigger,
    pub scenario: ScenarioFilter,
    /// Firing this rule ends the training session
    pub ends_session: bool,
    pub updates: Vec<RuleUpdate>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuleEffect {
    pub fired: usize,
    pub ended: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleBook {
    rules: Vec<ProcedureRule>,
}

impl RuleBook {
    pub fn new(rules: Vec<ProcedureRule>) -> Self {
        Self { rules }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> &[ProcedureRule] {
        &self.rules
    }

    pub fn for_step<'a>(&'a self, step: &'a NodeId, scenario: Scenario) -> impl Iterator<Item = &'a ProcedureRule> + 'a {
        self.rules
            .iter()
            .filter(move |rule| rule.trigger.matches_step(step) && rule.scenario.admits(scenario))
    }

    pub fn for_fault_onset(&self, scenario: Scenario) -> impl Iterator<Item = &ProcedureRule> + '_ {
        self.rules
            .iter()
            .filter(move |rule| rule.trigger == RuleTrigger::FaultOnset && rule.scenario.admits(scenario))
    }

    /// Apply the rules for entering `step`.
    pub fn trigger_step(
        &self,
        step: &NodeId,
        scenario: Scenario,
        state: &mut PlantState,
        transitions: &mut TransitionSet,
        config: &PhysicsConfig,
    ) -> RuleEffect {
        let rules: Vec<&ProcedureRule> = self.for_step(step, scenario).collect();
        let effect = apply_rules(&rules, state, transitions, config);
        if effect.fired > 0 {
            info!("[rules] Step {} fired {} rule(s)", step, effect.fired);
        }
        effect
    }

    /// Apply the rules for the fault onset.
    pub fn trigger_fault_onset(
        &self,
        scenario: Scenario,
        state: &mut PlantState,
        transitions: &mut TransitionSet,
        config: &PhysicsConfig,
    ) -> RuleEffect {
        let rules: Vec<&ProcedureRule> = self.for_fault_onset(scenario).collect();
        let effect = apply_rules(&rules, state, transitions, config);
        if effect.fired > 0 {
            info!("[rules] Fault onset fired {} rule(s)", effect.fired);
        }
        effect
    }
}

fn apply_rules(
    rules: &[&ProcedureRule],
    state: &mut PlantState,
    transitions: &mut TransitionSet,
    config: &PhysicsConfig,
) -> RuleEffect {
    let mut effect = RuleEffect::default();
    for rule in rules {
        effect.fired += 1;
        effect.ended |= rule.ends_session;
        for update in &rule.updates {
            match *update {
                RuleUpdate::Assign { command, value } => state.controls.set_command(command, value),
                RuleUpdate::Transition { variable, target, duration } => {
                    if duration <= 0.0 {
                        warn!("[rules] Non-positive duration for {:?}; applying immediately", variable);
                        state.set_value(variable, target, config);
                        continue;
                    }
                    transitions.schedule(ActiveTransition {
                        variable,
                        start_value: state.value(variable),
                        target_value: target,
                        start_time: state.time,
                        duration,
                    });
                }
            }
        }
    }
    effect
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_keys_normalise() {
        assert_eq!(normalize_step_key("pc_st_04_02"), "4_2");
        assert_eq!(normalize_step_key("pc_st_100_000000"), "100_0");
        assert_eq!(normalize_step_key("ic_000001"), "ic_000001");
        assert!(RuleTrigger::parse("4_2").matches_step(&NodeId::from("pc_st_04_02")));
        assert!(RuleTrigger::parse("pc_st_04_02").matches_step(&NodeId::from("pc_st_04_02")));
        assert_eq!(RuleTrigger::parse("5sec"), RuleTrigger::FaultOnset);
    }

    #[test]
    fn annunciator_keys_map_to_commands() {
        assert_eq!(
            RuleUpdate::parse("fw_pump_trip", "TRUE"),
            Some(RuleUpdate::Assign { command: Command::FeedwaterPump, value: false })
        );
        assert_eq!(
            RuleUpdate::parse("all_rods_down", "true"),
            Some(RuleUpdate::Assign { command: Command::TripReactor, value: true })
        );
        assert_eq!(RuleUpdate::parse("fw_low_flow", "TRUE"), None);
    }

    #[test]
    fn numeric_cells_become_transitions() {
        assert_eq!(
            RuleUpdate::parse("core_t", "_250"),
            Some(RuleUpdate::Transition { variable: PlantVariable::CoreTemp, target: 250.0, duration: 5.0 })
        );
        assert_eq!(
            RuleUpdate::parse("turbine_bypass_cv", "0.1"),
            Some(RuleUpdate::Transition {
                variable: PlantVariable::TurbineBypassCv,
                target: 0.1,
                duration: 3.0,
            })
        );
        assert_eq!(RuleUpdate::parse("core_t", "hot"), None);
    }

    #[test]
    fn scenario_filter_admits() {
        assert!(ScenarioFilter::parse("all").is_some_and(|f| f.admits(Scenario::PumpTrip)));
        let only_c = ScenarioFilter::parse("C");
        assert_eq!(only_c, Some(ScenarioFilter::Only(Scenario::FeedwaterLoss)));
        assert!(!ScenarioFilter::Only(Scenario::FeedwaterLoss).admits(Scenario::ControlValve));
    }

    #[test]
    fn step_rules_assign_and_schedule() {
        let book = RuleBook::new(vec![
            ProcedureRule {
                trigger: RuleTrigger::parse("4_3"),
                scenario: ScenarioFilter::All,
                ends_session: false,
                updates: vec![
                    RuleUpdate::Assign { command: Command::TripTurbine, value: true },
                    RuleUpdate::Transition { variable: PlantVariable::CoreTemp, target: 250.0, duration: 5.0 },
                ],
            },
            ProcedureRule {
                trigger: RuleTrigger::parse("4_3"),
                scenario: ScenarioFilter::Only(Scenario::PumpTrip),
                ends_session: true,
                updates: vec![],
            },
        ]);
        let config = PhysicsConfig::default();
        let mut state = PlantState::default();
        let mut transitions = TransitionSet::new();

        let effect = book.trigger_step(
            &NodeId::from("pc_st_04_03"),
            Scenario::ControlValve,
            &mut state,
            &mut transitions,
            &config,
        );
        assert_eq!(effect, RuleEffect { fired: 1, ended: false });
        assert!(state.controls.trip_turbine);
        let scheduled = transitions.get(PlantVariable::CoreTemp).cloned();
        assert_eq!(scheduled.map(|t| (t.start_value, t.target_value)), Some((310.0, 250.0)));

        let effect = book.trigger_step(
            &NodeId::from("pc_st_04_03"),
            Scenario::PumpTrip,
            &mut state,
            &mut transitions,
            &config,
        );
        assert!(effect.ended);
    }
}
