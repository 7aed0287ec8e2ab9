//! Training Simulator
//!
//! Owns the plant state, the procedure position and the session log behind a
//! single lock. The periodic driver and the operator both go through here,
//! so a control action can never interleave with half a tick.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, info, warn};
use serde::Serialize;

use crate::config::SimConfig;
use crate::error::LoadError;
use crate::noise::DisplayNoise;
use crate::physics;
use crate::plant::{AlarmSet, Command, ControlInputs, PlantState, ProcessVariables, Valve};
use crate::procedure::engine::{resolve, StepChoice, StepOptions};
use crate::procedure::graph::{NodeId, ProcedureGraph};
use crate::procedure::navigator::StepNavigator;
use crate::procedure::rules::{RuleBook, RuleEffect};
use crate::scenario::{FaultPhase, Scenario};
use crate::session::SessionLog;
use crate::transition::{ActiveTransition, TransitionSet};

/// Upper bound on fixed steps run by one real-time call
pub const MAX_STEPS_PER_ADVANCE: usize = 1000;

/// Everything that changes while a session runs
struct Session {
    scenario: Scenario,
    plant: PlantState,
    transitions: TransitionSet,
    navigator: StepNavigator,
    noise: DisplayNoise,
    log: SessionLog,
    ended: bool,
    accumulated_s: f64,  // Simulation time owed to the real-time clock [s]
}

/// Serializable view of the simulator for front ends and exports
#[derive(Debug, Clone, Serialize)]
pub struct SimulatorSnapshot {
    pub scenario: Scenario,
    pub time: f64,
    pub tick_count: u64,
    pub fault_phase: FaultPhase,
    pub cooled_down: bool,
    pub process: ProcessVariables,
    pub display: ProcessVariables,
    pub controls: ControlInputs,
    pub alarms: AlarmSet,
    pub active_alarms: Vec<&'static str>,
    pub transitions: Vec<ActiveTransition>,
    pub active_step: Option<NodeId>,
    pub history: Vec<NodeId>,
    pub step_options: StepOptions,
    pub noise_enabled: bool,
    pub session_ended: bool,
}

pub struct Simulator {
    config: SimConfig,
    graph: ProcedureGraph,
    rules: RuleBook,
    entry_step: Option<NodeId>,
    session: Mutex<Session>,
}

impl Simulator {
    pub fn new(config: SimConfig, graph: ProcedureGraph, rules: RuleBook) -> Self {
        let entry_step = match config.initial_step.as_deref().map(NodeId::from) {
            Some(step) if graph.contains(&step) => Some(step),
            Some(step) => {
                warn!("[simulator] Initial step {} is not in the procedure graph; using the first step", step);
                graph.first_step().cloned()
            }
            None => graph.first_step().cloned(),
        };

        let session = Session {
            scenario: Scenario::default(),
            plant: PlantState::initial(&config.physics),
            transitions: TransitionSet::new(),
            navigator: StepNavigator::new(entry_step.clone()),
            noise: DisplayNoise::new(config.noise.clone()),
            log: SessionLog::new(),
            ended: false,
            accumulated_s: 0.0,
        };

        info!(
            "[simulator] Ready: {} procedure nodes, {} rules, dt={}s",
            graph.node_count(),
            rules.len(),
            config.dt()
        );

        Self {
            config,
            graph,
            rules,
            entry_step,
            session: Mutex::new(session),
        }
    }

    /// Lock the session. A poisoned lock still holds a consistent state.
    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn graph(&self) -> &ProcedureGraph {
        &self.graph
    }

    pub fn entry_step(&self) -> Option<&NodeId> {
        self.entry_step.as_ref()
    }

    pub fn scenario(&self) -> Scenario {
        self.session().scenario
    }

    pub fn plant_state(&self) -> PlantState {
        self.session().plant.clone()
    }

    pub fn session_ended(&self) -> bool {
        self.session().ended
    }

    /// Perform one fixed simulation step
    pub fn step(&self) {
        let mut session = self.session();
        self.step_locked(&mut session);
    }

    fn step_locked(&self, s: &mut Session) {
        let config = &self.config.physics;
        let previous_alarms = s.plant.alarms.clone();

        let outcome = physics::tick(&s.plant, s.scenario, config, self.config.dt());
        s.plant = outcome.state;
        let time = s.plant.time;

        if outcome.fault_onset {
            info!("[simulator] Fault latched at t={:.1}s: {}", time, s.scenario);
            s.log.action(time, "fault_onset", s.scenario);
            let effect = self
                .rules
                .trigger_fault_onset(s.scenario, &mut s.plant, &mut s.transitions, config);
            self.note_rule_effect(s, effect);
        }

        s.transitions.apply(&mut s.plant, config);
        s.plant.refresh_alarms(&config.alarms);

        let tick = s.plant.tick_count;
        let plant = &mut s.plant;
        if s.noise.refresh(&plant.process, tick, &mut plant.display) {
            debug!("[simulator] Display refreshed at tick {}", tick);
        }

        for alarm in s.plant.alarms.raised_since(&previous_alarms) {
            info!("[simulator] Alarm {} at t={:.1}s", alarm, time);
            s.log.alarm(time, alarm);
        }

        if tick % self.ticks_per_second() == 0 {
            let active_step = s.navigator.active().map(|id| id.to_string());
            s.log.snapshot(time, s.plant.process, active_step);
        }
    }

    fn ticks_per_second(&self) -> u64 {
        (1.0 / self.config.dt()).round().max(1.0) as u64
    }

    /// Advance by real elapsed time scaled by `time_speed`, carrying the
    /// fractional remainder to the next call. Returns the number of steps run.
    pub fn advance_realtime(&self, delta_real_s: f64, time_speed: f64) -> usize {
        let dt = self.config.dt();
        let mut session = self.session();

        let delta = delta_real_s * time_speed;
        if delta.is_finite() && delta > 0.0 {
            session.accumulated_s += delta;
        }

        let owed = (session.accumulated_s / dt).floor();
        let steps = if owed > MAX_STEPS_PER_ADVANCE as f64 {
            debug!("[simulator] Dropping {:.0} steps of real-time backlog", owed - MAX_STEPS_PER_ADVANCE as f64);
            session.accumulated_s = 0.0;
            MAX_STEPS_PER_ADVANCE
        } else {
            session.accumulated_s -= owed * dt;
            owed as usize
        };

        for _ in 0..steps {
            self.step_locked(&mut session);
        }
        steps
    }

    pub fn snapshot(&self) -> SimulatorSnapshot {
        let s = self.session();
        SimulatorSnapshot {
            scenario: s.scenario,
            time: s.plant.time,
            tick_count: s.plant.tick_count,
            fault_phase: s.plant.fault.phase(),
            cooled_down: s.plant.cooled_down,
            process: s.plant.process,
            display: s.plant.display,
            controls: s.plant.controls.clone(),
            alarms: s.plant.alarms.clone(),
            active_alarms: s.plant.alarms.active(),
            transitions: s.transitions.to_vec(),
            active_step: s.navigator.active().cloned(),
            history: s.navigator.history().to_vec(),
            step_options: resolve(&self.graph, s.navigator.active()),
            noise_enabled: s.noise.enabled(),
            session_ended: s.ended,
        }
    }

    // ---- Operator controls ----

    pub fn set_command(&self, command: Command, value: bool) {
        let mut s = self.session();
        self.command_locked(&mut s, command, value);
    }

    /// Flip a command. Returns the new value.
    pub fn toggle_command(&self, command: Command) -> bool {
        let mut s = self.session();
        let value = !s.plant.controls.command(command);
        self.command_locked(&mut s, command, value);
        value
    }

    fn command_locked(&self, s: &mut Session, command: Command, value: bool) {
        s.plant.controls.set_command(command, value);
        s.plant.refresh_alarms(&self.config.physics.alarms);
        let time = s.plant.time;
        s.log.action(time, command.name(), value);
        info!("[control] {} = {}", command.name(), value);
    }

    /// Set a valve opening, clamped and quantised to 0.1. The feedwater control
    /// valve only accepts manual positions. Returns the stored opening.
    pub fn set_valve(&self, valve: Valve, opening: f64) -> f64 {
        let mut s = self.session();
        if valve == Valve::FeedwaterControl && s.plant.controls.fwcv_auto {
            warn!("[control] {} ignored: valve is in automatic mode", valve.name());
            return s.plant.controls.valve(valve);
        }
        let stored = s.plant.controls.set_valve(valve, opening);
        s.plant.refresh_alarms(&self.config.physics.alarms);
        let time = s.plant.time;
        s.log.action(time, valve.name(), stored);
        info!("[control] {} = {:.1}", valve.name(), stored);
        stored
    }

    /// Turn display noise on or off. With noise off the display tracks the true state.
    pub fn set_noise_enabled(&self, enabled: bool) {
        let mut s = self.session();
        s.noise.set_enabled(enabled);
        if !enabled {
            s.plant.display = s.plant.process;
        }
        info!("[control] display noise = {}", enabled);
    }

    // ---- Session lifecycle ----

    /// Restore the initial plant, procedure position and log for the current scenario.
    pub fn reset_simulation(&self) {
        let mut s = self.session();
        self.reset_locked(&mut s);
        info!("[simulator] Reset ({})", s.scenario);
    }

    /// Switch scenario. Always a full reset; running transitions are discarded.
    pub fn set_scenario(&self, scenario: Scenario) {
        let mut s = self.session();
        s.scenario = scenario;
        self.reset_locked(&mut s);
        info!("[simulator] Scenario set to {}", scenario);
    }

    fn reset_locked(&self, s: &mut Session) {
        s.plant = PlantState::initial(&self.config.physics);
        s.transitions.clear();
        s.navigator.reset();
        s.noise.reseed();
        s.log.clear();
        s.ended = false;
        s.accumulated_s = 0.0;
    }

    // ---- Procedure ----

    pub fn step_options(&self) -> StepOptions {
        let s = self.session();
        resolve(&self.graph, s.navigator.active())
    }

    /// Restart the procedure at its entry step with an empty history and
    /// fire the entry step's rules. The plant is left as it is.
    pub fn begin_procedure(&self) -> Option<NodeId> {
        let mut s = self.session();
        s.navigator.reset();
        let entry = s.navigator.initial().cloned()?;
        self.fire_step(&mut s, &entry);
        Some(entry)
    }

    /// Make `id` the active step and fire its rules. Unknown ids are ignored.
    pub fn set_active_step(&self, id: NodeId) -> bool {
        let mut s = self.session();
        if !self.graph.contains(&id) {
            warn!("[procedure] Ignoring unknown step {}", id);
            return false;
        }
        self.enter_step(&mut s, id);
        true
    }

    /// Answer the current step. Returns the step moved to, if the choice leads anywhere.
    pub fn choose(&self, choice: StepChoice) -> Option<NodeId> {
        let mut s = self.session();
        let options = resolve(&self.graph, s.navigator.active());
        let target = options.action.target(choice).cloned()?;
        self.enter_step(&mut s, target.clone());
        Some(target)
    }

    pub fn go_to_previous_step(&self) -> bool {
        let mut s = self.session();
        if !s.navigator.go_to_previous_step() {
            return false;
        }
        let time = s.plant.time;
        let active = s.navigator.active().map(|id| id.to_string()).unwrap_or_default();
        s.log.action(time, "previous_step", &active);
        info!("[procedure] Back to {}", active);
        true
    }

    fn enter_step(&self, s: &mut Session, id: NodeId) {
        s.navigator.set_active_step(id.clone());
        self.fire_step(s, &id);
    }

    fn fire_step(&self, s: &mut Session, id: &NodeId) {
        let time = s.plant.time;
        s.log.action(time, "step", id);
        info!("[procedure] Step {}", id);

        let effect = self
            .rules
            .trigger_step(id, s.scenario, &mut s.plant, &mut s.transitions, &self.config.physics);
        s.plant.refresh_alarms(&self.config.physics.alarms);
        self.note_rule_effect(s, effect);
    }

    fn note_rule_effect(&self, s: &mut Session, effect: RuleEffect) {
        if effect.ended && !s.ended {
            s.ended = true;
            let time = s.plant.time;
            s.log.action(time, "session", "end");
            info!("[procedure] Session complete at t={:.1}s", time);
        }
    }

    // ---- Session log ----

    pub fn session_log(&self) -> SessionLog {
        self.session().log.clone()
    }

    pub fn session_log_json(&self) -> serde_json::Result<String> {
        self.session().log.to_json()
    }

    pub fn export_session_log(&self, path: &Path) -> Result<(), LoadError> {
        self.session().log.export(path)
    }
}
