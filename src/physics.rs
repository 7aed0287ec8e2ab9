//! Plant Physics Integrator
//!
//! Simplified first-order plant models tuned for training pacing. Every
//! continuous variable is pulled toward a target computed from the current
//! controls and fault state:
//!
//! ```text
//! new = old + (target - old) * k      k in (0, 1)
//! ```
//!
//! except the steam generator level, which integrates a mass balance. The
//! integrator is a pure function of its inputs; display noise is applied
//! elsewhere and never read back.

use serde::{Deserialize, Serialize};

use crate::plant::{constants, quantize_valve, AlarmLimits, AlarmSet, PlantState};
use crate::scenario::{FaultConfig, Scenario};

/// Tunable integrator constants
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    // Lag gains per tick
    pub reactivity_gain: f64,
    pub primary_flow_gain: f64,
    pub core_temp_gain: f64,
    pub feedwater_gain: f64,
    pub pressure_gain: f64,
    pub turbine_gain: f64,

    // Reactor and primary loop
    pub nominal_reactivity: f64,        // [%]
    pub nominal_primary_flow: f64,      // [L/s]
    pub min_flow_factor: f64,           // Floor on primary flow / nominal
    pub core_temp_zero_power_c: f64,    // Core target with no fission heat [°C]
    pub core_temp_per_reactivity: f64,  // [°C per %]
    pub core_temp_min_c: f64,
    pub core_temp_max_c: f64,
    pub cooldown_threshold_c: f64,      // Target below this latches the cooled-down state

    // Feedwater and steam generator
    pub pump_head_flow: f64,            // Feedwater flow at full valve opening [L/s]
    pub nominal_steam_flow: f64,        // Steam flow at nominal pressure [L/s]
    pub nominal_steam_pressure: f64,    // [kg/cm²]
    pub mass_scale: f64,                // Level % per L of imbalance
    pub sg_level_min: f64,
    pub sg_level_max: f64,
    pub sg_level_setpoint: f64,
    pub convergence_band: f64,          // Half-width around the setpoint [%]
    pub convergence_rate: f64,          // Max level correction per tick [%]
    pub fwcv_gain: f64,                 // Auto controller proportional gain

    // Steam pressure bands, keyed by core temperature [°C] -> pressure [kg/cm²]
    pub pressure_bands: Vec<(f64, f64)>,
    pub pressure_floor: f64,
    pub msiv_closed_rise: f64,          // Extra pressure with the MSIV shut

    // Turbine
    pub nominal_turbine_rpm: f64,
    pub load_speed_droop: f64,          // Fraction of speed set by the load valve

    pub alarms: AlarmLimits,
    pub fault: FaultConfig,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            reactivity_gain: 0.1,
            primary_flow_gain: 0.05,
            core_temp_gain: 0.02,
            feedwater_gain: 0.1,
            pressure_gain: 0.05,
            turbine_gain: 0.02,

            nominal_reactivity: constants::NOMINAL_REACTIVITY,
            nominal_primary_flow: constants::NOMINAL_PRIMARY_FLOW,
            min_flow_factor: 0.1,
            core_temp_zero_power_c: 100.0,
            core_temp_per_reactivity: 2.1,
            core_temp_min_c: 20.0,
            core_temp_max_c: 400.0,
            cooldown_threshold_c: 150.0,

            pump_head_flow: constants::NOMINAL_FEEDWATER_FLOW / constants::INITIAL_FWCV_DEGREE,
            nominal_steam_flow: constants::NOMINAL_FEEDWATER_FLOW,
            nominal_steam_pressure: constants::NOMINAL_STEAM_PRESSURE,
            mass_scale: 0.001,
            sg_level_min: 0.0,
            sg_level_max: 100.0,
            sg_level_setpoint: constants::SG_LEVEL_SETPOINT,
            convergence_band: 0.5,
            convergence_rate: 0.02,
            fwcv_gain: 0.005,

            pressure_bands: vec![(290.0, 60.0), (200.0, 50.0), (120.0, 40.0)],
            pressure_floor: 25.0,
            msiv_closed_rise: 15.0,

            nominal_turbine_rpm: constants::NOMINAL_TURBINE_RPM,
            load_speed_droop: 0.1,

            alarms: AlarmLimits::default(),
            fault: FaultConfig::default(),
        }
    }
}

/// Result of one integration step
#[derive(Debug, Clone)]
pub struct TickOutcome {
    pub state: PlantState,
    /// The fault latched during this step
    pub fault_onset: bool,
}

/// First-order lag toward `target`.
pub fn lag(current: f64, target: f64, gain: f64) -> f64 {
    current + (target - current) * gain
}

/// Move `value` into `[low, high]` by at most `max_step`. Values inside the band are untouched.
pub fn converge_toward(value: f64, low: f64, high: f64, max_step: f64) -> f64 {
    let max_step = max_step.abs();
    if value < low {
        (value + max_step).min(low)
    } else if value > high {
        (value - max_step).max(high)
    } else {
        value
    }
}

/// Advance the plant by one fixed step of `dt` seconds.
pub fn tick(state: &PlantState, scenario: Scenario, config: &PhysicsConfig, dt: f64) -> TickOutcome {
    let mut next = state.clone();
    next.time += dt;
    next.tick_count += 1;

    // Fault latch and its one-shot side effects
    let fault_onset = next.fault.advance(dt);
    if fault_onset {
        scenario.apply_onset(&mut next.controls);
    }
    let fault_active = next.fault.active;
    let effects = scenario.effects(fault_active, &config.fault);

    let prev = &state.process;
    let controls = &mut next.controls;
    let process = &mut next.process;

    // 1. Reactor
    let target_reactivity = if controls.trip_reactor { 0.0 } else { config.nominal_reactivity };
    process.reactivity = lag(prev.reactivity, target_reactivity, config.reactivity_gain).clamp(0.0, 100.0);

    // 2. Primary flow follows the coolant pump
    let target_primary_flow = if controls.rcp { config.nominal_primary_flow } else { 0.0 };
    process.primary_flow = lag(prev.primary_flow, target_primary_flow, config.primary_flow_gain).max(0.0);

    // 3. Core temperature
    let flow_factor = (process.primary_flow / config.nominal_primary_flow.max(constants::EPSILON))
        .max(config.min_flow_factor)
        .max(constants::EPSILON);
    let mut target_core_temp = config.core_temp_zero_power_c
        + config.core_temp_per_reactivity * process.reactivity / flow_factor
        + scenario.core_temp_penalty(fault_active, prev, controls, &config.fault);
    if target_core_temp < config.cooldown_threshold_c {
        next.cooled_down = true;
    }
    if next.cooled_down {
        target_core_temp = target_core_temp.min(config.cooldown_threshold_c);
    }
    let target_core_temp = target_core_temp.clamp(config.core_temp_min_c, config.core_temp_max_c);
    process.core_temp = lag(prev.core_temp, target_core_temp, config.core_temp_gain)
        .clamp(config.core_temp_min_c, config.core_temp_max_c);

    // 4. Feedwater control valve
    if controls.fwcv_auto {
        let error = config.sg_level_setpoint - prev.sg_level;
        let correction = effects.fwcv_drift.unwrap_or(error * config.fwcv_gain);
        controls.fwcv_continuous = (controls.fwcv_continuous + correction).clamp(0.0, 1.0);
        controls.fwcv_degree = quantize_valve(controls.fwcv_continuous);
    } else {
        controls.fwcv_degree = quantize_valve(controls.fwcv_degree);
    }

    // 5. Feedwater flow
    let available_head = if controls.fw_pump && controls.fwiv_open { config.pump_head_flow } else { 0.0 };
    let target_feedwater = available_head * controls.fwcv_degree * effects.feedwater_flow_factor;
    process.feedwater_flow = lag(prev.feedwater_flow, target_feedwater, config.feedwater_gain).max(0.0);

    // 6. Steam generator mass balance
    let steam_out = if controls.msiv_open {
        config.nominal_steam_flow * prev.steam_pressure / config.nominal_steam_pressure.max(constants::EPSILON)
    } else {
        0.0
    };
    let mut sg_level = prev.sg_level + (process.feedwater_flow - steam_out) * config.mass_scale * dt;
    if !fault_active && controls.is_normal_lineup() {
        sg_level = converge_toward(
            sg_level,
            config.sg_level_setpoint - config.convergence_band,
            config.sg_level_setpoint + config.convergence_band,
            config.convergence_rate,
        );
    }
    process.sg_level = sg_level.clamp(config.sg_level_min, config.sg_level_max);

    // 7. Steam pressure
    let mut target_pressure = config
        .pressure_bands
        .iter()
        .find(|(min_core_temp, _)| process.core_temp >= *min_core_temp)
        .map(|(_, pressure)| *pressure)
        .unwrap_or(config.pressure_floor);
    if !controls.msiv_open {
        target_pressure += config.msiv_closed_rise;
    }
    process.steam_pressure = lag(prev.steam_pressure, target_pressure, config.pressure_gain).max(0.0);

    // 8. Turbine
    let target_rpm = if controls.trip_turbine {
        controls.turbine_speed_cv = 0.0;
        controls.turbine_load_cv = 0.0;
        0.0
    } else {
        controls.turbine_speed_cv = quantize_valve(controls.turbine_speed_cv);
        controls.turbine_load_cv = quantize_valve(controls.turbine_load_cv);
        config.nominal_turbine_rpm
            * controls.turbine_speed_cv
            * (1.0 - config.load_speed_droop * (1.0 - controls.turbine_load_cv))
    };
    controls.turbine_bypass_cv = quantize_valve(controls.turbine_bypass_cv);
    process.turbine_speed = lag(prev.turbine_speed, target_rpm, config.turbine_gain).max(0.0);

    next.alarms = AlarmSet::evaluate(&next.process, &next.controls, &config.alarms);

    TickOutcome { state: next, fault_onset }
}
