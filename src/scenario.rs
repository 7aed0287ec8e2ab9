//! Fault Scenarios
//!
//! A scenario is armed at the start of a run and latches active once the
//! elapsed simulation time crosses the trigger threshold. The latch flips at
//! most once per run; one-shot side effects are applied on that flip only.

use serde::{Deserialize, Serialize};

use crate::plant::{ControlInputs, ProcessVariables};

/// Training fault profiles
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    /// Feedwater control valve controller degrades and drifts closed
    #[default]
    ControlValve,
    /// Feedwater pump trips
    PumpTrip,
    /// Total loss of feedwater: the feed line is blocked
    FeedwaterLoss,
}

impl Scenario {
    pub const ALL: [Scenario; 3] = [Scenario::ControlValve, Scenario::PumpTrip, Scenario::FeedwaterLoss];

    /// Single-letter code used by procedure rule tables
    pub fn code(self) -> &'static str {
        match self {
            Scenario::ControlValve => "A",
            Scenario::PumpTrip => "B",
            Scenario::FeedwaterLoss => "C",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "A" | "a" | "cv" => Some(Scenario::ControlValve),
            "B" | "b" | "pump" => Some(Scenario::PumpTrip),
            "C" | "c" | "hard" => Some(Scenario::FeedwaterLoss),
            _ => None,
        }
    }

    /// Side effects applied once, when the fault latches.
    pub fn apply_onset(self, controls: &mut ControlInputs) {
        match self {
            Scenario::PumpTrip => controls.fw_pump = false,
            Scenario::ControlValve | Scenario::FeedwaterLoss => {}
        }
    }

    /// Per-tick target modifiers while the fault is active.
    pub fn effects(self, fault_active: bool, config: &FaultConfig) -> FaultEffects {
        if !fault_active {
            return FaultEffects::default();
        }
        match self {
            Scenario::ControlValve => FaultEffects {
                fwcv_drift: Some(config.fwcv_drift),
                ..FaultEffects::default()
            },
            Scenario::PumpTrip => FaultEffects::default(),
            Scenario::FeedwaterLoss => FaultEffects {
                feedwater_flow_factor: 0.0,
                ..FaultEffects::default()
            },
        }
    }

    /// Additional core temperature target [°C] while the fault is active.
    pub fn core_temp_penalty(
        self,
        fault_active: bool,
        process: &ProcessVariables,
        controls: &ControlInputs,
        config: &FaultConfig,
    ) -> f64 {
        if !fault_active {
            return 0.0;
        }
        match self {
            Scenario::ControlValve | Scenario::PumpTrip => {
                if process.sg_level < config.depressed_level {
                    config.depressed_level_penalty_c
                } else {
                    0.0
                }
            }
            Scenario::FeedwaterLoss => {
                let bypass_relief = 1.0 - controls.turbine_bypass_cv.clamp(0.0, 1.0);
                let si_relief = if controls.safety_injection { config.si_penalty_factor } else { 1.0 };
                config.severe_penalty_c * bypass_relief * si_relief
            }
        }
    }
}

impl std::fmt::Display for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Scenario::ControlValve => "control valve malfunction",
            Scenario::PumpTrip => "feedwater pump trip",
            Scenario::FeedwaterLoss => "total loss of feedwater",
        };
        f.write_str(label)
    }
}

/// Fault timing and penalty settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultConfig {
    pub trigger_s: f64,                  // Elapsed time at which the fault latches [s]
    pub fwcv_drift: f64,                 // Stuck controller correction per tick
    pub depressed_level: f64,            // SG level below which the core runs hotter [%]
    pub depressed_level_penalty_c: f64,  // [°C]
    pub severe_penalty_c: f64,           // Total feedwater loss penalty [°C]
    pub si_penalty_factor: f64,          // Penalty multiplier once SI is running
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            trigger_s: 5.0,
            fwcv_drift: -0.01,
            depressed_level: 45.0,
            depressed_level_penalty_c: 15.0,
            severe_penalty_c: 60.0,
            si_penalty_factor: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaultEffects {
    /// Multiplies the feedwater flow target
    pub feedwater_flow_factor: f64,
    /// Replaces the automatic level correction
    pub fwcv_drift: Option<f64>,
}

impl Default for FaultEffects {
    fn default() -> Self {
        Self {
            feedwater_flow_factor: 1.0,
            fwcv_drift: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FaultPhase {
    Armed,
    Active,
}

/// Elapsed time plus the one-way fault latch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaultTimer {
    pub elapsed: f64,    // [s]
    pub trigger_s: f64,  // [s]
    pub active: bool,
}

impl FaultTimer {
    pub fn new(trigger_s: f64) -> Self {
        Self {
            elapsed: 0.0,
            trigger_s,
            active: false,
        }
    }

    pub fn phase(&self) -> FaultPhase {
        if self.active {
            FaultPhase::Active
        } else {
            FaultPhase::Armed
        }
    }

    /// Advance the timer. Returns true only on the tick the latch flips.
    pub fn advance(&mut self, dt: f64) -> bool {
        self.elapsed += dt.max(0.0);
        if !self.active && self.elapsed >= self.trigger_s {
            self.active = true;
            return true;
        }
        false
    }
}
