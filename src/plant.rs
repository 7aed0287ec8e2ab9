//! Plant State
//!
//! True process variables, their display mirrors, operator commands and the
//! annunciator set derived from them.

use serde::{Deserialize, Serialize};

use crate::physics::PhysicsConfig;
use crate::scenario::FaultTimer;

/// Nominal operating point of the training plant
pub mod constants {
    pub const NOMINAL_REACTIVITY: f64 = 100.0;
    pub const NOMINAL_CORE_TEMP_C: f64 = 310.0;
    pub const NOMINAL_PRIMARY_FLOW: f64 = 45000.0;
    pub const NOMINAL_FEEDWATER_FLOW: f64 = 1500.0;
    pub const NOMINAL_STEAM_PRESSURE: f64 = 60.0;
    pub const NOMINAL_TURBINE_RPM: f64 = 1800.0;
    pub const SG_LEVEL_SETPOINT: f64 = 50.0;
    pub const INITIAL_FWCV_DEGREE: f64 = 0.8;

    /// Control valves move in fixed 10% increments
    pub const VALVE_STEPS: f64 = 10.0;

    /// Floor for denominators
    pub const EPSILON: f64 = 1.0e-6;
}

/// Round a valve opening to the nearest 0.1 inside [0, 1].
pub fn quantize_valve(opening: f64) -> f64 {
    if !opening.is_finite() {
        return 0.0;
    }
    (opening.clamp(0.0, 1.0) * constants::VALVE_STEPS).round() / constants::VALVE_STEPS
}

/// Continuous plant variables. Used both for the true state and the display mirror.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProcessVariables {
    pub reactivity: f64,      // Reactor power [%], 0-100
    pub core_temp: f64,       // [°C]
    pub primary_flow: f64,    // [L/s]
    pub feedwater_flow: f64,  // [L/s]
    pub sg_level: f64,        // Steam generator narrow-range level [%]
    pub steam_pressure: f64,  // [kg/cm²]
    pub turbine_speed: f64,   // [rpm]
}

impl Default for ProcessVariables {
    fn default() -> Self {
        Self {
            reactivity: constants::NOMINAL_REACTIVITY,
            core_temp: constants::NOMINAL_CORE_TEMP_C,
            primary_flow: constants::NOMINAL_PRIMARY_FLOW,
            feedwater_flow: constants::NOMINAL_FEEDWATER_FLOW,
            sg_level: constants::SG_LEVEL_SETPOINT,
            steam_pressure: constants::NOMINAL_STEAM_PRESSURE,
            turbine_speed: constants::NOMINAL_TURBINE_RPM,
        }
    }
}

impl ProcessVariables {
    pub const COLUMNS: [&'static str; 7] = [
        "reactivity",
        "core_temp",
        "primary_flow",
        "feedwater_flow",
        "sg_level",
        "steam_pressure",
        "turbine_speed",
    ];

    pub fn to_row(&self) -> [f64; 7] {
        [
            self.reactivity,
            self.core_temp,
            self.primary_flow,
            self.feedwater_flow,
            self.sg_level,
            self.steam_pressure,
            self.turbine_speed,
        ]
    }
}

/// Discrete operator commands (pumps, isolation valves, trips, modes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    TripReactor,
    SafetyInjection,
    ReactorCoolantPump,
    PorvIsolation,
    FwcvAuto,
    FeedwaterIsolation,
    MainSteamIsolation,
    FeedwaterPump,
    TripTurbine,
}

impl Command {
    pub fn name(self) -> &'static str {
        match self {
            Command::TripReactor => "trip_reactor",
            Command::SafetyInjection => "activate_si",
            Command::ReactorCoolantPump => "rcp",
            Command::PorvIsolation => "porviv",
            Command::FwcvAuto => "fwcv_mode",
            Command::FeedwaterIsolation => "fwiv",
            Command::MainSteamIsolation => "msiv",
            Command::FeedwaterPump => "fw_pump",
            Command::TripTurbine => "trip_turbine",
        }
    }
}

/// Quantised control valve openings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Valve {
    FeedwaterControl,
    TurbineSpeed,
    TurbineLoad,
    TurbineBypass,
}

impl Valve {
    pub fn name(self) -> &'static str {
        match self {
            Valve::FeedwaterControl => "fwcv_degree",
            Valve::TurbineSpeed => "turbine_speed_cv",
            Valve::TurbineLoad => "turbine_load_cv",
            Valve::TurbineBypass => "turbine_bypass_cv",
        }
    }
}

/// Operator controls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlInputs {
    // Reactor
    pub trip_reactor: bool,
    pub safety_injection: bool,
    pub rcp: bool,
    pub porv_isolation: bool,

    // Steam generator
    pub fwcv_auto: bool,          // true = automatic level control
    pub fwcv_degree: f64,         // Quantised opening, 0.0-1.0
    pub fwcv_continuous: f64,     // Controller's internal continuous position
    pub fwiv_open: bool,
    pub msiv_open: bool,
    pub fw_pump: bool,

    // Turbine
    pub trip_turbine: bool,
    pub turbine_speed_cv: f64,
    pub turbine_load_cv: f64,
    pub turbine_bypass_cv: f64,
}

impl Default for ControlInputs {
    fn default() -> Self {
        Self {
            trip_reactor: false,
            safety_injection: false,
            rcp: true,
            porv_isolation: false,
            fwcv_auto: true,
            fwcv_degree: constants::INITIAL_FWCV_DEGREE,
            fwcv_continuous: constants::INITIAL_FWCV_DEGREE,
            fwiv_open: true,
            msiv_open: true,
            fw_pump: true,
            trip_turbine: false,
            turbine_speed_cv: 1.0,
            turbine_load_cv: 1.0,
            turbine_bypass_cv: 0.0,
        }
    }
}

impl ControlInputs {
    pub fn command(&self, command: Command) -> bool {
        match command {
            Command::TripReactor => self.trip_reactor,
            Command::SafetyInjection => self.safety_injection,
            Command::ReactorCoolantPump => self.rcp,
            Command::PorvIsolation => self.porv_isolation,
            Command::FwcvAuto => self.fwcv_auto,
            Command::FeedwaterIsolation => self.fwiv_open,
            Command::MainSteamIsolation => self.msiv_open,
            Command::FeedwaterPump => self.fw_pump,
            Command::TripTurbine => self.trip_turbine,
        }
    }

    pub fn set_command(&mut self, command: Command, value: bool) {
        let slot = match command {
            Command::TripReactor => &mut self.trip_reactor,
            Command::SafetyInjection => &mut self.safety_injection,
            Command::ReactorCoolantPump => &mut self.rcp,
            Command::PorvIsolation => &mut self.porv_isolation,
            Command::FwcvAuto => &mut self.fwcv_auto,
            Command::FeedwaterIsolation => &mut self.fwiv_open,
            Command::MainSteamIsolation => &mut self.msiv_open,
            Command::FeedwaterPump => &mut self.fw_pump,
            Command::TripTurbine => &mut self.trip_turbine,
        };
        *slot = value;
    }

    pub fn valve(&self, valve: Valve) -> f64 {
        match valve {
            Valve::FeedwaterControl => self.fwcv_degree,
            Valve::TurbineSpeed => self.turbine_speed_cv,
            Valve::TurbineLoad => self.turbine_load_cv,
            Valve::TurbineBypass => self.turbine_bypass_cv,
        }
    }

    /// Set a valve opening, clamped and quantised. Returns the stored value.
    pub fn set_valve(&mut self, valve: Valve, opening: f64) -> f64 {
        let stepped = quantize_valve(opening);
        match valve {
            Valve::FeedwaterControl => {
                self.fwcv_degree = stepped;
                self.fwcv_continuous = stepped;
            }
            Valve::TurbineSpeed => self.turbine_speed_cv = stepped,
            Valve::TurbineLoad => self.turbine_load_cv = stepped,
            Valve::TurbineBypass => self.turbine_bypass_cv = stepped,
        }
        stepped
    }

    /// Pumps running, isolation valves open, automatic level control, no trips.
    pub fn is_normal_lineup(&self) -> bool {
        self.rcp
            && self.fw_pump
            && self.fwiv_open
            && self.msiv_open
            && self.fwcv_auto
            && !self.trip_reactor
            && !self.trip_turbine
    }
}

/// Variables a scripted transition may drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlantVariable {
    Reactivity,
    CoreTemp,
    PrimaryFlow,
    FeedwaterFlow,
    SgLevel,
    SteamPressure,
    TurbineSpeed,
    FwcvDegree,
    TurbineSpeedCv,
    TurbineLoadCv,
    TurbineBypassCv,
}

impl PlantVariable {
    /// Column keys used by procedure rule tables.
    pub fn from_key(key: &str) -> Option<Self> {
        let variable = match key {
            "Reactivity" | "reactivity" => PlantVariable::Reactivity,
            "core_t" => PlantVariable::CoreTemp,
            "pri_flow" => PlantVariable::PrimaryFlow,
            "fw_flow" => PlantVariable::FeedwaterFlow,
            "sg_level" => PlantVariable::SgLevel,
            "steam_press" => PlantVariable::SteamPressure,
            "turbine_rpm" => PlantVariable::TurbineSpeed,
            "fwcv_degree" => PlantVariable::FwcvDegree,
            "turbine_speed_cv" => PlantVariable::TurbineSpeedCv,
            "turbine_load_cv" => PlantVariable::TurbineLoadCv,
            "turbine_bypass_cv" => PlantVariable::TurbineBypassCv,
            _ => return None,
        };
        Some(variable)
    }

    fn valve(self) -> Option<Valve> {
        match self {
            PlantVariable::FwcvDegree => Some(Valve::FeedwaterControl),
            PlantVariable::TurbineSpeedCv => Some(Valve::TurbineSpeed),
            PlantVariable::TurbineLoadCv => Some(Valve::TurbineLoad),
            PlantVariable::TurbineBypassCv => Some(Valve::TurbineBypass),
            _ => None,
        }
    }
}

/// Annunciator limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlarmLimits {
    pub core_temp_high: f64,         // [°C]
    pub core_temp_trip: f64,         // [°C]
    pub core_temp_low: f64,          // [°C]
    pub shutdown_reactivity: f64,    // Below this the reactor counts as shut down [%]
    pub primary_flow_low: f64,       // [L/s]
    pub sg_level_low: f64,           // [%]
    pub sg_level_high: f64,          // [%]
    pub feedwater_flow_low: f64,     // [L/s]
    pub steam_pressure_low: f64,     // [kg/cm²]
    pub atmos_dump_opening: f64,     // Bypass opening that counts as dumping
    pub roll_speed: f64,             // [rpm]
    pub sync_band: (f64, f64),       // [rpm]
}

impl Default for AlarmLimits {
    fn default() -> Self {
        Self {
            core_temp_high: 330.0,
            core_temp_trip: 350.0,
            core_temp_low: 270.0,
            shutdown_reactivity: 10.0,
            primary_flow_low: 40000.0,
            sg_level_low: 45.0,
            sg_level_high: 55.0,
            feedwater_flow_low: 500.0,
            steam_pressure_low: 40.0,
            atmos_dump_opening: 0.1,
            roll_speed: 100.0,
            sync_band: (1750.0, 1850.0),
        }
    }
}

/// Annunciator panel. Always a projection of the true state; never assigned directly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmSet {
    // Primary
    pub core_temp_high: bool,
    pub high_temp_reactor_trip: bool,
    pub core_temp_low: bool,
    pub low_primary_coolant: bool,
    pub reactor_coolant_pump_trip: bool,
    pub safety_injection_engaged: bool,
    pub all_rods_down: bool,

    // Secondary
    pub sg_high_level: bool,
    pub sg_low_level: bool,
    pub fw_low_flow: bool,
    pub fw_pump_trip: bool,
    pub low_steam_pressure: bool,

    // Turbine
    pub turbine_trip: bool,
    pub atmos_dump_active: bool,
    pub ready_to_roll: bool,
    pub ready_to_sync: bool,
    pub not_synced_to_grid: bool,
    pub not_latched: bool,
}

impl AlarmSet {
    pub fn evaluate(process: &ProcessVariables, controls: &ControlInputs, limits: &AlarmLimits) -> Self {
        let at_power = process.reactivity > limits.shutdown_reactivity;
        let ready_to_sync = process.turbine_speed > limits.sync_band.0
            && process.turbine_speed < limits.sync_band.1;

        Self {
            core_temp_high: process.core_temp > limits.core_temp_high,
            high_temp_reactor_trip: process.core_temp > limits.core_temp_trip,
            core_temp_low: process.core_temp < limits.core_temp_low && at_power,
            low_primary_coolant: process.primary_flow < limits.primary_flow_low,
            reactor_coolant_pump_trip: !controls.rcp,
            safety_injection_engaged: controls.safety_injection,
            all_rods_down: controls.trip_reactor,

            sg_high_level: process.sg_level > limits.sg_level_high,
            sg_low_level: process.sg_level < limits.sg_level_low,
            fw_low_flow: process.feedwater_flow < limits.feedwater_flow_low && at_power,
            fw_pump_trip: !controls.fw_pump,
            low_steam_pressure: process.steam_pressure < limits.steam_pressure_low,

            turbine_trip: controls.trip_turbine,
            atmos_dump_active: controls.turbine_bypass_cv > limits.atmos_dump_opening,
            ready_to_roll: !controls.trip_turbine && process.turbine_speed < limits.roll_speed,
            ready_to_sync,
            not_synced_to_grid: !ready_to_sync,
            not_latched: controls.trip_turbine,
        }
    }

    /// Every annunciator with its current state, panel order.
    pub fn entries(&self) -> [(&'static str, bool); 18] {
        [
            ("core_temp_high", self.core_temp_high),
            ("high_temp_reactor_trip", self.high_temp_reactor_trip),
            ("core_temp_low", self.core_temp_low),
            ("low_primary_coolant", self.low_primary_coolant),
            ("reactor_coolant_pump_trip", self.reactor_coolant_pump_trip),
            ("safety_injection_engaged", self.safety_injection_engaged),
            ("all_rods_down", self.all_rods_down),
            ("sg_high_level", self.sg_high_level),
            ("sg_low_level", self.sg_low_level),
            ("fw_low_flow", self.fw_low_flow),
            ("fw_pump_trip", self.fw_pump_trip),
            ("low_steam_pressure", self.low_steam_pressure),
            ("turbine_trip", self.turbine_trip),
            ("atmos_dump_active", self.atmos_dump_active),
            ("ready_to_roll", self.ready_to_roll),
            ("ready_to_sync", self.ready_to_sync),
            ("not_synced_to_grid", self.not_synced_to_grid),
            ("not_latched", self.not_latched),
        ]
    }

    pub fn active(&self) -> Vec<&'static str> {
        self.entries()
            .iter()
            .filter(|(_, on)| *on)
            .map(|(name, _)| *name)
            .collect()
    }

    /// Alarms that are on now but were off in `previous`.
    pub fn raised_since(&self, previous: &AlarmSet) -> Vec<&'static str> {
        self.entries()
            .iter()
            .zip(previous.entries().iter())
            .filter(|((_, now), (_, before))| *now && !*before)
            .map(|((name, _), _)| *name)
            .collect()
    }
}

/// Complete plant state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlantState {
    // Time
    pub time: f64,              // Simulation time [s]
    pub tick_count: u64,

    pub process: ProcessVariables,
    pub display: ProcessVariables,
    pub controls: ControlInputs,

    pub fault: FaultTimer,
    pub cooled_down: bool,      // One-way latch once the core target falls below cool-down

    pub alarms: AlarmSet,
}

impl Default for PlantState {
    fn default() -> Self {
        Self::initial(&PhysicsConfig::default())
    }
}

impl PlantState {
    pub fn initial(config: &PhysicsConfig) -> Self {
        let process = ProcessVariables::default();
        let controls = ControlInputs::default();
        let alarms = AlarmSet::evaluate(&process, &controls, &config.alarms);

        Self {
            time: 0.0,
            tick_count: 0,
            process,
            display: process,
            controls,
            fault: FaultTimer::new(config.fault.trigger_s),
            cooled_down: false,
            alarms,
        }
    }

    pub fn refresh_alarms(&mut self, limits: &AlarmLimits) {
        self.alarms = AlarmSet::evaluate(&self.process, &self.controls, limits);
    }

    pub fn value(&self, variable: PlantVariable) -> f64 {
        if let Some(valve) = variable.valve() {
            return self.controls.valve(valve);
        }
        let p = &self.process;
        match variable {
            PlantVariable::Reactivity => p.reactivity,
            PlantVariable::CoreTemp => p.core_temp,
            PlantVariable::PrimaryFlow => p.primary_flow,
            PlantVariable::FeedwaterFlow => p.feedwater_flow,
            PlantVariable::SgLevel => p.sg_level,
            PlantVariable::SteamPressure => p.steam_pressure,
            PlantVariable::TurbineSpeed => p.turbine_speed,
            _ => 0.0,
        }
    }

    /// Overwrite a variable, keeping it inside its physical domain.
    pub fn set_value(&mut self, variable: PlantVariable, value: f64, config: &PhysicsConfig) {
        if let Some(valve) = variable.valve() {
            self.controls.set_valve(valve, value);
            return;
        }
        let value = if value.is_finite() { value } else { 0.0 };
        let p = &mut self.process;
        match variable {
            PlantVariable::Reactivity => p.reactivity = value.clamp(0.0, 100.0),
            PlantVariable::CoreTemp => {
                p.core_temp = value.clamp(config.core_temp_min_c, config.core_temp_max_c)
            }
            PlantVariable::PrimaryFlow => p.primary_flow = value.max(0.0),
            PlantVariable::FeedwaterFlow => p.feedwater_flow = value.max(0.0),
            PlantVariable::SgLevel => {
                p.sg_level = value.clamp(config.sg_level_min, config.sg_level_max)
            }
            PlantVariable::SteamPressure => p.steam_pressure = value.max(0.0),
            PlantVariable::TurbineSpeed => p.turbine_speed = value.max(0.0),
            _ => {}
        }
    }
}
