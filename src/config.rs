//! Simulator configuration
//!
//! Every section is optional in the JSON file; missing fields take their
//! defaults.

use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::LoadError;
use crate::noise::NoiseConfig;
use crate::physics::PhysicsConfig;

/// Locations probed when no configuration file is given explicitly
pub const CONFIG_CANDIDATES: [&str; 2] = ["config/simulator.json", "../config/simulator.json"];

/// Procedure data files. Unset paths fall back to the built-in procedure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DataPaths {
    pub entities: Option<PathBuf>,
    pub relationships: Option<PathBuf>,
    pub rules: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub physics: PhysicsConfig,
    pub noise: NoiseConfig,
    pub tick_hz: f64,                   // Fixed step rate [Hz]
    pub initial_step: Option<String>,   // Active step at start and after reset; first step when unset
    pub data: DataPaths,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            physics: PhysicsConfig::default(),
            noise: NoiseConfig::default(),
            tick_hz: 10.0,
            initial_step: None,
            data: DataPaths::default(),
        }
    }
}

impl SimConfig {
    /// Fixed step length [s]
    pub fn dt(&self) -> f64 {
        if self.tick_hz.is_finite() && self.tick_hz > 0.0 {
            1.0 / self.tick_hz
        } else {
            0.1
        }
    }

    /// Seconds after start at which the scenario fault latches
    pub fn fault_trigger_s(&self) -> f64 {
        self.physics.fault.trigger_s
    }

    /// Read and validate a configuration file.
    pub fn from_file(path: &Path) -> Result<Self, LoadError> {
        let content = fs::read_to_string(path).map_err(|e| LoadError::io(path, e))?;
        let config: Self = serde_json::from_str(&content).map_err(|e| LoadError::json(path, e))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the integrator cannot run with: inverted or non-finite
    /// clamp bounds, lag gains outside (0, 1], a zero noise decimation.
    pub fn validate(&self) -> Result<(), LoadError> {
        if !(self.tick_hz.is_finite() && self.tick_hz > 0.0) {
            return Err(LoadError::invalid_config("tick_hz", format!("{} is not a positive rate", self.tick_hz)));
        }

        let p = &self.physics;
        check_bounds("physics.core_temp_min_c", "physics.core_temp_max_c", p.core_temp_min_c, p.core_temp_max_c)?;
        check_bounds("physics.sg_level_min", "physics.sg_level_max", p.sg_level_min, p.sg_level_max)?;

        let gains = [
            ("physics.reactivity_gain", p.reactivity_gain),
            ("physics.primary_flow_gain", p.primary_flow_gain),
            ("physics.core_temp_gain", p.core_temp_gain),
            ("physics.feedwater_gain", p.feedwater_gain),
            ("physics.pressure_gain", p.pressure_gain),
            ("physics.turbine_gain", p.turbine_gain),
        ];
        for (field, gain) in gains {
            if !(gain > 0.0 && gain <= 1.0) {
                return Err(LoadError::invalid_config(field, format!("lag gain {} is outside (0, 1]", gain)));
            }
        }

        if !self.physics.fault.trigger_s.is_finite() {
            return Err(LoadError::invalid_config("physics.fault.trigger_s", "must be finite"));
        }
        if self.noise.decimation == 0 {
            return Err(LoadError::invalid_config("noise.decimation", "must be at least 1"));
        }
        Ok(())
    }

    /// Load `path` if given; otherwise the first readable candidate, falling
    /// back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, LoadError> {
        if let Some(path) = path {
            let config = Self::from_file(path)?;
            info!("[config] Loaded {}", path.display());
            return Ok(config);
        }

        for candidate in CONFIG_CANDIDATES {
            let candidate = Path::new(candidate);
            if !candidate.exists() {
                continue;
            }
            match Self::from_file(candidate) {
                Ok(config) => {
                    info!("[config] Loaded {}", candidate.display());
                    return Ok(config);
                }
                Err(e) => warn!("[config] Ignoring {}", e),
            }
        }

        warn!("[config] No configuration file found, using defaults");
        Ok(Self::default())
    }
}

fn check_bounds(min_field: &'static str, max_field: &'static str, min: f64, max: f64) -> Result<(), LoadError> {
    if !min.is_finite() {
        return Err(LoadError::invalid_config(min_field, "bound must be finite"));
    }
    if !max.is_finite() {
        return Err(LoadError::invalid_config(max_field, "bound must be finite"));
    }
    if min > max {
        return Err(LoadError::invalid_config(min_field, format!("{} is above {} = {}", min, max_field, max)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config: SimConfig =
            serde_json::from_str(r#"{ "tick_hz": 20, "physics": { "fault": { "trigger_s": 2.5 } } }"#).unwrap();
        assert_eq!(config.dt(), 0.05);
        assert_eq!(config.fault_trigger_s(), 2.5);
        assert_eq!(config.physics.fault.severe_penalty_c, 60.0);
        assert!(config.noise.enabled);
    }

    #[test]
    fn nonsensical_rate_falls_back_to_default_step() {
        let config = SimConfig { tick_hz: 0.0, ..SimConfig::default() };
        assert_eq!(config.dt(), 0.1);
    }

    fn invalid_field(json: &str) -> Option<&'static str> {
        let config: SimConfig = serde_json::from_str(json).unwrap();
        match config.validate() {
            Err(LoadError::InvalidConfig { field, .. }) => Some(field),
            _ => None,
        }
    }

    #[test]
    fn defaults_are_valid() {
        assert!(SimConfig::default().validate().is_ok());
    }

    #[test]
    fn unusable_values_are_rejected() {
        assert_eq!(
            invalid_field(r#"{ "physics": { "sg_level_min": 60, "sg_level_max": 40 } }"#),
            Some("physics.sg_level_min")
        );
        assert_eq!(
            invalid_field(r#"{ "physics": { "core_temp_min_c": 400, "core_temp_max_c": 100 } }"#),
            Some("physics.core_temp_min_c")
        );
        assert_eq!(invalid_field(r#"{ "physics": { "pressure_gain": 1.5 } }"#), Some("physics.pressure_gain"));
        assert_eq!(invalid_field(r#"{ "physics": { "turbine_gain": 0 } }"#), Some("physics.turbine_gain"));
        assert_eq!(invalid_field(r#"{ "noise": { "decimation": 0 } }"#), Some("noise.decimation"));
        assert_eq!(invalid_field(r#"{ "tick_hz": -5 }"#), Some("tick_hz"));

        let mut config = SimConfig::default();
        config.physics.sg_level_max = f64::NAN;
        assert!(matches!(
            config.validate(),
            Err(LoadError::InvalidConfig { field: "physics.sg_level_max", .. })
        ));
    }

    #[test]
    fn invalid_file_fails_to_load() {
        let path = std::env::temp_dir().join(format!("npp-sim-invalid-{}.json", std::process::id()));
        fs::write(&path, r#"{ "physics": { "sg_level_min": 60, "sg_level_max": 40 } }"#).unwrap();
        let result = SimConfig::load(Some(&path));
        fs::remove_file(&path).ok();
        assert!(matches!(result, Err(LoadError::InvalidConfig { .. })));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let result = SimConfig::load(Some(Path::new("does/not/exist.json")));
        assert!(matches!(result, Err(LoadError::Io { .. })));
    }
}
