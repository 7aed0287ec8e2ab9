//! Display noise
//!
//! Instruments show the true value plus bounded uniform noise, refreshed on
//! a decimation schedule. Noise reads the true state and writes only the
//! display mirror.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::plant::ProcessVariables;

/// Peak-to-peak noise per instrument
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseMagnitudes {
    pub reactivity: f64,
    pub core_temp: f64,
    pub primary_flow: f64,
    pub feedwater_flow: f64,
    pub sg_level: f64,
    pub steam_pressure: f64,
    pub turbine_speed: f64,
}

impl Default for NoiseMagnitudes {
    fn default() -> Self {
        Self {
            reactivity: 0.5,
            core_temp: 1.0,
            primary_flow: 500.0,
            feedwater_flow: 20.0,
            sg_level: 0.5,
            steam_pressure: 0.5,
            turbine_speed: 5.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseConfig {
    /// Stochastic training mode. When false the display equals the true state every tick.
    pub enabled: bool,
    /// Refresh the noisy display every N ticks
    pub decimation: u64,
    /// Fixed seed for reproducible displays
    pub seed: Option<u64>,
    pub magnitudes: NoiseMagnitudes,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            decimation: 10,
            seed: None,
            magnitudes: NoiseMagnitudes::default(),
        }
    }
}

pub struct DisplayNoise {
    config: NoiseConfig,
    rng: StdRng,
}

impl DisplayNoise {
    pub fn new(config: NoiseConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { config, rng }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.config.enabled = enabled;
    }

    /// Restart the noise sequence (same seed, same sequence).
    pub fn reseed(&mut self) {
        if let Some(seed) = self.config.seed {
            self.rng = StdRng::seed_from_u64(seed);
        }
    }

    /// Recompute `display` from `truth` if the schedule says so. Returns true if refreshed.
    pub fn refresh(&mut self, truth: &ProcessVariables, tick_count: u64, display: &mut ProcessVariables) -> bool {
        if !self.config.enabled {
            *display = *truth;
            return true;
        }
        if tick_count % self.config.decimation.max(1) != 0 {
            return false;
        }

        let m = &self.config.magnitudes;
        let rng = &mut self.rng;
        let mut jitter = |value: f64, magnitude: f64| value + (rng.gen::<f64>() - 0.5) * magnitude;

        *display = ProcessVariables {
            reactivity: jitter(truth.reactivity, m.reactivity),
            core_temp: jitter(truth.core_temp, m.core_temp),
            primary_flow: jitter(truth.primary_flow, m.primary_flow).max(0.0),
            feedwater_flow: jitter(truth.feedwater_flow, m.feedwater_flow).max(0.0),
            sg_level: jitter(truth.sg_level, m.sg_level).max(0.0),
            steam_pressure: jitter(truth.steam_pressure, m.steam_pressure),
            turbine_speed: jitter(truth.turbine_speed, m.turbine_speed).max(0.0),
        };
        true
    }
}

impl std::fmt::Debug for DisplayNoise {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisplayNoise").field("config", &self.config).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> DisplayNoise {
        DisplayNoise::new(NoiseConfig { seed: Some(7), ..NoiseConfig::default() })
    }

    #[test]
    fn disabled_noise_mirrors_truth() {
        let mut noise = DisplayNoise::new(NoiseConfig { enabled: false, ..NoiseConfig::default() });
        let truth = ProcessVariables::default();
        let mut display = ProcessVariables { sg_level: 0.0, ..truth };
        assert!(noise.refresh(&truth, 3, &mut display));
        assert_eq!(display, truth);
    }

    #[test]
    fn noise_is_bounded_and_decimated() {
        let mut noise = seeded();
        let truth = ProcessVariables::default();
        let mut display = truth;

        assert!(!noise.refresh(&truth, 3, &mut display));
        assert_eq!(display, truth);

        for tick in (0..500).step_by(10) {
            assert!(noise.refresh(&truth, tick, &mut display));
            assert!((display.sg_level - truth.sg_level).abs() <= 0.25);
            assert!((display.primary_flow - truth.primary_flow).abs() <= 250.0);
        }
    }

    #[test]
    fn same_seed_same_display() {
        let truth = ProcessVariables::default();
        let (mut a, mut b) = (seeded(), seeded());
        let (mut da, mut db) = (truth, truth);
        for tick in (0..100).step_by(10) {
            a.refresh(&truth, tick, &mut da);
            b.refresh(&truth, tick, &mut db);
            assert_eq!(da, db);
        }
    }
}
