//! config.rs
//! Run configuration: controller tuning, plant constants, pacing, and run options.
//!
//! Every field has a default, so a YAML file only needs the values it changes.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::control::{controller::ControllerParameters, pacing::PacingConfig};
use crate::devices::simulated::SimulationConfig;
use crate::error::{LoopError, LoopResult};
use crate::plant::{PlantParameters, integrator::Rk4};
use crate::utils::export::HistoryFormat;

/// Scheduling of the loop thread.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Request maximum thread priority for the loop thread (best effort).
    pub elevate_priority: bool,
    /// Pin the loop thread to this core id.
    pub pin_core: Option<usize>,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            elevate_priority: true,
            pin_core: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    pub setpoint_celsius: f64,
    pub controller: ControllerParameters,
    pub plant: PlantParameters,
    pub target_period_seconds: f64,
    /// Cycles before cumulative errors start accumulating.
    pub error_tracking_grace_cycles: u64,
    pub sleep_epsilon_seconds: f64,
    pub max_drift_seconds: f64,
    /// Extra heater-write attempts before a failure is fatal.
    pub actuator_retries: u32,
    /// Stop normally after this many cycles (initialization excluded).
    pub max_cycles: Option<u64>,
    /// Drive the indicator output with the heater command.
    pub mirror_indicator: bool,
    pub history_path: Option<PathBuf>,
    pub history_detail: bool,
    pub integrator_max_step_seconds: f64,
    pub simulation: SimulationConfig,
    pub realtime: RealtimeConfig,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            setpoint_celsius: 34.0,
            controller: ControllerParameters::default(),
            plant: PlantParameters::default(),
            target_period_seconds: 1.0,
            error_tracking_grace_cycles: 10,
            sleep_epsilon_seconds: 1e-4,
            max_drift_seconds: 0.5,
            actuator_retries: 1,
            max_cycles: None,
            mirror_indicator: true,
            history_path: None,
            history_detail: false,
            integrator_max_step_seconds: 0.1,
            simulation: SimulationConfig::default(),
            realtime: RealtimeConfig::default(),
        }
    }
}

impl LoopConfig {
    pub fn from_yaml_str(content: &str) -> LoopResult<Self> {
        let config: LoopConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_yaml(path: &Path) -> LoopResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn to_yaml(&self) -> LoopResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn validate(&self) -> LoopResult<()> {
        if !self.setpoint_celsius.is_finite() {
            return Err(LoopError::config("setpoint_celsius must be finite"));
        }
        if !(self.target_period_seconds > 0.0) {
            return Err(LoopError::config("target_period_seconds must be positive"));
        }
        if !(self.sleep_epsilon_seconds > 0.0)
            || self.sleep_epsilon_seconds >= self.target_period_seconds
        {
            return Err(LoopError::config(
                "sleep_epsilon_seconds must lie in (0, target_period_seconds)",
            ));
        }
        if !(self.max_drift_seconds >= 0.0) {
            return Err(LoopError::config("max_drift_seconds must be non-negative"));
        }
        if !(self.integrator_max_step_seconds > 0.0) {
            return Err(LoopError::config("integrator_max_step_seconds must be positive"));
        }
        if !(self.simulation.heat_transfer_scale > 0.0) {
            return Err(LoopError::config("simulation.heat_transfer_scale must be positive"));
        }
        if !(self.simulation.noise_amplitude_celsius >= 0.0) {
            return Err(LoopError::config(
                "simulation.noise_amplitude_celsius must be non-negative",
            ));
        }
        self.controller.validate()?;
        self.plant.validate()?;
        Ok(())
    }

    pub fn pacing(&self) -> PacingConfig {
        PacingConfig {
            period: self.target_period_seconds,
            epsilon: self.sleep_epsilon_seconds,
            max_drift: self.max_drift_seconds,
        }
    }

    pub fn integrator(&self) -> Rk4 {
        Rk4::new(self.integrator_max_step_seconds)
    }

    pub fn history_format(&self) -> HistoryFormat {
        if self.history_detail {
            HistoryFormat::Detailed
        } else {
            HistoryFormat::Minimal
        }
    }
}
