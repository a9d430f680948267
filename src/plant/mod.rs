// Plant models: predictive thermal models run alongside the real sensor.
// The nonlinear energy balance is integrated numerically; the FOPDT model is a
// closed-form discrete recurrence with a dead-time lookup into command history.

pub mod energy_balance;
pub mod fopdt;
pub mod integrator;

use serde::{Deserialize, Serialize};

use crate::error::{LoopError, LoopResult};

pub const KELVIN_OFFSET: f64 = 273.15;

#[inline]
pub fn celsius_to_kelvin(c: f64) -> f64 {
    c + KELVIN_OFFSET
}

#[inline]
pub fn kelvin_to_celsius(k: f64) -> f64 {
    k - KELVIN_OFFSET
}

/// Physical constants of the heater/sensor assembly (first-principles model).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnergyBalanceParameters {
    /// Ambient temperature (°C).
    pub ambient_celsius: f64,
    /// Convective heat-transfer coefficient U (W/m²K).
    pub heat_transfer_coefficient: f64,
    /// Mass (kg).
    pub mass: f64,
    /// Specific heat capacity Cp (J/kgK).
    pub specific_heat: f64,
    /// Exposed surface area (m²).
    pub surface_area: f64,
    /// Heater power per percent of output, α (W/%).
    pub heater_coefficient: f64,
    /// Surface emissivity ε.
    pub emissivity: f64,
    /// Stefan–Boltzmann constant σ (W/m²K⁴).
    pub stefan_boltzmann: f64,
}

impl Default for EnergyBalanceParameters {
    fn default() -> Self {
        Self {
            ambient_celsius: 23.0,
            heat_transfer_coefficient: 10.0,
            mass: 4.0 / 1000.0,
            specific_heat: 0.5 * 1000.0,
            surface_area: 12.0 / 100.0_f64.powi(2),
            heater_coefficient: 0.01,
            emissivity: 0.9,
            stefan_boltzmann: 5.67e-8,
        }
    }
}

/// Identified first-order-plus-dead-time constants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FopdtParameters {
    /// Steady-state gain Kp (°C per %).
    pub gain: f64,
    /// Time constant τP (s).
    pub time_constant: f64,
    /// Dead time θP in whole cycles.
    pub dead_time_cycles: usize,
    /// Steady-state temperature Tss (°C).
    pub steady_state_celsius: f64,
    /// Steady-state heater level Qss (%).
    pub steady_state_heater: f64,
}

impl Default for FopdtParameters {
    fn default() -> Self {
        Self {
            gain: 0.9,
            time_constant: 175.0,
            dead_time_cycles: 15,
            steady_state_celsius: 23.0,
            steady_state_heater: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlantParameters {
    pub energy_balance: EnergyBalanceParameters,
    pub fopdt: FopdtParameters,
}

impl PlantParameters {
    pub fn validate(&self) -> LoopResult<()> {
        let eb = &self.energy_balance;
        if eb.mass <= 0.0 || eb.specific_heat <= 0.0 {
            return Err(LoopError::config("mass and specific_heat must be positive"));
        }
        if eb.surface_area <= 0.0 {
            return Err(LoopError::config("surface_area must be positive"));
        }
        if !(0.0..=1.0).contains(&eb.emissivity) {
            return Err(LoopError::config("emissivity must lie in [0, 1]"));
        }
        if celsius_to_kelvin(eb.ambient_celsius) <= 0.0 {
            return Err(LoopError::config("ambient temperature below absolute zero"));
        }
        if self.fopdt.time_constant <= 0.0 {
            return Err(LoopError::config("fopdt time_constant must be positive"));
        }
        Ok(())
    }
}
