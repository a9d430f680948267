//! simulated.rs
//! Simulated heater/sensor pair for running the loop without hardware.
//!
//! The "true" plant follows the energy-balance law (optionally with a mismatched
//! heat-transfer coefficient so the predictive models have something to track),
//! integrated up to the shared clock's current time on every access. Readings carry
//! uniform noise, the same way the sensor simulators add jitter around a base value.

use log::debug;
use parking_lot::Mutex;
use rand::random_range;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::control::pacing::Clock;
use crate::devices::{actuator::Actuator, actuator::clip_percent, sensor::TemperatureSensor};
use crate::error::{ActuatorError, LoopResult, SensorError};
use crate::plant::{
    EnergyBalanceParameters, celsius_to_kelvin, energy_balance::EnergyBalanceModel,
    integrator::Rk4, kelvin_to_celsius,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Starting plant temperature; ambient when unset.
    pub initial_celsius: Option<f64>,
    /// Half-width of the uniform measurement noise (°C).
    pub noise_amplitude_celsius: f64,
    /// Multiplier on U for the simulated plant.
    pub heat_transfer_scale: f64,
    /// Sensor reports offline after this many successful reads.
    pub offline_after_reads: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            initial_celsius: None,
            noise_amplitude_celsius: 0.1,
            heat_transfer_scale: 1.1,
            offline_after_reads: None,
        }
    }
}

struct PlantSim {
    model: EnergyBalanceModel,
    temperature_kelvin: f64,
    heater_percent: f64,
    indicator_percent: f64,
    updated_at: f64,
    reads: u64,
    released: bool,
}

impl PlantSim {
    fn catch_up(&mut self, now: f64) -> LoopResult<()> {
        let dt = now - self.updated_at;
        if dt > 0.0 {
            self.temperature_kelvin =
                self.model
                    .advance(self.temperature_kelvin, dt, self.heater_percent)?;
            self.updated_at = now;
        }
        Ok(())
    }
}

/// Handle shared by [`SimulatedSensor`] and [`SimulatedHeater`].
#[derive(Clone)]
pub struct SimulatedPlant {
    inner: Arc<Mutex<PlantSim>>,
    clock: Arc<dyn Clock>,
    config: SimulationConfig,
}

impl SimulatedPlant {
    pub fn new(
        params: EnergyBalanceParameters,
        config: SimulationConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let mut true_params = params;
        true_params.heat_transfer_coefficient *= config.heat_transfer_scale;
        let initial = config.initial_celsius.unwrap_or(params.ambient_celsius);
        let sim = PlantSim {
            model: EnergyBalanceModel::new(true_params, Rk4::default()),
            temperature_kelvin: celsius_to_kelvin(initial),
            heater_percent: 0.0,
            indicator_percent: 0.0,
            updated_at: clock.now(),
            reads: 0,
            released: false,
        };
        Self {
            inner: Arc::new(Mutex::new(sim)),
            clock,
            config,
        }
    }

    pub fn sensor(&self) -> SimulatedSensor {
        SimulatedSensor {
            plant: self.clone(),
        }
    }

    pub fn heater(&self) -> SimulatedHeater {
        SimulatedHeater {
            plant: self.clone(),
        }
    }

    /// Noise-free plant temperature (°C) at the current clock time.
    pub fn true_temperature(&self) -> LoopResult<f64> {
        let mut sim = self.inner.lock();
        sim.catch_up(self.clock.now())?;
        Ok(kelvin_to_celsius(sim.temperature_kelvin))
    }

    pub fn heater_percent(&self) -> f64 {
        self.inner.lock().heater_percent
    }

    pub fn indicator_percent(&self) -> f64 {
        self.inner.lock().indicator_percent
    }

    pub fn is_released(&self) -> bool {
        self.inner.lock().released
    }
}

pub struct SimulatedSensor {
    plant: SimulatedPlant,
}

impl TemperatureSensor for SimulatedSensor {
    fn read(&mut self) -> Result<f64, SensorError> {
        let now = self.plant.clock.now();
        let mut sim = self.plant.inner.lock();
        sim.catch_up(now)
            .map_err(|e| SensorError::Unavailable(e.to_string()))?;
        sim.reads += 1;
        let a = self.plant.config.noise_amplitude_celsius;
        let noise = if a > 0.0 { random_range(-a..a) } else { 0.0 };
        Ok(kelvin_to_celsius(sim.temperature_kelvin) + noise)
    }

    fn is_online(&self) -> bool {
        let sim = self.plant.inner.lock();
        match self.plant.config.offline_after_reads {
            Some(limit) => sim.reads < limit,
            None => true,
        }
    }
}

pub struct SimulatedHeater {
    plant: SimulatedPlant,
}

impl Actuator for SimulatedHeater {
    fn set_heater_percent(&mut self, percent: f64) -> Result<(), ActuatorError> {
        let now = self.plant.clock.now();
        let mut sim = self.plant.inner.lock();
        if sim.released {
            return Err(ActuatorError::Write("heater released".into()));
        }
        // Integrate the old level up to now before switching (zero-order hold).
        sim.catch_up(now)
            .map_err(|e| ActuatorError::Write(e.to_string()))?;
        sim.heater_percent = clip_percent(percent);
        debug!("[SimHeater] Q1 = {:.2}%", sim.heater_percent);
        Ok(())
    }

    fn set_indicator(&mut self, percent: f64) -> Result<(), ActuatorError> {
        self.plant.inner.lock().indicator_percent = clip_percent(percent);
        Ok(())
    }

    fn release(&mut self) -> Result<(), ActuatorError> {
        let now = self.plant.clock.now();
        let mut sim = self.plant.inner.lock();
        sim.catch_up(now)
            .map_err(|e| ActuatorError::Write(e.to_string()))?;
        sim.heater_percent = 0.0;
        sim.indicator_percent = 0.0;
        sim.released = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::pacing::VirtualClock;

    fn plant(clock: &VirtualClock, config: SimulationConfig) -> SimulatedPlant {
        SimulatedPlant::new(
            EnergyBalanceParameters::default(),
            config,
            Arc::new(clock.clone()),
        )
    }

    fn quiet() -> SimulationConfig {
        SimulationConfig {
            noise_amplitude_celsius: 0.0,
            ..SimulationConfig::default()
        }
    }

    #[test]
    fn idle_plant_stays_at_ambient() {
        let clock = VirtualClock::new();
        let p = plant(&clock, quiet());
        let mut sensor = p.sensor();
        clock.advance(60.0);
        assert!((sensor.read().unwrap() - 23.0).abs() < 1e-9);
    }

    #[test]
    fn heater_warms_plant_over_time() {
        let clock = VirtualClock::new();
        let p = plant(&clock, quiet());
        let mut heater = p.heater();
        heater.set_heater_percent(100.0).unwrap();
        clock.advance(120.0);
        assert!(p.true_temperature().unwrap() > 40.0);
    }

    #[test]
    fn noise_stays_within_amplitude() {
        let clock = VirtualClock::new();
        let p = plant(&clock, SimulationConfig {
            noise_amplitude_celsius: 0.2,
            ..quiet()
        });
        let mut sensor = p.sensor();
        for _ in 0..100 {
            let t = sensor.read().unwrap();
            assert!((t - 23.0).abs() <= 0.2);
        }
    }

    #[test]
    fn goes_offline_after_configured_reads() {
        let clock = VirtualClock::new();
        let p = plant(&clock, SimulationConfig {
            offline_after_reads: Some(2),
            ..quiet()
        });
        let mut sensor = p.sensor();
        assert!(sensor.is_online());
        sensor.read().unwrap();
        sensor.read().unwrap();
        assert!(!sensor.is_online());
    }

    #[test]
    fn release_switches_outputs_off() {
        let clock = VirtualClock::new();
        let p = plant(&clock, quiet());
        let mut heater = p.heater();
        heater.set_heater_percent(70.0).unwrap();
        heater.set_indicator(70.0).unwrap();
        heater.release().unwrap();
        assert_eq!(p.heater_percent(), 0.0);
        assert_eq!(p.indicator_percent(), 0.0);
        assert!(p.is_released());
        assert!(heater.set_heater_percent(10.0).is_err());
    }
}
