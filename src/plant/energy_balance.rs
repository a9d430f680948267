//! energy_balance.rs
//! Nonlinear first-principles heater model.
//!
//! dT/dt = (U·A·(Ta − T) + ε·σ·A·(Ta⁴ − T⁴) + α·Q) / (m·Cp), temperatures in Kelvin,
//! Q the heater output in percent. Advanced one cycle at a time with RK4.

use crate::error::{LoopError, LoopResult};
use crate::plant::integrator::{Rk4, ScalarOde};
use crate::plant::{EnergyBalanceParameters, celsius_to_kelvin};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyBalanceModel {
    params: EnergyBalanceParameters,
    ambient_kelvin: f64,
    integrator: Rk4,
}

/// The ODE with the heater level held constant over one cycle (zero-order hold).
struct HeldInput<'a> {
    model: &'a EnergyBalanceModel,
    heater_percent: f64,
}

impl ScalarOde for HeldInput<'_> {
    fn rhs(&self, _t: f64, y: f64) -> f64 {
        self.model.derivative(y, self.heater_percent)
    }
}

impl EnergyBalanceModel {
    pub fn new(params: EnergyBalanceParameters, integrator: Rk4) -> Self {
        Self {
            ambient_kelvin: celsius_to_kelvin(params.ambient_celsius),
            params,
            integrator,
        }
    }

    pub fn params(&self) -> &EnergyBalanceParameters {
        &self.params
    }

    pub fn ambient_kelvin(&self) -> f64 {
        self.ambient_kelvin
    }

    /// dT/dt in K/s at temperature `t_kelvin` and heater level `heater_percent`.
    pub fn derivative(&self, t_kelvin: f64, heater_percent: f64) -> f64 {
        let p = &self.params;
        let ta = self.ambient_kelvin;
        let convection = p.heat_transfer_coefficient * p.surface_area * (ta - t_kelvin);
        let radiation =
            p.emissivity * p.stefan_boltzmann * p.surface_area * (ta.powi(4) - t_kelvin.powi(4));
        let heating = p.heater_coefficient * heater_percent;
        (convection + radiation + heating) / (p.mass * p.specific_heat)
    }

    /// Temperature (K) after `dt` seconds with `heater_percent` held constant.
    ///
    /// `dt == 0` returns the input unchanged without touching the integrator;
    /// negative or NaN steps are rejected.
    pub fn advance(
        &self,
        current_temperature_kelvin: f64,
        dt: f64,
        heater_percent: f64,
    ) -> LoopResult<f64> {
        if dt == 0.0 {
            return Ok(current_temperature_kelvin);
        }
        if !(dt > 0.0) {
            return Err(LoopError::InvalidTimestep { dt });
        }
        let ode = HeldInput {
            model: self,
            heater_percent,
        };
        Ok(self.integrator.integrate(&ode, current_temperature_kelvin, dt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plant::kelvin_to_celsius;

    fn model() -> EnergyBalanceModel {
        EnergyBalanceModel::new(EnergyBalanceParameters::default(), Rk4::default())
    }

    #[test]
    fn steady_state_at_ambient_without_heat() {
        let m = model();
        assert_eq!(m.derivative(m.ambient_kelvin(), 0.0), 0.0);
    }

    #[test]
    fn zero_dt_is_identity() {
        let m = model();
        for q in [0.0, 35.0, 100.0] {
            assert_eq!(m.advance(310.0, 0.0, q).unwrap(), 310.0);
        }
    }

    #[test]
    fn negative_dt_rejected() {
        assert!(matches!(
            model().advance(300.0, -0.5, 10.0),
            Err(LoopError::InvalidTimestep { .. })
        ));
    }

    #[test]
    fn full_heater_warms_and_idle_cools() {
        let m = model();
        let ta = m.ambient_kelvin();
        assert!(m.advance(ta, 1.0, 100.0).unwrap() > ta);
        assert!(m.advance(ta + 20.0, 1.0, 0.0).unwrap() < ta + 20.0);
    }

    #[test]
    fn full_heater_steady_state_is_plausible() {
        // Time constant is ~100 s; 2000 cycles at 100 % sit at equilibrium.
        let m = model();
        let mut t = m.ambient_kelvin();
        for _ in 0..2_000 {
            t = m.advance(t, 1.0, 100.0).unwrap();
        }
        let c = kelvin_to_celsius(t);
        assert!(c > 60.0 && c < 90.0, "steady state {c} °C");
        assert!(m.derivative(t, 100.0).abs() < 1e-3);
    }
}
