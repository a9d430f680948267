//! controller.rs
//! PID heater controller with anti-reset-windup.
//!
//! The law is stateless: the caller supplies the prior measurement and the integral
//! accumulator and persists the returned accumulator for the next cycle.
//!
//! - Derivative acts on the measurement (no derivative kick on setpoint changes).
//! - When the unclipped command saturates, that cycle's integral update is undone
//!   before the command is clipped to the output bounds.

use serde::{Deserialize, Serialize};

use crate::error::{LoopError, LoopResult, ensure_positive_dt};

/// Controller tuning and output range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerParameters {
    /// Controller gain Kc.
    pub kc: f64,
    /// Integral time constant τI (s).
    pub tau_i: f64,
    /// Derivative time constant τD (s).
    pub tau_d: f64,
    /// Lower output bound.
    pub output_low: f64,
    /// Upper output bound.
    pub output_high: f64,
    /// Output bias op0.
    pub bias: f64,
}

impl Default for ControllerParameters {
    fn default() -> Self {
        Self {
            kc: 10.0,
            tau_i: 50.0,
            tau_d: 1.0,
            output_low: 0.0,
            output_high: 100.0,
            bias: 0.0,
        }
    }
}

impl ControllerParameters {
    pub fn validate(&self) -> LoopResult<()> {
        if !(self.tau_i > 0.0) {
            return Err(LoopError::config("tau_i must be positive"));
        }
        if !(self.tau_d >= 0.0) {
            return Err(LoopError::config("tau_d must be non-negative"));
        }
        if !(self.output_low < self.output_high) {
            return Err(LoopError::config("output_low must be less than output_high"));
        }
        Ok(())
    }

    #[inline]
    pub fn ki(&self) -> f64 {
        self.kc / self.tau_i
    }

    #[inline]
    pub fn kd(&self) -> f64 {
        self.kc * self.tau_d
    }
}

/// One evaluation of the PID law.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidOutput {
    /// Command clipped to `[output_low, output_high]`.
    pub command: f64,
    /// Kc·error.
    pub proportional: f64,
    /// Integral accumulator to carry into the next cycle (after any rollback).
    pub integral: f64,
    /// −Kc·τD·dPV/dt.
    pub derivative: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidController {
    params: ControllerParameters,
}

impl PidController {
    pub fn new(params: ControllerParameters) -> LoopResult<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &ControllerParameters {
        &self.params
    }

    /// Evaluate the law for one cycle.
    pub fn compute(
        &self,
        setpoint: f64,
        measurement: f64,
        prior_measurement: f64,
        integral: f64,
        dt: f64,
    ) -> LoopResult<PidOutput> {
        ensure_positive_dt(dt)?;
        let p = &self.params;

        let error = setpoint - measurement;
        let mut integral_term = integral + p.ki() * error * dt;
        let dpv = (measurement - prior_measurement) / dt;

        let proportional = p.kc * error;
        let derivative = -p.kd() * dpv;
        let mut command = p.bias + proportional + integral_term + derivative;

        // Anti-reset-windup: undo this cycle's integral update. Restoring the carried
        // value instead of subtracting the step keeps the rollback exact in f64.
        if command < p.output_low || command > p.output_high {
            integral_term = integral;
            command = command.clamp(p.output_low, p.output_high);
        }

        Ok(PidOutput {
            command,
            proportional,
            integral: integral_term,
            derivative,
        })
    }
}
