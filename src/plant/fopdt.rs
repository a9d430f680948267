//! fopdt.rs
//! Linear discrete first-order-plus-dead-time model.
//!
//! next = (prev − Tss)·z + (Q[k − θP − 1] − Qss)·(1 − z)·Kp + Tss, with z = exp(−dt/τP).
//! The dead-time lookup clamps to the first recorded command, so the model needs
//! random access to the whole command history.

use crate::error::{LoopError, LoopResult};
use crate::plant::FopdtParameters;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FopdtModel {
    params: FopdtParameters,
}

impl FopdtModel {
    pub fn new(params: FopdtParameters) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &FopdtParameters {
        &self.params
    }

    /// History index of the command seen by cycle `current_index` after the dead time.
    #[inline]
    pub fn delayed_index(&self, current_index: usize) -> usize {
        current_index.saturating_sub(self.params.dead_time_cycles + 1)
    }

    /// Predicted temperature (°C) for cycle `current_index`.
    ///
    /// `predictions[current_index - 1]` is the prior prediction; the heater command is
    /// looked up `θP + 1` cycles back in `commands`.
    pub fn advance(
        &self,
        predictions: &[f64],
        commands: &[f64],
        current_index: usize,
        dt: f64,
    ) -> LoopResult<f64> {
        if dt.is_nan() || dt < 0.0 {
            return Err(LoopError::InvalidTimestep { dt });
        }
        let prior = current_index
            .checked_sub(1)
            .and_then(|i| predictions.get(i))
            .copied()
            .ok_or(LoopError::MissingHistory {
                index: current_index,
            })?;
        let delayed = commands
            .get(self.delayed_index(current_index))
            .copied()
            .ok_or(LoopError::MissingHistory {
                index: current_index,
            })?;

        let p = &self.params;
        let z = (-dt / p.time_constant).exp();
        Ok((prior - p.steady_state_celsius) * z
            + (delayed - p.steady_state_heater) * (1.0 - z) * p.gain
            + p.steady_state_celsius)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> FopdtModel {
        FopdtModel::new(FopdtParameters::default())
    }

    #[test]
    fn zero_dt_holds_prior_prediction() {
        let m = model();
        let preds = [23.0, 27.5];
        let cmds = [0.0, 80.0];
        assert_eq!(m.advance(&preds, &cmds, 2, 0.0).unwrap(), 27.5);
    }

    #[test]
    fn huge_dt_reaches_steady_state_gain() {
        let m = model();
        let preds = [23.0, 40.0];
        let cmds = [50.0, 50.0];
        let next = m.advance(&preds, &cmds, 2, 1e9).unwrap();
        let expected = 23.0 + (50.0 - 0.0) * 0.9;
        assert!((next - expected).abs() < 1e-9);
    }

    #[test]
    fn dead_time_clamps_to_first_sample() {
        let m = model();
        assert_eq!(m.delayed_index(3), 0);
        assert_eq!(m.delayed_index(16), 0);
        assert_eq!(m.delayed_index(17), 1);
    }

    #[test]
    fn uses_delayed_command_not_latest() {
        let mut params = FopdtParameters::default();
        params.dead_time_cycles = 1;
        let m = FopdtModel::new(params);
        let preds = [23.0, 23.0, 23.0];
        // Index 3 looks back to command[1].
        let cmds = [0.0, 100.0, 0.0];
        let next = m.advance(&preds, &cmds, 3, 1.0).unwrap();
        assert!(next > 23.0);
        let cmds = [100.0, 0.0, 100.0];
        assert_eq!(m.advance(&preds, &cmds, 3, 1.0).unwrap(), 23.0);
    }

    #[test]
    fn missing_history_is_an_error() {
        let m = model();
        assert!(matches!(
            m.advance(&[], &[], 0, 1.0),
            Err(LoopError::MissingHistory { index: 0 })
        ));
        assert!(matches!(
            m.advance(&[23.0], &[], 1, 1.0),
            Err(LoopError::MissingHistory { index: 1 })
        ));
    }

    #[test]
    fn negative_dt_rejected() {
        assert!(model().advance(&[23.0], &[0.0], 1, -1.0).is_err());
    }
}
