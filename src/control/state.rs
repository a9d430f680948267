//! state.rs
//! Loop-owned mutable state: cycle bookkeeping plus an append-only history table.
//!
//! Every sequence in [`History`] grows by exactly one entry per completed cycle, so all
//! columns stay the same length and are indexed by cycle index.

use serde::Serialize;

/// One completed cycle, appended to [`History`] as a row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CycleRecord {
    pub elapsed_time: f64,
    pub measured_temperature: f64,
    pub heater_command: f64,
    pub energy_balance_prediction: f64,
    pub fopdt_prediction: f64,
    pub energy_balance_error: f64,
    pub fopdt_error: f64,
    pub setpoint_error: f64,
}

/// Parallel per-cycle sequences. Only [`History::push`] mutates them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct History {
    elapsed_time: Vec<f64>,
    measured_temperature: Vec<f64>,
    heater_command: Vec<f64>,
    energy_balance_prediction: Vec<f64>,
    fopdt_prediction: Vec<f64>,
    energy_balance_error: Vec<f64>,
    fopdt_error: Vec<f64>,
    setpoint_error: Vec<f64>,
}

impl History {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            elapsed_time: Vec::with_capacity(capacity),
            measured_temperature: Vec::with_capacity(capacity),
            heater_command: Vec::with_capacity(capacity),
            energy_balance_prediction: Vec::with_capacity(capacity),
            fopdt_prediction: Vec::with_capacity(capacity),
            energy_balance_error: Vec::with_capacity(capacity),
            fopdt_error: Vec::with_capacity(capacity),
            setpoint_error: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, record: CycleRecord) {
        self.elapsed_time.push(record.elapsed_time);
        self.measured_temperature.push(record.measured_temperature);
        self.heater_command.push(record.heater_command);
        self.energy_balance_prediction
            .push(record.energy_balance_prediction);
        self.fopdt_prediction.push(record.fopdt_prediction);
        self.energy_balance_error.push(record.energy_balance_error);
        self.fopdt_error.push(record.fopdt_error);
        self.setpoint_error.push(record.setpoint_error);
    }

    pub fn len(&self) -> usize {
        self.elapsed_time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elapsed_time.is_empty()
    }

    pub fn record(&self, index: usize) -> Option<CycleRecord> {
        Some(CycleRecord {
            elapsed_time: *self.elapsed_time.get(index)?,
            measured_temperature: *self.measured_temperature.get(index)?,
            heater_command: *self.heater_command.get(index)?,
            energy_balance_prediction: *self.energy_balance_prediction.get(index)?,
            fopdt_prediction: *self.fopdt_prediction.get(index)?,
            energy_balance_error: *self.energy_balance_error.get(index)?,
            fopdt_error: *self.fopdt_error.get(index)?,
            setpoint_error: *self.setpoint_error.get(index)?,
        })
    }

    pub fn last(&self) -> Option<CycleRecord> {
        self.len().checked_sub(1).and_then(|i| self.record(i))
    }

    pub fn records(&self) -> impl Iterator<Item = CycleRecord> + '_ {
        (0..self.len()).filter_map(|i| self.record(i))
    }

    pub fn elapsed_time(&self) -> &[f64] {
        &self.elapsed_time
    }

    pub fn measured_temperature(&self) -> &[f64] {
        &self.measured_temperature
    }

    pub fn heater_command(&self) -> &[f64] {
        &self.heater_command
    }

    pub fn energy_balance_prediction(&self) -> &[f64] {
        &self.energy_balance_prediction
    }

    pub fn fopdt_prediction(&self) -> &[f64] {
        &self.fopdt_prediction
    }

    pub fn energy_balance_error(&self) -> &[f64] {
        &self.energy_balance_error
    }

    pub fn fopdt_error(&self) -> &[f64] {
        &self.fopdt_error
    }

    pub fn setpoint_error(&self) -> &[f64] {
        &self.setpoint_error
    }
}

/// Running sum of absolute tracking error with a settling grace period.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CumulativeError {
    total: f64,
}

impl CumulativeError {
    /// Fold one sample in and return the running total. Cycles before `grace_cycles`
    /// contribute nothing.
    pub fn accumulate(
        &mut self,
        cycle_index: u64,
        grace_cycles: u64,
        reference: f64,
        measured: f64,
    ) -> f64 {
        if cycle_index >= grace_cycles {
            self.total += (reference - measured).abs();
        }
        self.total
    }

    pub fn total(&self) -> f64 {
        self.total
    }
}

/// The three independent error folds tracked per cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrackingErrors {
    pub energy_balance: CumulativeError,
    pub fopdt: CumulativeError,
    pub setpoint: CumulativeError,
}

/// Scheduler-owned record of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopState {
    /// Index of the last completed cycle (cycle 0 is initialization).
    pub cycle_index: u64,
    /// Clock reading when the loop started.
    pub started_at: f64,
    /// Clock reading at the previous cycle boundary.
    pub previous_cycle_time: f64,
    /// Accumulated scheduling drift (s).
    pub drift: f64,
    /// PID integral accumulator carried between cycles.
    pub integral: f64,
    pub errors: TrackingErrors,
    pub history: History,
}

impl LoopState {
    /// State after cycle 0: every sequence seeded from the first measurement.
    pub fn seeded(started_at: f64, measured: f64) -> Self {
        let mut history = History::with_capacity(1024);
        history.push(CycleRecord {
            elapsed_time: 0.0,
            measured_temperature: measured,
            heater_command: 0.0,
            energy_balance_prediction: measured,
            fopdt_prediction: measured,
            energy_balance_error: 0.0,
            fopdt_error: 0.0,
            setpoint_error: 0.0,
        });
        Self {
            cycle_index: 0,
            started_at,
            previous_cycle_time: started_at,
            drift: 0.0,
            integral: 0.0,
            errors: TrackingErrors::default(),
            history,
        }
    }

    pub fn last_record(&self) -> Option<CycleRecord> {
        self.history.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_state_has_one_row() {
        let s = LoopState::seeded(5.0, 22.5);
        assert_eq!(s.history.len(), 1);
        let r = s.last_record().unwrap();
        assert_eq!(r.measured_temperature, 22.5);
        assert_eq!(r.energy_balance_prediction, 22.5);
        assert_eq!(r.fopdt_prediction, 22.5);
        assert_eq!(r.heater_command, 0.0);
        assert_eq!(r.setpoint_error, 0.0);
        assert_eq!(s.previous_cycle_time, 5.0);
    }

    #[test]
    fn push_keeps_columns_aligned() {
        let mut h = History::default();
        for i in 0..5 {
            h.push(CycleRecord {
                elapsed_time: i as f64,
                measured_temperature: 20.0 + i as f64,
                heater_command: 10.0 * i as f64,
                energy_balance_prediction: 0.0,
                fopdt_prediction: 0.0,
                energy_balance_error: 0.0,
                fopdt_error: 0.0,
                setpoint_error: 0.0,
            });
        }
        assert_eq!(h.len(), 5);
        assert_eq!(h.heater_command().len(), 5);
        assert_eq!(h.setpoint_error().len(), 5);
        assert_eq!(h.record(3).unwrap().measured_temperature, 23.0);
        assert!(h.record(5).is_none());
        assert_eq!(h.records().count(), 5);
    }

    #[test]
    fn grace_period_contributes_nothing() {
        let mut e = CumulativeError::default();
        for k in 0..10 {
            assert_eq!(e.accumulate(k, 10, 30.0, 25.0), 0.0);
        }
        assert_eq!(e.accumulate(10, 10, 30.0, 25.0), 5.0);
        assert_eq!(e.accumulate(11, 10, 20.0, 25.0), 10.0);
    }
}
