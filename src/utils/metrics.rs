//! metrics.rs
//! Cycle timing statistics for one run of the control loop.
//!
//! Records measured cycle lengths, planned sleeps, and overruns. Running statistics come
//! from `average` so nothing per-cycle is retained.

use average::{Estimate, Max, Variance};
use log::info;

#[derive(Debug, Clone)]
pub struct CycleMetrics {
    period: f64,
    cycle_length: Variance,
    sleep: Variance,
    worst_overrun: Max,
    overruns: u64,
}

/// Snapshot of [`CycleMetrics`] for reporting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingSummary {
    pub cycles: u64,
    pub mean_cycle: f64,
    pub cycle_std_dev: f64,
    pub mean_sleep: f64,
    pub overruns: u64,
    /// Largest overrun seen (s); 0 when every cycle was on time.
    pub worst_overrun: f64,
}

impl CycleMetrics {
    pub fn new(period: f64) -> Self {
        Self {
            period,
            cycle_length: Variance::new(),
            sleep: Variance::new(),
            worst_overrun: Max::new(),
            overruns: 0,
        }
    }

    pub fn record_cycle(&mut self, dt: f64, planned_sleep: f64) {
        self.cycle_length.add(dt);
        self.sleep.add(planned_sleep);
    }

    pub fn record_overrun(&mut self, overrun: f64) {
        self.overruns += 1;
        self.worst_overrun.add(overrun);
    }

    pub fn cycles(&self) -> u64 {
        self.cycle_length.len()
    }

    pub fn summary(&self) -> TimingSummary {
        let cycles = self.cycles();
        let (mean_cycle, cycle_std_dev, mean_sleep) = if cycles == 0 {
            (0.0, 0.0, 0.0)
        } else {
            let std_dev = if cycles > 1 {
                self.cycle_length.sample_variance().sqrt()
            } else {
                0.0
            };
            (self.cycle_length.mean(), std_dev, self.sleep.mean())
        };
        TimingSummary {
            cycles,
            mean_cycle,
            cycle_std_dev,
            mean_sleep,
            overruns: self.overruns,
            worst_overrun: if self.overruns == 0 {
                0.0
            } else {
                self.worst_overrun.max()
            },
        }
    }

    pub fn log_summary(&self) {
        let s = self.summary();
        info!(
            "[Timing] cycles={} period={:.3}s mean_dt={:.4}s std_dt={:.5}s mean_sleep={:.4}s overruns={} worst_overrun={:.4}s",
            s.cycles,
            self.period,
            s.mean_cycle,
            s.cycle_std_dev,
            s.mean_sleep,
            s.overruns,
            s.worst_overrun
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_metrics_summarize_to_zero() {
        let s = CycleMetrics::new(1.0).summary();
        assert_eq!(s.cycles, 0);
        assert_eq!(s.mean_cycle, 0.0);
        assert_eq!(s.worst_overrun, 0.0);
    }

    #[test]
    fn summary_tracks_mean_and_worst_overrun() {
        let mut m = CycleMetrics::new(1.0);
        m.record_cycle(1.0, 0.9);
        m.record_cycle(1.3, 0.0001);
        m.record_overrun(0.3);
        m.record_cycle(0.7, 0.6);
        m.record_overrun(0.1);
        let s = m.summary();
        assert_eq!(s.cycles, 3);
        assert!((s.mean_cycle - 1.0).abs() < 1e-12);
        assert!((s.cycle_std_dev - 0.3).abs() < 1e-12);
        assert_eq!(s.overruns, 2);
        assert_eq!(s.worst_overrun, 0.3);
    }
}
