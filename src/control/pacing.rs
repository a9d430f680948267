//! pacing.rs
//! Fixed-period cycle pacing with drift compensation.
//!
//! Drift is the accumulated lateness of cycle boundaries against the fixed schedule
//! `start + k·period`. Each sleep is shortened by the current drift, so a late cycle is
//! paid back by the next one instead of shifting every later cycle. The correction is
//! bounded so a long stall cannot starve the cycles that follow it.
//!
//! The loop wakes `epsilon` before each boundary. After the first cycle the drift sits
//! at `-epsilon` and every sleep covers exactly one period, so boundaries land on
//! `start + k·period - epsilon` and the long-run period is exact.
//!
//! - `SystemClock`: monotonic `Instant` + `SpinSleeper` for sub-millisecond wakeups.
//! - `VirtualClock`: shared virtual time for accelerated runs and deterministic tests.

use parking_lot::Mutex;
use spin_sleep::{SpinSleeper, SpinStrategy};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

/// Monotonic time source shared by the loop and its simulated collaborators.
pub trait Clock: Send + Sync {
    /// Seconds since an arbitrary fixed origin.
    fn now(&self) -> f64;
    /// Block for `seconds` (non-positive values return immediately).
    fn sleep(&self, seconds: f64);
}

pub struct SystemClock {
    origin: Instant,
    sleeper: SpinSleeper,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            sleeper: SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    fn sleep(&self, seconds: f64) {
        if seconds > 0.0 && seconds.is_finite() {
            self.sleeper.sleep(Duration::from_secs_f64(seconds));
        }
    }
}

/// Virtual time: `sleep` advances the shared reading instantly.
///
/// Clones share the same timeline, so a test double can inject latency with
/// [`VirtualClock::advance`] while the loop holds another handle.
#[derive(Clone, Default)]
pub struct VirtualClock {
    now: Arc<Mutex<f64>>,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(t: f64) -> Self {
        Self {
            now: Arc::new(Mutex::new(t)),
        }
    }

    pub fn advance(&self, seconds: f64) {
        if seconds > 0.0 {
            *self.now.lock() += seconds;
        }
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> f64 {
        *self.now.lock()
    }

    fn sleep(&self, seconds: f64) {
        self.advance(seconds);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PacingConfig {
    /// Target cycle period (s).
    pub period: f64,
    /// Minimum sleep; also how early the loop deliberately wakes (s).
    pub epsilon: f64,
    /// Bound on the accumulated drift correction (s).
    pub max_drift: f64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            period: 1.0,
            epsilon: 1e-4,
            max_drift: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SleepPlan {
    /// Enough slack remains in the period.
    OnTime { sleep: f64 },
    /// The previous cycle ran past its deadline by `overrun` seconds; sleep only epsilon.
    Overrun { overrun: f64, sleep: f64 },
}

impl SleepPlan {
    pub fn sleep(&self) -> f64 {
        match *self {
            SleepPlan::OnTime { sleep } | SleepPlan::Overrun { sleep, .. } => sleep,
        }
    }

    pub fn overrun(&self) -> Option<f64> {
        match *self {
            SleepPlan::Overrun { overrun, .. } => Some(overrun),
            SleepPlan::OnTime { .. } => None,
        }
    }
}

impl PacingConfig {
    /// Sleep needed at `now` to hit the next boundary given the accumulated drift.
    pub fn plan(&self, now: f64, previous_cycle_time: f64, drift: f64) -> SleepPlan {
        let desired = self.period - (now - previous_cycle_time) - drift;
        if desired >= self.epsilon {
            SleepPlan::OnTime {
                sleep: desired - self.epsilon,
            }
        } else if desired >= 0.0 {
            // Boundary not yet passed, just too close to shave off a full epsilon.
            SleepPlan::OnTime {
                sleep: self.epsilon,
            }
        } else {
            SleepPlan::Overrun {
                overrun: -desired,
                sleep: self.epsilon,
            }
        }
    }

    /// Fold a measured cycle length into the drift.
    pub fn next_drift(&self, drift: f64, dt: f64) -> f64 {
        (drift + dt - self.period).clamp(-self.max_drift, self.max_drift)
    }
}
