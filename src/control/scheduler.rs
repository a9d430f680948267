//! scheduler.rs
//! Fixed-period control loop: sense → advance models → PID → actuate → record.
//!
//! Phases: `Idle → Initializing → Running → (Stopping | Faulted) → Terminated`.
//!
//! - Cycle 0 seeds the history from one reading; no command is issued.
//! - Stop conditions are checked at the top of every cycle, before sleeping.
//! - Every exit path (normal stop, fault, or dropping the loop mid-run) leaves the
//!   heater commanded to 0 %.

use log::{debug, error, info, warn};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use crate::config::LoopConfig;
use crate::control::{
    controller::PidController,
    pacing::{Clock, PacingConfig},
    state::{CycleRecord, LoopState},
};
use crate::devices::{
    actuator::{Actuator, clip_percent, write_heater_with_retry},
    sensor::TemperatureSensor,
    telemetry::{self, TelemetryPublisher},
};
use crate::error::{ActuatorError, LoopError, LoopResult, SensorError};
use crate::plant::{
    celsius_to_kelvin, energy_balance::EnergyBalanceModel, fopdt::FopdtModel, kelvin_to_celsius,
};
use crate::utils::metrics::{CycleMetrics, TimingSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    Idle,
    Initializing,
    Running,
    Stopping,
    Faulted,
    Terminated,
}

/// Why the loop stopped.
#[derive(Debug)]
pub enum Termination {
    /// `max_cycles` reached.
    Completed,
    /// External shutdown flag observed.
    ShutdownRequested,
    /// The sensor reported itself offline.
    SensorOffline,
    /// Unrecoverable error; the heater was still driven to 0 %.
    Faulted(LoopError),
}

impl Termination {
    pub fn is_fault(&self) -> bool {
        matches!(self, Termination::Faulted(_))
    }

    /// Process exit status: 0 for any normal stop, 1 for a fault.
    pub fn exit_code(&self) -> u8 {
        if self.is_fault() { 1 } else { 0 }
    }
}

#[derive(Debug)]
pub struct LoopOutcome {
    /// `None` only when initialization failed before the first reading.
    pub state: Option<LoopState>,
    pub termination: Termination,
    pub timing: TimingSummary,
}

pub struct ControlLoop<S: TemperatureSensor, A: Actuator, P: TelemetryPublisher> {
    setpoint: f64,
    grace_cycles: u64,
    actuator_retries: u32,
    max_cycles: Option<u64>,
    mirror_indicator: bool,
    pid: PidController,
    energy_balance: EnergyBalanceModel,
    fopdt: FopdtModel,
    pacing: PacingConfig,
    clock: Arc<dyn Clock>,
    sensor: S,
    actuator: A,
    telemetry: P,
    shutdown: Arc<AtomicBool>,
    phase: LoopPhase,
    state: Option<LoopState>,
    metrics: CycleMetrics,
}

impl<S: TemperatureSensor, A: Actuator, P: TelemetryPublisher> ControlLoop<S, A, P> {
    pub fn new(
        config: &LoopConfig,
        sensor: S,
        actuator: A,
        telemetry: P,
        clock: Arc<dyn Clock>,
    ) -> LoopResult<Self> {
        config.validate()?;
        Ok(Self {
            setpoint: config.setpoint_celsius,
            grace_cycles: config.error_tracking_grace_cycles,
            actuator_retries: config.actuator_retries,
            max_cycles: config.max_cycles,
            mirror_indicator: config.mirror_indicator,
            pid: PidController::new(config.controller)?,
            energy_balance: EnergyBalanceModel::new(
                config.plant.energy_balance,
                config.integrator(),
            ),
            fopdt: FopdtModel::new(config.plant.fopdt),
            pacing: config.pacing(),
            clock,
            sensor,
            actuator,
            telemetry,
            shutdown: Arc::new(AtomicBool::new(false)),
            phase: LoopPhase::Idle,
            state: None,
            metrics: CycleMetrics::new(config.target_period_seconds),
        })
    }

    /// Share an existing shutdown flag (e.g. one set by a signal handler).
    pub fn with_shutdown(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown = flag;
        self
    }

    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    /// Drive the loop until a stop condition or fault, then shut down safely.
    pub fn run(mut self) -> LoopOutcome {
        self.set_phase(LoopPhase::Initializing);
        info!(
            "[Loop] start: setpoint={:.2}°C period={:.3}s Kc={} τI={} τD={}",
            self.setpoint,
            self.pacing.period,
            self.pid.params().kc,
            self.pid.params().tau_i,
            self.pid.params().tau_d
        );

        let termination = match self.initialize() {
            Err(e) => Termination::Faulted(e),
            Ok(()) => {
                self.set_phase(LoopPhase::Running);
                loop {
                    if let Some(stop) = self.stop_condition() {
                        break stop;
                    }
                    if let Err(e) = self.step() {
                        break Termination::Faulted(e);
                    }
                }
            }
        };

        self.finish(termination)
    }

    fn set_phase(&mut self, next: LoopPhase) {
        if self.phase != next {
            info!("[Loop] {:?} -> {:?}", self.phase, next);
            self.phase = next;
        }
    }

    /// Cycle 0: one reading seeds every history sequence.
    fn initialize(&mut self) -> LoopResult<()> {
        if !self.sensor.is_online() {
            return Err(SensorError::Unavailable("sensor offline at start".into()).into());
        }
        let started_at = self.clock.now();
        let measured = self.sensor.read()?;
        info!("[Loop] initial temperature {:.2}°C", measured);
        let state = LoopState::seeded(started_at, measured);
        if let Some(record) = state.last_record() {
            self.publish(&record);
        }
        self.state = Some(state);
        Ok(())
    }

    fn stop_condition(&self) -> Option<Termination> {
        if self.shutdown.load(Ordering::SeqCst) {
            return Some(Termination::ShutdownRequested);
        }
        if !self.sensor.is_online() {
            return Some(Termination::SensorOffline);
        }
        match (self.max_cycles, &self.state) {
            (Some(max), Some(state)) if state.cycle_index >= max => Some(Termination::Completed),
            _ => None,
        }
    }

    /// One Running cycle.
    fn step(&mut self) -> LoopResult<()> {
        let state = self.state.as_mut().ok_or(LoopError::MissingHistory { index: 0 })?;
        let index = state.cycle_index + 1;

        // Pace.
        let plan = self
            .pacing
            .plan(self.clock.now(), state.previous_cycle_time, state.drift);
        if let Some(overrun) = plan.overrun() {
            warn!(
                "[Loop] CycleOverrun: cycle {} started {:.4}s late",
                index, overrun
            );
            self.metrics.record_overrun(overrun);
        }
        self.clock.sleep(plan.sleep());
        let now = self.clock.now();
        let dt = now - state.previous_cycle_time;
        state.drift = self.pacing.next_drift(state.drift, dt);
        state.previous_cycle_time = now;
        self.metrics.record_cycle(dt, plan.sleep());

        // Sense.
        let measured = self.sensor.read()?;
        let prior = state.history.last().ok_or(LoopError::MissingHistory {
            index: index as usize,
        })?;

        // Models.
        let energy_balance = kelvin_to_celsius(self.energy_balance.advance(
            celsius_to_kelvin(prior.energy_balance_prediction),
            dt,
            prior.heater_command,
        )?);
        let fopdt = self.fopdt.advance(
            state.history.fopdt_prediction(),
            state.history.heater_command(),
            index as usize,
            dt,
        )?;

        // Control.
        let out = self.pid.compute(
            self.setpoint,
            measured,
            prior.measured_temperature,
            state.integral,
            dt,
        )?;
        state.integral = out.integral;
        let command = clip_percent(out.command);

        // Error folds.
        let errors = &mut state.errors;
        let record = CycleRecord {
            elapsed_time: now - state.started_at,
            measured_temperature: measured,
            heater_command: command,
            energy_balance_prediction: energy_balance,
            fopdt_prediction: fopdt,
            energy_balance_error: errors.energy_balance.accumulate(
                index,
                self.grace_cycles,
                energy_balance,
                measured,
            ),
            fopdt_error: errors
                .fopdt
                .accumulate(index, self.grace_cycles, fopdt, measured),
            setpoint_error: errors
                .setpoint
                .accumulate(index, self.grace_cycles, self.setpoint, measured),
        };
        state.history.push(record);
        state.cycle_index = index;

        debug!(
            "[Loop] cycle={} dt={:.4}s T={:.2}°C Q={:.2}% EB={:.2}°C FOPDT={:.2}°C drift={:.4}s",
            index, dt, measured, command, energy_balance, fopdt, state.drift
        );

        // Actuate.
        write_heater_with_retry(&mut self.actuator, command, self.actuator_retries)?;
        if self.mirror_indicator {
            if let Err(e) = self.actuator.set_indicator(command) {
                warn!("[Loop] indicator write failed at cycle {}: {}", index, e);
            }
        }

        self.publish(&record);
        Ok(())
    }

    fn publish(&self, r: &CycleRecord) {
        let t = &self.telemetry;
        t.publish(telemetry::TOPIC_TEMPERATURE, r.measured_temperature);
        t.publish(telemetry::TOPIC_HEATER, r.heater_command);
        t.publish(telemetry::TOPIC_SETPOINT, self.setpoint);
        t.publish(telemetry::TOPIC_MODEL_ENERGY_BALANCE, r.energy_balance_prediction);
        t.publish(telemetry::TOPIC_MODEL_FOPDT, r.fopdt_prediction);
        t.publish(telemetry::TOPIC_ERROR_ENERGY_BALANCE, r.energy_balance_error);
        t.publish(telemetry::TOPIC_ERROR_FOPDT, r.fopdt_error);
        t.publish(telemetry::TOPIC_ERROR_SETPOINT, r.setpoint_error);
    }

    /// Heater to 0 % (same retry policy), indicator off best effort, then release.
    fn safe_shutdown(&mut self) -> Result<(), ActuatorError> {
        let heater = write_heater_with_retry(&mut self.actuator, 0.0, self.actuator_retries);
        if let Err(e) = self.actuator.set_indicator(0.0) {
            warn!("[Loop] indicator off failed during shutdown: {}", e);
        }
        let release = self.actuator.release();
        heater.and(release)
    }

    fn finish(&mut self, termination: Termination) -> LoopOutcome {
        let mut termination = termination;
        match &termination {
            Termination::Faulted(e) => {
                self.set_phase(LoopPhase::Faulted);
                error!("[Loop] fault: {}", e);
            }
            other => {
                self.set_phase(LoopPhase::Stopping);
                info!("[Loop] stopping: {:?}", other);
            }
        }

        if let Err(e) = self.safe_shutdown() {
            error!("[Loop] safe shutdown failed: {}", e);
            if !termination.is_fault() {
                self.set_phase(LoopPhase::Faulted);
                termination = Termination::Faulted(e.into());
            }
        }
        self.set_phase(LoopPhase::Terminated);

        let cycles = self.state.as_ref().map_or(0, |s| s.cycle_index);
        info!("[Loop] terminated after {} cycles", cycles);
        self.metrics.log_summary();

        LoopOutcome {
            state: self.state.take(),
            termination,
            timing: self.metrics.summary(),
        }
    }
}

impl<S: TemperatureSensor, A: Actuator, P: TelemetryPublisher> Drop for ControlLoop<S, A, P> {
    fn drop(&mut self) {
        if matches!(self.phase, LoopPhase::Idle | LoopPhase::Terminated) {
            return;
        }
        warn!("[Loop] dropped in phase {:?}; forcing heater off", self.phase);
        if let Err(e) = self.actuator.set_heater_percent(0.0) {
            error!("[Loop] heater off on drop failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::pacing::VirtualClock;
    use crate::devices::telemetry::NullPublisher;

    struct Fixed {
        value: f64,
        online: bool,
    }

    impl TemperatureSensor for Fixed {
        fn read(&mut self) -> Result<f64, SensorError> {
            Ok(self.value)
        }

        fn is_online(&self) -> bool {
            self.online
        }
    }

    #[derive(Default)]
    struct Recorder {
        heater: Vec<f64>,
        released: bool,
    }

    impl Actuator for Recorder {
        fn set_heater_percent(&mut self, percent: f64) -> Result<(), ActuatorError> {
            self.heater.push(percent);
            Ok(())
        }

        fn set_indicator(&mut self, _percent: f64) -> Result<(), ActuatorError> {
            Ok(())
        }

        fn release(&mut self) -> Result<(), ActuatorError> {
            self.released = true;
            Ok(())
        }
    }

    impl Actuator for &mut Recorder {
        fn set_heater_percent(&mut self, percent: f64) -> Result<(), ActuatorError> {
            (**self).set_heater_percent(percent)
        }

        fn set_indicator(&mut self, percent: f64) -> Result<(), ActuatorError> {
            (**self).set_indicator(percent)
        }

        fn release(&mut self) -> Result<(), ActuatorError> {
            (**self).release()
        }
    }

    fn config(max_cycles: u64) -> LoopConfig {
        LoopConfig {
            max_cycles: Some(max_cycles),
            ..LoopConfig::default()
        }
    }

    #[test]
    fn runs_to_max_cycles_and_switches_heater_off() {
        let mut act = Recorder::default();
        let ctl = ControlLoop::new(
            &config(5),
            Fixed { value: 23.0, online: true },
            &mut act,
            NullPublisher,
            Arc::new(VirtualClock::new()),
        )
        .unwrap();
        let outcome = ctl.run();
        assert!(matches!(outcome.termination, Termination::Completed));
        assert_eq!(outcome.termination.exit_code(), 0);
        let state = outcome.state.unwrap();
        assert_eq!(state.cycle_index, 5);
        assert_eq!(state.history.len(), 6);
        assert_eq!(outcome.timing.cycles, 5);
        assert_eq!(act.heater.len(), 6);
        assert_eq!(act.heater.last(), Some(&0.0));
        assert!(act.released);
    }

    #[test]
    fn offline_at_start_faults_without_reading() {
        let mut act = Recorder::default();
        let ctl = ControlLoop::new(
            &config(5),
            Fixed { value: 23.0, online: false },
            &mut act,
            NullPublisher,
            Arc::new(VirtualClock::new()),
        )
        .unwrap();
        let outcome = ctl.run();
        assert!(outcome.termination.is_fault());
        assert!(outcome.state.is_none());
        assert_eq!(act.heater, vec![0.0]);
    }

    #[test]
    fn preset_shutdown_flag_stops_before_first_cycle() {
        let mut act = Recorder::default();
        let ctl = ControlLoop::new(
            &config(5),
            Fixed { value: 23.0, online: true },
            &mut act,
            NullPublisher,
            Arc::new(VirtualClock::new()),
        )
        .unwrap();
        ctl.shutdown_handle().store(true, Ordering::SeqCst);
        let outcome = ctl.run();
        assert!(matches!(outcome.termination, Termination::ShutdownRequested));
        assert_eq!(outcome.state.unwrap().history.len(), 1);
    }

    #[test]
    fn drop_before_termination_forces_heater_off() {
        let mut act = Recorder::default();
        {
            let mut ctl = ControlLoop::new(
                &config(5),
                Fixed { value: 23.0, online: true },
                &mut act,
                NullPublisher,
                Arc::new(VirtualClock::new()),
            )
            .unwrap();
            ctl.set_phase(LoopPhase::Running);
        }
        assert_eq!(act.heater, vec![0.0]);
    }

    #[test]
    fn invalid_config_rejected_at_construction() {
        let mut cfg = config(1);
        cfg.target_period_seconds = 0.0;
        let built = ControlLoop::new(
            &cfg,
            Fixed { value: 23.0, online: true },
            Recorder::default(),
            NullPublisher,
            Arc::new(VirtualClock::new()),
        );
        assert!(built.is_err());
    }
}
