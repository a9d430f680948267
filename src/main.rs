//! # thermal-loop
//!
//! Runs the closed-loop temperature controller against either a line-protocol heater
//! board (serial-over-TCP bridge) or the built-in simulated plant.
//!
//! ## Threads
//! - **control-loop:** the scheduler, spawned at maximum OS priority and optionally
//!   pinned to one core.
//! - **signal:** single-threaded tokio runtime waiting for Ctrl-C; sets the shutdown
//!   flag, which the loop observes at the top of its next cycle.
//! - **telemetry:** drains the bounded telemetry channel and logs samples at debug.
//!
//! ## Exit status
//! - `0` normal stop (cycle limit, Ctrl-C, sensor offline)
//! - `1` faulted run (heater still forced to 0 %)
//! - `2` invalid configuration or device connection failure

use clap::Parser;
use log::{error, info, warn};
use std::{
    path::PathBuf,
    process::ExitCode,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};
use thread_priority::{ThreadBuilderExt, ThreadPriority};

use thermal_rts::{
    ControlLoop, LoopConfig, LoopError, LoopOutcome, LoopResult,
    config::RealtimeConfig,
    control::pacing::{Clock, SystemClock, VirtualClock},
    devices::{
        Actuator, TemperatureSensor, line::LineDevice, simulated::SimulatedPlant,
        telemetry::ChannelPublisher,
    },
    utils::export::export_history,
};

const TELEMETRY_CAPACITY: usize = 1024;

#[derive(Parser)]
#[command(name = "thermal-loop")]
#[command(about = "Fixed-period PID temperature control loop with online model tracking", long_about = None)]
struct Cli {
    /// YAML configuration file; omitted fields keep their defaults
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Target temperature (°C)
    #[arg(long)]
    setpoint: Option<f64>,
    /// Controller gain Kc
    #[arg(long)]
    kc: Option<f64>,
    /// Integral time constant τI (s)
    #[arg(long)]
    tau_i: Option<f64>,
    /// Derivative time constant τD (s)
    #[arg(long)]
    tau_d: Option<f64>,
    /// Cycle period (s)
    #[arg(long)]
    period: Option<f64>,
    /// Cycles before error tracking starts
    #[arg(long)]
    grace: Option<u64>,
    /// Heater board address (host:port); the simulated plant is used when omitted
    #[arg(long)]
    device: Option<String>,
    /// Board read/write timeout in milliseconds
    #[arg(long, default_value_t = 2000)]
    device_timeout_ms: u64,
    /// Run the simulated plant on virtual time (no real sleeping)
    #[arg(long)]
    accelerated: bool,
    /// Stop after this many cycles
    #[arg(long)]
    max_cycles: Option<u64>,
    /// Write the history log to this CSV file on exit
    #[arg(long)]
    history: Option<PathBuf>,
    /// Include model predictions and error series in the history log
    #[arg(long)]
    history_detail: bool,
    /// Pin the loop thread to this core id
    #[arg(long)]
    pin_core: Option<usize>,
    /// Keep the loop thread at normal priority
    #[arg(long)]
    no_priority: bool,
    /// Print the effective configuration as YAML and exit
    #[arg(long)]
    print_config: bool,
}

impl Cli {
    fn load_config(&self) -> LoopResult<LoopConfig> {
        let mut config = match &self.config {
            Some(path) => LoopConfig::load_yaml(path)?,
            None => LoopConfig::default(),
        };
        if let Some(v) = self.setpoint {
            config.setpoint_celsius = v;
        }
        if let Some(v) = self.kc {
            config.controller.kc = v;
        }
        if let Some(v) = self.tau_i {
            config.controller.tau_i = v;
        }
        if let Some(v) = self.tau_d {
            config.controller.tau_d = v;
        }
        if let Some(v) = self.period {
            config.target_period_seconds = v;
        }
        if let Some(v) = self.grace {
            config.error_tracking_grace_cycles = v;
        }
        if self.max_cycles.is_some() {
            config.max_cycles = self.max_cycles;
        }
        if self.history.is_some() {
            config.history_path = self.history.clone();
        }
        if self.history_detail {
            config.history_detail = true;
        }
        if self.pin_core.is_some() {
            config.realtime.pin_core = self.pin_core;
        }
        if self.no_priority {
            config.realtime.elevate_priority = false;
        }
        if self.accelerated && self.device.is_some() {
            return Err(LoopError::InvalidConfig {
                what: "--accelerated only applies to the simulated plant".into(),
            });
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let config = match cli.load_config() {
        Ok(c) => c,
        Err(e) => {
            error!("[Main] {}", e);
            return ExitCode::from(2);
        }
    };
    if cli.print_config {
        return match config.to_yaml() {
            Ok(yaml) => {
                print!("{}", yaml);
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("[Main] {}", e);
                ExitCode::from(2)
            }
        };
    }

    info!("=== THERMAL LOOP START ===");
    let shutdown = Arc::new(AtomicBool::new(false));
    spawn_signal_listener(shutdown.clone());

    let (telemetry, telemetry_handle) = ChannelPublisher::with_logger(TELEMETRY_CAPACITY);
    let drop_counter = telemetry.clone();

    let outcome = match start(&cli, &config, telemetry, shutdown) {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("[Main] {}", e);
            return ExitCode::from(match e {
                LoopError::ThreadPanicked => 1,
                _ => 2,
            });
        }
    };

    let dropped = drop_counter.dropped();
    drop(drop_counter);
    if dropped > 0 {
        warn!("[Main] {} telemetry samples dropped", dropped);
    }
    let _ = telemetry_handle.join();

    if let (Some(path), Some(state)) = (&config.history_path, &outcome.state) {
        if let Err(e) = export_history(
            path,
            &state.history,
            config.setpoint_celsius,
            config.history_format(),
        ) {
            error!("[Main] history export failed: {}", e);
        }
    }

    info!(
        "=== THERMAL LOOP FINISHED ({:?}) ===",
        outcome.termination
    );
    ExitCode::from(outcome.termination.exit_code())
}

/// Pick the collaborators and run the loop to completion on its own thread.
fn start(
    cli: &Cli,
    config: &LoopConfig,
    telemetry: ChannelPublisher,
    shutdown: Arc<AtomicBool>,
) -> LoopResult<LoopOutcome> {
    match &cli.device {
        Some(addr) => {
            let board =
                LineDevice::connect_tcp(addr, Duration::from_millis(cli.device_timeout_ms))?
                    .shared();
            let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
            execute(config, board.clone(), board, telemetry, clock, shutdown)
        }
        None => {
            let clock: Arc<dyn Clock> = if cli.accelerated {
                Arc::new(VirtualClock::new())
            } else {
                Arc::new(SystemClock::new())
            };
            info!(
                "[Main] simulated plant (accelerated={}, U scale={})",
                cli.accelerated, config.simulation.heat_transfer_scale
            );
            let plant =
                SimulatedPlant::new(config.plant.energy_balance, config.simulation, clock.clone());
            execute(config, plant.sensor(), plant.heater(), telemetry, clock, shutdown)
        }
    }
}

fn execute<S, A>(
    config: &LoopConfig,
    sensor: S,
    actuator: A,
    telemetry: ChannelPublisher,
    clock: Arc<dyn Clock>,
    shutdown: Arc<AtomicBool>,
) -> LoopResult<LoopOutcome>
where
    S: TemperatureSensor + Send + 'static,
    A: Actuator + Send + 'static,
{
    let ctl = ControlLoop::new(config, sensor, actuator, telemetry, clock)?.with_shutdown(shutdown);
    let handle = spawn_loop(ctl, config.realtime)?;
    handle.join().map_err(|_| LoopError::ThreadPanicked)
}

fn spawn_loop<S, A>(
    ctl: ControlLoop<S, A, ChannelPublisher>,
    realtime: RealtimeConfig,
) -> std::io::Result<JoinHandle<LoopOutcome>>
where
    S: TemperatureSensor + Send + 'static,
    A: Actuator + Send + 'static,
{
    let builder = thread::Builder::new().name("control-loop".to_string());
    let body = move || {
        if let Some(core) = realtime.pin_core {
            pin_to_core(core);
        }
        ctl.run()
    };

    if realtime.elevate_priority {
        builder.spawn_with_priority(ThreadPriority::Max, move |priority| {
            if let Err(e) = priority {
                warn!("[Main] could not raise loop thread priority: {:?}", e);
            }
            body()
        })
    } else {
        builder.spawn(body)
    }
}

fn pin_to_core(core: usize) {
    let core_ids = core_affinity::get_core_ids().unwrap_or_default();
    match core_ids.get(core) {
        Some(core_id) if core_affinity::set_for_current(*core_id) => {
            info!("[Main] loop thread pinned to core {}", core);
        }
        Some(_) => warn!("[Main] failed to pin loop thread to core {}", core),
        None => warn!("[Main] core {} not among available cores", core),
    }
}

/// Ctrl-C sets `flag`; the loop stops at the top of its next cycle.
fn spawn_signal_listener(flag: Arc<AtomicBool>) {
    let spawned = thread::Builder::new()
        .name("signal".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    warn!("[Main] signal runtime unavailable: {}", e);
                    return;
                }
            };
            runtime.block_on(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("[Main] Ctrl-C received; stopping after the current cycle");
                    flag.store(true, Ordering::SeqCst);
                }
            });
        });
    if let Err(e) = spawned {
        warn!("[Main] signal listener not started: {}", e);
    }
}
