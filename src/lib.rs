//! # thermal-rts
//!
//! Soft-real-time closed-loop temperature controller for a single heater/sensor pair.
//!
//! Once per fixed period the loop reads the sensor, advances two predictive plant
//! models (a nonlinear energy balance and a linear FOPDT recurrence), computes the
//! heater command with an anti-windup PID law, and writes it to the actuator.
//! Cumulative tracking errors for both models and the setpoint are kept per cycle.
//!
//! ## Layout
//! - `plant`: energy-balance and FOPDT models, RK4 stepping.
//! - `control`: PID controller, loop state, drift-compensated pacing, scheduler.
//! - `devices`: sensor/actuator/telemetry contracts, line-protocol board, simulated plant.
//! - `utils`: history export and cycle timing statistics.

pub mod config;
pub mod control;
pub mod devices;
pub mod error;
pub mod plant;
pub mod utils;

pub use config::LoopConfig;
pub use control::scheduler::{ControlLoop, LoopOutcome, LoopPhase, Termination};
pub use error::{ActuatorError, LoopError, LoopResult, SensorError};
