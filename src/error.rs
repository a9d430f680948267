//! error.rs
//! Error taxonomy for the control loop and its collaborators.
//!
//! Sensor and actuator failures carry their own tagged types so the scheduler can
//! branch on cause (retry vs. fatal) instead of a catch-all.

use thiserror::Error;

/// Result type for control-loop operations.
pub type LoopResult<T> = Result<T, LoopError>;

/// Failures reported by a temperature sensor.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SensorError {
    /// The sensor could not produce a reading.
    #[error("sensor unavailable: {0}")]
    Unavailable(String),

    /// No reply within the read timeout.
    #[error("sensor read timed out")]
    Timeout,

    /// A reply arrived but could not be parsed as a temperature.
    #[error("malformed sensor reply: {0:?}")]
    Malformed(String),
}

/// Failures reported by the heater actuator.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ActuatorError {
    /// Writing the command to the device failed.
    #[error("actuator write failed: {0}")]
    Write(String),

    /// The device did not acknowledge within the read timeout.
    #[error("actuator acknowledgement timed out")]
    Timeout,

    /// The device answered with something other than the expected acknowledgement.
    #[error("unexpected actuator reply: {0:?}")]
    Protocol(String),
}

/// Errors raised by the control loop, its models, and its configuration.
#[derive(Debug, Error)]
pub enum LoopError {
    /// A non-positive (or NaN) time step was passed to the PID law or a model.
    #[error("invalid time step: dt = {dt}")]
    InvalidTimestep { dt: f64 },

    /// A model advance asked for history that has not been recorded yet.
    #[error("history too short for cycle index {index}")]
    MissingHistory { index: usize },

    /// Configuration rejected by validation.
    #[error("invalid configuration: {what}")]
    InvalidConfig { what: String },

    /// The loop thread panicked; the heater was forced off while unwinding.
    #[error("control loop thread panicked")]
    ThreadPanicked,

    #[error(transparent)]
    Sensor(#[from] SensorError),

    #[error(transparent)]
    Actuator(#[from] ActuatorError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl LoopError {
    pub(crate) fn config(what: impl Into<String>) -> Self {
        LoopError::InvalidConfig { what: what.into() }
    }
}

/// Rejects `dt <= 0` and NaN.
#[inline]
pub(crate) fn ensure_positive_dt(dt: f64) -> LoopResult<()> {
    if dt > 0.0 {
        Ok(())
    } else {
        Err(LoopError::InvalidTimestep { dt })
    }
}
