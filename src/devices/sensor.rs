//! sensor.rs
//! Temperature sensor contract consumed by the control loop.

use crate::error::SensorError;

pub trait TemperatureSensor {
    /// One measurement in °C.
    fn read(&mut self) -> Result<f64, SensorError>;

    /// Polled once per cycle; `false` ends the run.
    fn is_online(&self) -> bool;
}

impl<T: TemperatureSensor + ?Sized> TemperatureSensor for Box<T> {
    fn read(&mut self) -> Result<f64, SensorError> {
        (**self).read()
    }

    fn is_online(&self) -> bool {
        (**self).is_online()
    }
}

/// Reject readings that are not finite numbers.
pub fn checked_reading(value: f64) -> Result<f64, SensorError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(SensorError::Malformed(value.to_string()))
    }
}
