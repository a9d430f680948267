//! actuator.rs
//! Heater actuator contract plus the retry policy applied to heater writes.

use log::warn;

use crate::error::ActuatorError;

pub trait Actuator {
    /// Drive the heater, `percent` in 0..=100.
    fn set_heater_percent(&mut self, percent: f64) -> Result<(), ActuatorError>;

    /// Secondary indicator output, 0..=100. Failures are never fatal to the loop.
    fn set_indicator(&mut self, percent: f64) -> Result<(), ActuatorError>;

    /// Release the connection; the device should leave all outputs off.
    fn release(&mut self) -> Result<(), ActuatorError>;
}

impl<T: Actuator + ?Sized> Actuator for Box<T> {
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

/// Clip a command to the physical heater range.
#[inline]
pub fn clip_percent(percent: f64) -> f64 {
    percent.clamp(0.0, 100.0)
}

/// Write the heater command, retrying up to `retries` more times. Returns the last
/// error once attempts are exhausted.
pub fn write_heater_with_retry<A: Actuator + ?Sized>(
    actuator: &mut A,
    percent: f64,
    retries: u32,
) -> Result<(), ActuatorError> {
    let percent = clip_percent(percent);
    let mut attempt = 0;
    loop {
        match actuator.set_heater_percent(percent) {
            Ok(()) => return Ok(()),
            Err(e) if attempt < retries => {
                attempt += 1;
                warn!(
                    "[Actuator] heater write of {:.2}% failed ({}); retry {}/{}",
                    percent, e, attempt, retries
                );
            }
            Err(e) => return Err(e),
        }
    }
}
