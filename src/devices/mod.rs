//Devices: everything the control loop talks to outside its own process.
//The loop only sees the traits below; concrete devices are a line-protocol
//board over a byte stream, a simulated heater/sensor pair, and telemetry sinks.

pub mod actuator;
pub mod line;
pub mod sensor;
pub mod simulated;
pub mod telemetry;

pub use actuator::Actuator;
pub use sensor::TemperatureSensor;
pub use telemetry::TelemetryPublisher;
