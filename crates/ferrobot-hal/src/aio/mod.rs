//! Analog I/O drivers.
//!
//! | Driver | Connection capability |
//! |---|---|
//! | [`AnalogSensorDriver`] | [`AnalogReader`](crate::AnalogReader), polled |
//! | [`TemperatureSensorDriver`] | analog sensor with NTC / linear scalers |
//! | [`ThermalZoneDriver`] | analog sensor reading milli-degrees |
//! | Grove rotary / light / sound / piezo vibration | analog sensor presets |
//! | [`AnalogActuatorDriver`] | [`AnalogWriter`](crate::AnalogWriter) |

mod analog_actuator;
mod analog_sensor;
mod grove;
mod temperature_sensor;
mod thermal_zone;

pub use analog_actuator::AnalogActuatorDriver;
pub use analog_sensor::{AnalogSensorDriver, DEFAULT_READ_INTERVAL};
pub use grove::{
    GroveLightSensorDriver, GrovePiezoVibrationSensorDriver, GroveRotaryDriver,
    GroveSoundSensorDriver, VIBRATION_THRESHOLD,
};
pub use temperature_sensor::TemperatureSensorDriver;
pub use thermal_zone::ThermalZoneDriver;

/// Raw reading changed.
pub const DATA: &str = "data";
/// Scaled reading changed.
pub const VALUE: &str = "value";
/// A read failed.
pub const ERROR: &str = "error";
/// Piezo reading above the vibration threshold.
pub const VIBRATION: &str = "vibration";
