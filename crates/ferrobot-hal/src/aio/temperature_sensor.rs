use std::ops::Deref;
use std::sync::Arc;

use ferrobot_middleware::Eventer;
use ferrobot_types::FerroError;

use super::AnalogSensorDriver;
use crate::connection::AnalogReader;
use crate::device::{Device, DriverBase};
use crate::scaler::{self, NtcConfig};

/// Analog temperature sensor: an [`AnalogSensorDriver`] with NTC and linear
/// scaler setters. Everything else derefs to the inner sensor.
pub struct TemperatureSensorDriver {
    sensor: AnalogSensorDriver,
}

impl TemperatureSensorDriver {
    pub fn new<C: AnalogReader + 'static>(connection: Arc<C>, pin: &str) -> Self {
        Self {
            sensor: AnalogSensorDriver::with_kind(connection, pin, "TemperatureSensor"),
        }
    }

    pub fn with_interval(self, interval: std::time::Duration) -> Self {
        Self {
            sensor: self.sensor.with_interval(interval),
        }
    }

    /// Scale readings through the thermistor equation. See [`scaler::ntc`].
    pub fn set_ntc_scaler(&self, v_ref: u32, r_series: u32, reverse: bool, config: NtcConfig) {
        self.sensor.set_scaler(scaler::ntc(v_ref, r_series, reverse, config));
    }

    pub fn set_linear_scaler(&self, from_min: i32, from_max: i32, to_min: f64, to_max: f64) {
        self.sensor.set_scaler(scaler::linear(from_min, from_max, to_min, to_max));
    }
}

impl Deref for TemperatureSensorDriver {
    type Target = AnalogSensorDriver;

    fn deref(&self) -> &AnalogSensorDriver {
        &self.sensor
    }
}

impl Device for TemperatureSensorDriver {
    fn base(&self) -> &DriverBase {
        self.sensor.base()
    }

    fn driver_type(&self) -> &'static str {
        self.sensor.driver_type()
    }

    fn start(&self) -> Result<(), FerroError> {
        self.sensor.start()
    }

    fn halt(&self) -> Result<(), FerroError> {
        self.sensor.halt()
    }

    fn eventer(&self) -> Option<&Eventer> {
        Device::eventer(&self.sensor)
    }
}
