use std::ops::Deref;
use std::sync::Arc;

use ferrobot_middleware::Eventer;
use ferrobot_types::FerroError;

use super::AnalogSensorDriver;
use crate::connection::AnalogReader;
use crate::device::{Device, DriverBase};

/// Kernel thermal zone read as milli-degrees Celsius (see
/// [`HostAdaptor`](crate::adaptors::HostAdaptor)), reported in °C or,
/// optionally, °F.
pub struct ThermalZoneDriver {
    sensor: AnalogSensorDriver,
}

impl ThermalZoneDriver {
    pub fn new<C: AnalogReader + 'static>(connection: Arc<C>, zone_id: &str) -> Self {
        let sensor = AnalogSensorDriver::with_kind(connection, zone_id, "ThermalZone")
            .with_scaler(Arc::new(|raw: i32| f64::from(raw) / 1000.0));
        Self { sensor }
    }

    pub fn with_fahrenheit(self) -> Self {
        self.sensor
            .set_scaler(Arc::new(|raw: i32| (f64::from(raw) / 1000.0) * 9.0 / 5.0 + 32.0));
        self
    }

    pub fn with_interval(self, interval: std::time::Duration) -> Self {
        Self {
            sensor: self.sensor.with_interval(interval),
        }
    }
}

impl Deref for ThermalZoneDriver {
    type Target = AnalogSensorDriver;

    fn deref(&self) -> &AnalogSensorDriver {
        &self.sensor
    }
}

impl Device for ThermalZoneDriver {
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
