//! Grove analog sensor presets.

use std::ops::Deref;
use std::sync::Arc;

use ferrobot_middleware::{Eventer, Subscription};
use ferrobot_types::FerroError;
use parking_lot::Mutex;

use super::{AnalogSensorDriver, DATA, VIBRATION};
use crate::connection::AnalogReader;
use crate::device::{Device, DriverBase};

/// Raw reading above which the piezo sensor reports a vibration.
pub const VIBRATION_THRESHOLD: i64 = 1000;

macro_rules! grove_sensor {
    ($(#[$doc:meta])* $name:ident, $kind:literal) => {
        $(#[$doc])*
        pub struct $name {
            sensor: AnalogSensorDriver,
        }

        impl $name {
            pub fn new<C: AnalogReader + 'static>(connection: Arc<C>, pin: &str) -> Self {
                Self {
                    sensor: AnalogSensorDriver::with_kind(connection, pin, $kind),
                }
            }

            pub fn with_interval(self, interval: std::time::Duration) -> Self {
                Self {
                    sensor: self.sensor.with_interval(interval),
                }
            }
        }

        impl Deref for $name {
            type Target = AnalogSensorDriver;

            fn deref(&self) -> &AnalogSensorDriver {
                &self.sensor
            }
        }

        impl Device for $name {
            fn base(&self) -> &DriverBase {
                self.sensor.base()
            }

            fn driver_type(&self) -> &'static str {
                $kind
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
    };
}

grove_sensor!(
    /// Grove rotary angle sensor (potentiometer).
    GroveRotaryDriver,
    "GroveRotary"
);
grove_sensor!(GroveLightSensorDriver, "GroveLightSensor");
grove_sensor!(GroveSoundSensorDriver, "GroveSoundSensor");

/// Grove piezo vibration sensor. In addition to the analog sensor events it
/// publishes `"vibration"` with the raw reading whenever a `"data"` reading
/// exceeds [`VIBRATION_THRESHOLD`].
pub struct GrovePiezoVibrationSensorDriver {
    sensor: AnalogSensorDriver,
    watch: Mutex<Option<Subscription>>,
}

impl GrovePiezoVibrationSensorDriver {
    pub fn new<C: AnalogReader + 'static>(connection: Arc<C>, pin: &str) -> Self {
        let sensor = AnalogSensorDriver::with_kind(connection, pin, "GrovePiezoVibrationSensor");
        sensor.events().add_event(VIBRATION);
        Self {
            sensor,
            watch: Mutex::new(None),
        }
    }

    pub fn with_interval(self, interval: std::time::Duration) -> Self {
        Self {
            sensor: self.sensor.with_interval(interval),
            watch: self.watch,
        }
    }
}

impl Deref for GrovePiezoVibrationSensorDriver {
    type Target = AnalogSensorDriver;

    fn deref(&self) -> &AnalogSensorDriver {
        &self.sensor
    }
}

impl Device for GrovePiezoVibrationSensorDriver {
    fn base(&self) -> &DriverBase {
        self.sensor.base()
    }

    fn driver_type(&self) -> &'static str {
        self.sensor.driver_type()
    }

    fn start(&self) -> Result<(), FerroError> {
        {
            let mut watch = self.watch.lock();
            if watch.as_ref().is_none_or(Subscription::is_finished) {
                let events = self.sensor.events().clone();
                *watch = Some(self.sensor.events().on(DATA, move |data| {
                    if data.as_i64().is_some_and(|raw| raw > VIBRATION_THRESHOLD) {
                        events.publish(VIBRATION, data);
                    }
                })?);
            }
        }
        self.sensor.start()
    }

    fn halt(&self) -> Result<(), FerroError> {
        if let Some(watch) = self.watch.lock().take() {
            watch.cancel();
        }
        self.sensor.halt()
    }

    fn eventer(&self) -> Option<&Eventer> {
        Device::eventer(&self.sensor)
    }
}
