//! [`HostAdaptor`] – the machine the process runs on, exposing its kernel
//! thermal zones as analog pins `"thermal_zone0"`, `"thermal_zone1"`, …
//!
//! Each zone reads in milli-degrees Celsius; pair it with
//! [`ThermalZoneDriver`](crate::aio::ThermalZoneDriver) to get °C.

use std::sync::Arc;

use ferrobot_types::FerroError;
use tracing::debug;

use super::AnalogPinsAdaptor;
use crate::connection::{AnalogReader, Connection, NameCell};
use crate::system::{AnalogPinConfig, Filesystem, NativeFilesystem};

pub const THERMAL_ZONE_ROOT: &str = "/sys/class/thermal";

const ZONE_PREFIX: &str = "thermal_zone";
const ZONE_BUFFER_LENGTH: u16 = 16;

pub struct HostAdaptor {
    name: NameCell,
    fs: Arc<dyn Filesystem>,
    pins: AnalogPinsAdaptor,
}

impl HostAdaptor {
    pub fn new() -> Self {
        Self::with_filesystem(Arc::new(NativeFilesystem))
    }

    pub fn with_filesystem(fs: Arc<dyn Filesystem>) -> Self {
        Self {
            name: NameCell::new(ferrobot_types::util::default_name("Host")),
            pins: AnalogPinsAdaptor::new(Arc::clone(&fs), Box::new(translate_thermal_zone)),
            fs,
        }
    }

    /// Whether `zone` (e.g. `"thermal_zone0"`) exists on this host.
    pub fn has_zone(&self, zone: &str) -> bool {
        translate_thermal_zone(zone).is_ok_and(|cfg| self.fs.exists(&cfg.path))
    }
}

impl Default for HostAdaptor {
    fn default() -> Self {
        Self::new()
    }
}

fn translate_thermal_zone(id: &str) -> Result<AnalogPinConfig, FerroError> {
    let valid = id
        .strip_prefix(ZONE_PREFIX)
        .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()));
    if !valid {
        return Err(FerroError::UnknownPin(id.to_string()));
    }
    Ok(AnalogPinConfig {
        path: format!("{THERMAL_ZONE_ROOT}/{id}/temp"),
        readable: true,
        writable: false,
        buffer_length: ZONE_BUFFER_LENGTH,
    })
}

impl Connection for HostAdaptor {
    fn name(&self) -> String {
        self.name.get()
    }

    fn set_name(&self, name: &str) {
        self.name.set(name);
    }

    fn connect(&self) -> Result<(), FerroError> {
        self.pins.connect();
        debug!(adaptor = %self.name(), "host adaptor connected");
        Ok(())
    }

    fn finalize(&self) -> Result<(), FerroError> {
        self.pins.finalize();
        Ok(())
    }

    fn port(&self) -> String {
        THERMAL_ZONE_ROOT.to_string()
    }

    fn adaptor_type(&self) -> &'static str {
        "HostAdaptor"
    }

    fn as_analog_reader(&self) -> Option<&dyn AnalogReader> {
        Some(self)
    }
}

impl AnalogReader for HostAdaptor {
    fn analog_read(&self, pin: &str) -> Result<i32, FerroError> {
        self.pins.analog_read(pin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::MockFilesystem;

    const ZONE0: &str = "/sys/class/thermal/thermal_zone0/temp";

    #[test]
    fn reads_thermal_zone_millidegrees() {
        let fs = Arc::new(MockFilesystem::new([ZONE0]));
        fs.set_contents(ZONE0, "45500\n");
        let host = HostAdaptor::with_filesystem(fs);
        host.connect().unwrap();
        assert_eq!(host.analog_read("thermal_zone0").unwrap(), 45500);
        assert!(host.has_zone("thermal_zone0"));
        assert!(!host.has_zone("thermal_zone7"));
    }

    #[test]
    fn rejects_other_pin_ids() {
        let host = HostAdaptor::with_filesystem(Arc::new(MockFilesystem::default()));
        host.connect().unwrap();
        for id in ["thermal_zone", "thermal_zoneX", "AIN0"] {
            assert_eq!(host.analog_read(id).unwrap_err(), FerroError::UnknownPin(id.into()));
        }
    }

    #[test]
    fn read_before_connect_fails() {
        let fs = Arc::new(MockFilesystem::new([ZONE0]));
        let host = HostAdaptor::with_filesystem(fs);
        assert!(matches!(host.analog_read("thermal_zone0"), Err(FerroError::NotConnected(_))));
        host.finalize().unwrap();
        assert_eq!(host.to_json().adaptor, "HostAdaptor");
    }
}
