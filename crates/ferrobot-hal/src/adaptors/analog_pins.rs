//! [`AnalogPinsAdaptor`] – lazily opened sysfs analog pins behind a platform
//! pin translator. Platform adaptors embed it to provide
//! [`AnalogReader`](crate::AnalogReader) / [`AnalogWriter`](crate::AnalogWriter).

use std::collections::HashMap;
use std::sync::Arc;

use ferrobot_types::FerroError;
use parking_lot::Mutex;

use crate::system::{AnalogPinConfig, Filesystem, SysfsAnalogPin};

/// Maps a pin identifier such as `"thermal_zone0"` or `"AIN1"` to its sysfs
/// configuration.
pub type AnalogPinTranslator = Box<dyn Fn(&str) -> Result<AnalogPinConfig, FerroError> + Send + Sync>;

pub struct AnalogPinsAdaptor {
    fs: Arc<dyn Filesystem>,
    translate: AnalogPinTranslator,
    /// `None` until connected.
    pins: Mutex<Option<HashMap<String, Arc<SysfsAnalogPin>>>>,
}

impl AnalogPinsAdaptor {
    pub fn new(fs: Arc<dyn Filesystem>, translate: AnalogPinTranslator) -> Self {
        Self {
            fs,
            translate,
            pins: Mutex::new(None),
        }
    }

    /// Start with an empty pin cache.
    pub fn connect(&self) {
        *self.pins.lock() = Some(HashMap::new());
    }

    /// Drop every cached pin. Idempotent; nothing is written to sysfs.
    pub fn finalize(&self) {
        *self.pins.lock() = None;
    }

    pub fn is_connected(&self) -> bool {
        self.pins.lock().is_some()
    }

    /// Number of pins opened since the last `connect`.
    pub fn open_pins(&self) -> usize {
        self.pins.lock().as_ref().map_or(0, HashMap::len)
    }

    /// # Errors
    ///
    /// Fails before `connect`, on unknown ids, on pins not configured as
    /// readable, and on filesystem errors.
    pub fn analog_read(&self, id: &str) -> Result<i32, FerroError> {
        self.pin(id)?.read()
    }

    /// # Errors
    ///
    /// Fails before `connect`, on unknown ids, on pins not configured as
    /// writable, and on filesystem errors.
    pub fn analog_write(&self, id: &str, value: i32) -> Result<(), FerroError> {
        self.pin(id)?.write(value)
    }

    fn pin(&self, id: &str) -> Result<Arc<SysfsAnalogPin>, FerroError> {
        let mut guard = self.pins.lock();
        let pins = guard
            .as_mut()
            .ok_or_else(|| FerroError::NotConnected("analog pins adaptor".into()))?;
        if let Some(pin) = pins.get(id) {
            return Ok(Arc::clone(pin));
        }
        let config = (self.translate)(id)?;
        let pin = Arc::new(SysfsAnalogPin::new(Arc::clone(&self.fs), config));
        pins.insert(id.to_string(), Arc::clone(&pin));
        Ok(pin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::MockFilesystem;

    const READ_PATH: &str = "/sys/bus/iio/devices/iio:device0/in_voltage0_raw";
    const WRITE_PATH: &str = "/sys/devices/platform/pwm/pwmchip3/export";
    const RW_PATH: &str = "/sys/devices/platform/pwm/pwmchip3/pwm44/period";

    fn translator() -> AnalogPinTranslator {
        Box::new(|id| {
            let (path, readable, writable, buffer_length) = match id {
                "read" => (READ_PATH, true, false, 10),
                "write" => (WRITE_PATH, false, true, 11),
                "read/write" => (RW_PATH, true, true, 12),
                _ => return Err(FerroError::UnknownPin(id.to_string())),
            };
            Ok(AnalogPinConfig {
                path: path.to_string(),
                readable,
                writable,
                buffer_length,
            })
        })
    }

    fn adaptor() -> (AnalogPinsAdaptor, Arc<MockFilesystem>) {
        let fs = Arc::new(MockFilesystem::new([READ_PATH, WRITE_PATH, RW_PATH]));
        fs.set_contents(READ_PATH, "54321");
        fs.set_contents(WRITE_PATH, "0");
        fs.set_contents(RW_PATH, "30000");
        let a = AnalogPinsAdaptor::new(Arc::clone(&fs) as Arc<dyn Filesystem>, translator());
        (a, fs)
    }

    #[test]
    fn io_before_connect_fails() {
        let (a, _) = adaptor();
        let err = a.analog_write("write", 1).unwrap_err();
        assert!(err.to_string().contains("not connected"));
        a.connect();
        assert!(a.is_connected());
        assert_eq!(a.open_pins(), 0);
    }

    #[test]
    fn finalize_is_idempotent_and_clears_pins() {
        let (a, _) = adaptor();
        a.finalize();
        a.connect();
        a.analog_write("write", 1).unwrap();
        assert_eq!(a.open_pins(), 1);
        a.finalize();
        assert_eq!(a.open_pins(), 0);
        a.finalize();
        assert!(!a.is_connected());
    }

    #[test]
    fn reconnect_starts_with_empty_cache() {
        let (a, _) = adaptor();
        a.connect();
        a.analog_read("read/write").unwrap();
        a.finalize();
        a.connect();
        assert_eq!(a.open_pins(), 0);
    }

    #[test]
    fn read_and_write_through_translator() {
        let (a, fs) = adaptor();
        a.connect();
        assert_eq!(a.analog_read("read").unwrap(), 54321);
        a.analog_write("write", 100).unwrap();
        assert_eq!(fs.contents(WRITE_PATH).as_deref(), Some("100"));
        assert_eq!(a.analog_read("read/write").unwrap(), 30000);
    }

    #[test]
    fn translator_and_permission_errors() {
        let (a, fs) = adaptor();
        a.connect();
        assert_eq!(
            a.analog_read("notexist").unwrap_err(),
            FerroError::UnknownPin("notexist".into())
        );
        assert!(a.analog_write("read", 1).unwrap_err().to_string().contains("not allowed to write"));
        assert!(a.analog_read("write").unwrap_err().to_string().contains("not allowed to read"));
        fs.set_write_error(true);
        assert!(a.analog_write("read/write", 5).is_err());
        assert_eq!(fs.contents(RW_PATH).as_deref(), Some("30000"));
    }
}
