//! [`Connection`] – a long-lived handle to a hardware interface, plus the
//! capability traits drivers consume.
//!
//! A driver states the capabilities it needs as trait bounds on its
//! constructor (`AnalogSensorDriver::new<C: AnalogReader>`), so binding a
//! driver to a connection that lacks them does not compile. Optional
//! capabilities are probed at call time through the `as_*` accessors.
//!
//! All methods take `&self`: a connection may be shared by several drivers
//! and is responsible for serialising access to its bus internally.

use std::sync::Arc;

use ferrobot_types::{ConnectionJson, FerroError};
use parking_lot::RwLock;

/// Lifecycle and identity of a hardware interface.
pub trait Connection: Send + Sync {
    fn name(&self) -> String;

    fn set_name(&self, name: &str);

    /// Open the interface. Must succeed before any I/O.
    ///
    /// # Errors
    ///
    /// Returns [`FerroError::Io`] (or a more specific variant) if the
    /// interface cannot be opened.
    fn connect(&self) -> Result<(), FerroError>;

    /// Release kernel handles. Calling it again, or before `connect`, is a
    /// no-op that returns `Ok(())`.
    ///
    /// # Errors
    ///
    /// Returns an error if releasing a handle fails.
    fn finalize(&self) -> Result<(), FerroError>;

    /// Device path, address or URL, if any.
    fn port(&self) -> String {
        String::new()
    }

    /// Type name reported by the introspection API, e.g. `"SimAdaptor"`.
    fn adaptor_type(&self) -> &'static str;

    fn as_analog_reader(&self) -> Option<&dyn AnalogReader> {
        None
    }

    fn as_analog_writer(&self) -> Option<&dyn AnalogWriter> {
        None
    }

    fn as_digital_reader(&self) -> Option<&dyn DigitalReader> {
        None
    }

    fn as_digital_writer(&self) -> Option<&dyn DigitalWriter> {
        None
    }

    fn as_pwm_writer(&self) -> Option<&dyn PwmWriter> {
        None
    }

    fn as_servo_writer(&self) -> Option<&dyn ServoWriter> {
        None
    }

    fn to_json(&self) -> ConnectionJson {
        ConnectionJson {
            name: self.name(),
            port: self.port(),
            adaptor: self.adaptor_type().to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Pin capabilities
// ---------------------------------------------------------------------------

pub trait AnalogReader: Connection {
    /// # Errors
    ///
    /// Fails on unknown pins, before `connect`, or on a failed transaction.
    fn analog_read(&self, pin: &str) -> Result<i32, FerroError>;
}

pub trait AnalogWriter: Connection {
    /// # Errors
    ///
    /// Fails on unknown pins, before `connect`, or on a failed transaction.
    fn analog_write(&self, pin: &str, value: i32) -> Result<(), FerroError>;
}

pub trait DigitalReader: Connection {
    /// Returns `0`/`1`, or `-1` when the level could not be determined.
    ///
    /// # Errors
    ///
    /// Fails on unknown pins, before `connect`, or on a failed transaction.
    fn digital_read(&self, pin: &str) -> Result<i32, FerroError>;
}

pub trait DigitalWriter: Connection {
    /// # Errors
    ///
    /// Fails on unknown pins, before `connect`, or on a failed transaction.
    fn digital_write(&self, pin: &str, level: u8) -> Result<(), FerroError>;
}

pub trait PwmWriter: Connection {
    /// # Errors
    ///
    /// Fails on unknown pins, before `connect`, or on a failed transaction.
    fn pwm_write(&self, pin: &str, level: u8) -> Result<(), FerroError>;
}

pub trait ServoWriter: Connection {
    /// # Errors
    ///
    /// Fails on unknown pins, before `connect`, or on a failed transaction.
    fn servo_write(&self, pin: &str, angle: u8) -> Result<(), FerroError>;
}

// ---------------------------------------------------------------------------
// Serial, BLE and SPI
// ---------------------------------------------------------------------------

pub trait SerialReader: Connection {
    /// Read into `buf`, returning the number of bytes read (possibly zero).
    ///
    /// # Errors
    ///
    /// Fails before `connect` or on a port error.
    fn serial_read(&self, buf: &mut [u8]) -> Result<usize, FerroError>;
}

pub trait SerialWriter: Connection {
    /// # Errors
    ///
    /// Fails before `connect` or on a port error.
    fn serial_write(&self, data: &[u8]) -> Result<usize, FerroError>;
}

/// Callback invoked with every notification of a subscribed characteristic.
pub type NotificationHandler = Box<dyn Fn(Vec<u8>) + Send + Sync>;

/// BLE central role towards a single peripheral. `connect` / `finalize` of
/// [`Connection`] open and close the link.
pub trait BleConnector: Connection {
    fn address(&self) -> String;

    /// # Errors
    ///
    /// Fails if the link cannot be closed.
    fn disconnect(&self) -> Result<(), FerroError>;

    /// # Errors
    ///
    /// Fails for unknown characteristics or when not connected.
    fn read_characteristic(&self, uuid: &str) -> Result<Vec<u8>, FerroError>;

    /// # Errors
    ///
    /// Fails for unknown characteristics or when not connected.
    fn write_characteristic(&self, uuid: &str, data: &[u8]) -> Result<(), FerroError>;

    /// # Errors
    ///
    /// Fails for unknown characteristics or when not connected.
    fn subscribe(&self, uuid: &str, handler: NotificationHandler) -> Result<(), FerroError>;
}

/// One SPI device (bus + chip select) with full-duplex transfers.
pub trait SpiOperations: Send + Sync {
    /// Write `tx` and fill `rx` with the bytes clocked in at the same time.
    ///
    /// # Errors
    ///
    /// Fails if the buffers differ in length or the transfer fails.
    fn transfer(&self, tx: &[u8], rx: &mut [u8]) -> Result<(), FerroError>;

    /// # Errors
    ///
    /// Fails if the transfer fails.
    fn write_bytes(&self, data: &[u8]) -> Result<(), FerroError> {
        let mut discard = vec![0u8; data.len()];
        self.transfer(data, &mut discard)
    }

    /// # Errors
    ///
    /// Fails if the device cannot be released.
    fn close(&self) -> Result<(), FerroError>;
}

pub trait SpiConnector: Connection {
    /// # Errors
    ///
    /// Fails for unsupported bus/chip numbers or when not connected.
    fn get_spi_connection(
        &self,
        bus: u32,
        chip: u32,
        mode: u8,
        bits: u8,
        max_speed_hz: u32,
    ) -> Result<Arc<dyn SpiOperations>, FerroError>;

    fn default_spi_bus(&self) -> u32 {
        0
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Interior-mutable name shared by adaptors and drivers.
#[derive(Debug)]
pub struct NameCell(RwLock<String>);

impl NameCell {
    pub fn new(name: impl Into<String>) -> Self {
        Self(RwLock::new(name.into()))
    }

    pub fn get(&self) -> String {
        self.0.read().clone()
    }

    pub fn set(&self, name: &str) {
        *self.0.write() = name.to_string();
    }
}

/// Error for a capability the connection does not provide.
pub fn unsupported(capability: &str, connection: &dyn Connection) -> FerroError {
    FerroError::Unsupported {
        capability: capability.to_string(),
        connection: connection.name(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Bare {
        name: NameCell,
    }

    impl Connection for Bare {
        fn name(&self) -> String {
            self.name.get()
        }
        fn set_name(&self, name: &str) {
            self.name.set(name);
        }
        fn connect(&self) -> Result<(), FerroError> {
            Ok(())
        }
        fn finalize(&self) -> Result<(), FerroError> {
            Ok(())
        }
        fn adaptor_type(&self) -> &'static str {
            "Bare"
        }
    }

    #[test]
    fn capabilities_default_to_absent() {
        let conn = Bare { name: NameCell::new("bare") };
        assert!(conn.as_analog_reader().is_none());
        assert!(conn.as_pwm_writer().is_none());
        let err = unsupported("PwmWrite", &conn);
        assert_eq!(err.to_string(), "bare does not support PwmWrite");
    }

    #[test]
    fn to_json_reports_identity() {
        let conn = Bare { name: NameCell::new("bare") };
        conn.set_name("renamed");
        let json = conn.to_json();
        assert_eq!(json.name, "renamed");
        assert_eq!(json.port, "");
        assert_eq!(json.adaptor, "Bare");
    }
}
