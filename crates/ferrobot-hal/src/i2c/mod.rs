//! I²C bus contracts and drivers.
//!
//! A bus adaptor implements [`I2cConnector`]; drivers ask it for an
//! [`I2cOperations`] handle bound to one device address when they start.

mod pcf8591;

pub use pcf8591::{Pcf8591Driver, Pcf8591ModeChannel, PCF8591_DEFAULT_ADDRESS};

use std::sync::Arc;

use ferrobot_types::FerroError;

use crate::connection::Connection;

/// Typed transactions against one device on an I²C bus.
///
/// Register-less `read`/`write` move raw bytes; the `*_data` variants address
/// a register first (SMBus style).
pub trait I2cOperations: Send + Sync {
    /// # Errors
    ///
    /// Fails on a bus error.
    fn read(&self, buf: &mut [u8]) -> Result<usize, FerroError>;

    /// # Errors
    ///
    /// Fails on a bus error.
    fn write(&self, data: &[u8]) -> Result<usize, FerroError>;

    /// # Errors
    ///
    /// Fails on a bus error.
    fn read_byte(&self) -> Result<u8, FerroError> {
        let mut buf = [0u8; 1];
        match self.read(&mut buf)? {
            1 => Ok(buf[0]),
            n => Err(FerroError::Protocol(format!("read {n} of 1 bytes"))),
        }
    }

    /// # Errors
    ///
    /// Fails on a bus error.
    fn write_byte(&self, value: u8) -> Result<(), FerroError> {
        self.write(&[value]).map(|_| ())
    }

    /// # Errors
    ///
    /// Fails on a bus error.
    fn read_byte_data(&self, reg: u8) -> Result<u8, FerroError>;

    /// # Errors
    ///
    /// Fails on a bus error.
    fn write_byte_data(&self, reg: u8, value: u8) -> Result<(), FerroError>;

    /// Little-endian 16-bit register read.
    ///
    /// # Errors
    ///
    /// Fails on a bus error.
    fn read_word_data(&self, reg: u8) -> Result<u16, FerroError> {
        let lo = self.read_byte_data(reg)?;
        let hi = self.read_byte_data(reg.wrapping_add(1))?;
        Ok(u16::from_le_bytes([lo, hi]))
    }

    /// Little-endian 16-bit register write.
    ///
    /// # Errors
    ///
    /// Fails on a bus error.
    fn write_word_data(&self, reg: u8, value: u16) -> Result<(), FerroError> {
        let [lo, hi] = value.to_le_bytes();
        self.write_byte_data(reg, lo)?;
        self.write_byte_data(reg.wrapping_add(1), hi)
    }

    /// # Errors
    ///
    /// Fails on a bus error.
    fn close(&self) -> Result<(), FerroError> {
        Ok(())
    }
}

/// A connection that can hand out I²C device handles.
pub trait I2cConnector: Connection {
    /// # Errors
    ///
    /// Fails for unsupported bus numbers or when not connected.
    fn get_i2c_connection(&self, address: u8, bus: u32) -> Result<Arc<dyn I2cOperations>, FerroError>;

    fn default_i2c_bus(&self) -> u32;
}
