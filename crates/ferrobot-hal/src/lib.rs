//! `ferrobot-hal` – Hardware Abstraction Layer.
//!
//! Connections (adaptors) expose hardware capabilities through small traits;
//! device drivers are bound to a connection at construction and expose
//! commands and events of their own.
//!
//! # Modules
//!
//! | Module | Contents |
//! |---|---|
//! | [`connection`] | [`Connection`] and the capability traits (`AnalogReader`, `DigitalWriter`, …) |
//! | [`device`] | [`Device`] trait and the shared [`DriverBase`] |
//! | [`poller`] | Fixed-interval polling engine reused by periodic drivers |
//! | [`scaler`] | Identity, linear and NTC thermistor scalers |
//! | [`system`] | Filesystem access layer and sysfs analog pins |
//! | [`adaptors`] | Analog-pins adaptor and the host thermal-zone adaptor |
//! | [`sim`] | In-process simulation adaptor for tests and demos |
//! | [`aio`] | Analog drivers: sensor, temperature, thermal zone, Grove, actuator |
//! | [`gpio`] | Digital drivers: LED, button, relay, direct pin |
//! | [`i2c`] | I²C bus contracts and the PCF8591 ADC/DAC driver |

pub mod adaptors;
pub mod aio;
pub mod connection;
pub mod device;
pub mod gpio;
pub mod i2c;
pub mod poller;
pub mod scaler;
pub mod sim;
pub mod system;

pub use connection::{
    AnalogReader, AnalogWriter, BleConnector, Connection, DigitalReader, DigitalWriter,
    PwmWriter, SerialReader, SerialWriter, ServoWriter, SpiConnector, SpiOperations,
};
pub use device::{Device, DriverBase, read_reply};
pub use i2c::{I2cConnector, I2cOperations};
pub use poller::Poller;
pub use sim::{SimAdaptor, SimWrite, WriteKind};
