//! [`Device`] – the contract every driver implements, and [`DriverBase`],
//! the identity/connection/commands bundle drivers embed.

use std::sync::Arc;

use ferrobot_middleware::{Commander, Eventer};
use ferrobot_types::util::default_name;
use ferrobot_types::{DeviceJson, FerroError, Value};

use crate::connection::{Connection, NameCell};

/// A controller for one logical device attached through a [`Connection`].
///
/// Only [`Device::base`] and [`Device::driver_type`] are required; identity,
/// connection and command accessors forward to the embedded [`DriverBase`].
pub trait Device: Send + Sync {
    fn base(&self) -> &DriverBase;

    /// Type name reported by the introspection API, e.g. `"AnalogSensor"`.
    fn driver_type(&self) -> &'static str;

    /// Bring the device up. Calling `start` twice must not spawn a second
    /// polling task.
    ///
    /// # Errors
    ///
    /// Returns an error if the device cannot be initialised.
    fn start(&self) -> Result<(), FerroError> {
        Ok(())
    }

    /// Stop the device. Returns without waiting for an in-flight poll.
    ///
    /// # Errors
    ///
    /// Returns an error if the device cannot be put in a safe state.
    fn halt(&self) -> Result<(), FerroError> {
        Ok(())
    }

    fn name(&self) -> String {
        self.base().name()
    }

    fn set_name(&self, name: &str) {
        self.base().set_name(name);
    }

    fn connection(&self) -> Arc<dyn Connection> {
        self.base().connection()
    }

    fn commander(&self) -> &Commander {
        self.base().commander()
    }

    /// The device's events, for drivers that publish any.
    fn eventer(&self) -> Option<&Eventer> {
        None
    }

    fn to_json(&self) -> DeviceJson {
        DeviceJson {
            name: self.name(),
            driver: self.driver_type().to_string(),
            connection: self.connection().name(),
            commands: self.commander().commands(),
        }
    }
}

/// Name, connection and command registry shared by every driver.
pub struct DriverBase {
    name: NameCell,
    connection: Arc<dyn Connection>,
    commander: Commander,
}

impl DriverBase {
    /// A base named `"{prefix}-{hex5}"`.
    pub fn new(prefix: &str, connection: Arc<dyn Connection>) -> Self {
        Self {
            name: NameCell::new(default_name(prefix)),
            connection,
            commander: Commander::new(),
        }
    }

    pub fn name(&self) -> String {
        self.name.get()
    }

    pub fn set_name(&self, name: &str) {
        self.name.set(name);
    }

    pub fn connection(&self) -> Arc<dyn Connection> {
        Arc::clone(&self.connection)
    }

    pub fn commander(&self) -> &Commander {
        &self.commander
    }
}

impl std::fmt::Debug for DriverBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverBase")
            .field("name", &self.name())
            .field("connection", &self.connection.name())
            .field("commander", &self.commander)
            .finish()
    }
}

/// Reply of read-style commands: `{"val": value, "err": message}`, with
/// the absent side set to null.
pub fn read_reply<T: Into<Value>>(result: Result<T, FerroError>) -> Value {
    let (val, err) = match result {
        Ok(v) => (v.into(), Value::Null),
        Err(e) => (Value::Null, Value::from(e.to_string())),
    };
    Value::map([("val", val), ("err", err)])
}
