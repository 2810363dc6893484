use std::sync::Arc;

use ferrobot_types::{FerroError, Value};
use parking_lot::Mutex;

use crate::connection::{Connection, DigitalWriter};
use crate::device::{Device, DriverBase};

struct RelayCore {
    writer: Arc<dyn DigitalWriter>,
    pin: String,
    inverted: bool,
    // Pin level last written.
    high: Mutex<bool>,
}

impl RelayCore {
    fn state(&self) -> bool {
        *self.high.lock() != self.inverted
    }

    fn set(&self, on: bool) -> Result<(), FerroError> {
        let level = on != self.inverted;
        let mut high = self.high.lock();
        self.writer.digital_write(&self.pin, u8::from(level))?;
        *high = level;
        Ok(())
    }
}

/// A relay on a digital output. With inverted wiring the relay closes on a
/// low level.
///
/// Commands: `On`, `Off`, `Toggle` and `State`.
pub struct RelayDriver {
    base: DriverBase,
    core: Arc<RelayCore>,
}

impl RelayDriver {
    pub fn new<C: DigitalWriter + 'static>(connection: Arc<C>, pin: &str) -> Self {
        Self::build(connection, pin, false)
    }

    pub fn inverted<C: DigitalWriter + 'static>(connection: Arc<C>, pin: &str) -> Self {
        Self::build(connection, pin, true)
    }

    fn build<C: DigitalWriter + 'static>(connection: Arc<C>, pin: &str, inverted: bool) -> Self {
        let conn: Arc<dyn Connection> = connection.clone();
        let base = DriverBase::new("Relay", conn);
        let core = Arc::new(RelayCore {
            writer: connection,
            pin: pin.to_string(),
            inverted,
            high: Mutex::new(false),
        });

        let commander = base.commander();
        let c = Arc::clone(&core);
        commander.add_command("On", move |_| c.set(true).map(|()| Value::Null));
        let c = Arc::clone(&core);
        commander.add_command("Off", move |_| c.set(false).map(|()| Value::Null));
        let c = Arc::clone(&core);
        commander.add_command("Toggle", move |_| c.set(!c.state()).map(|()| Value::Null));
        let c = Arc::clone(&core);
        commander.add_command("State", move |_| Ok(Value::from(c.state())));

        Self { base, core }
    }

    pub fn pin(&self) -> &str {
        &self.core.pin
    }

    pub fn is_inverted(&self) -> bool {
        self.core.inverted
    }

    /// Whether the relay is on, independent of wiring.
    pub fn state(&self) -> bool {
        self.core.state()
    }

    /// # Errors
    ///
    /// Propagates the connection's write error.
    pub fn on(&self) -> Result<(), FerroError> {
        self.core.set(true)
    }

    /// # Errors
    ///
    /// Propagates the connection's write error.
    pub fn off(&self) -> Result<(), FerroError> {
        self.core.set(false)
    }

    /// # Errors
    ///
    /// Propagates the connection's write error.
    pub fn toggle(&self) -> Result<(), FerroError> {
        self.core.set(!self.core.state())
    }
}

impl Device for RelayDriver {
    fn base(&self) -> &DriverBase {
        &self.base
    }

    fn driver_type(&self) -> &'static str {
        "Relay"
    }
}
