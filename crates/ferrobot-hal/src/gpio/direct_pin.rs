use std::sync::Arc;

use ferrobot_types::{FerroError, Value};

use super::level_param;
use crate::connection::{Connection, unsupported};
use crate::device::{Device, DriverBase, read_reply};

/// Raw access to one pin. Works on any connection; each operation fails with
/// [`FerroError::Unsupported`] when the connection lacks the capability.
///
/// Commands: `DigitalRead` (replies `{"val", "err"}`), `DigitalWrite`,
/// `PwmWrite` and `ServoWrite` (param `level`).
pub struct DirectPinDriver {
    base: DriverBase,
    pin: Arc<str>,
}

fn digital_read(conn: &dyn Connection, pin: &str) -> Result<i32, FerroError> {
    conn.as_digital_reader()
        .ok_or_else(|| unsupported("DigitalRead", conn))?
        .digital_read(pin)
}

fn digital_write(conn: &dyn Connection, pin: &str, level: u8) -> Result<(), FerroError> {
    conn.as_digital_writer()
        .ok_or_else(|| unsupported("DigitalWrite", conn))?
        .digital_write(pin, level)
}

fn pwm_write(conn: &dyn Connection, pin: &str, level: u8) -> Result<(), FerroError> {
    conn.as_pwm_writer()
        .ok_or_else(|| unsupported("PwmWrite", conn))?
        .pwm_write(pin, level)
}

fn servo_write(conn: &dyn Connection, pin: &str, level: u8) -> Result<(), FerroError> {
    conn.as_servo_writer()
        .ok_or_else(|| unsupported("ServoWrite", conn))?
        .servo_write(pin, level)
}

type WriteOp = fn(&dyn Connection, &str, u8) -> Result<(), FerroError>;

impl DirectPinDriver {
    pub fn new<C: Connection + 'static>(connection: Arc<C>, pin: &str) -> Self {
        let conn: Arc<dyn Connection> = connection;
        let base = DriverBase::new("DirectPin", Arc::clone(&conn));
        let pin: Arc<str> = Arc::from(pin);

        let (c, p) = (Arc::clone(&conn), Arc::clone(&pin));
        base.commander()
            .add_command("DigitalRead", move |_| Ok(read_reply(digital_read(c.as_ref(), &p))));
        let writes: [(&str, WriteOp); 3] = [
            ("DigitalWrite", digital_write),
            ("PwmWrite", pwm_write),
            ("ServoWrite", servo_write),
        ];
        for (name, op) in writes {
            let (c, p) = (Arc::clone(&conn), Arc::clone(&pin));
            base.commander().add_command(name, move |params| {
                op(c.as_ref(), &p, level_param(params)?).map(|()| Value::Null)
            });
        }

        Self { base, pin }
    }

    pub fn pin(&self) -> &str {
        &self.pin
    }

    /// # Errors
    ///
    /// Unsupported capability or a failed read.
    pub fn digital_read(&self) -> Result<i32, FerroError> {
        digital_read(self.base.connection().as_ref(), &self.pin)
    }

    /// # Errors
    ///
    /// Unsupported capability or a failed write.
    pub fn digital_write(&self, level: u8) -> Result<(), FerroError> {
        digital_write(self.base.connection().as_ref(), &self.pin, level)
    }

    /// # Errors
    ///
    /// Unsupported capability or a failed write.
    pub fn pwm_write(&self, level: u8) -> Result<(), FerroError> {
        pwm_write(self.base.connection().as_ref(), &self.pin, level)
    }

    /// # Errors
    ///
    /// Unsupported capability or a failed write.
    pub fn servo_write(&self, angle: u8) -> Result<(), FerroError> {
        servo_write(self.base.connection().as_ref(), &self.pin, angle)
    }

    /// # Errors
    ///
    /// Unsupported capability or a failed write.
    pub fn on(&self) -> Result<(), FerroError> {
        self.digital_write(1)
    }

    /// # Errors
    ///
    /// Unsupported capability or a failed write.
    pub fn off(&self) -> Result<(), FerroError> {
        self.digital_write(0)
    }
}

impl Device for DirectPinDriver {
    fn base(&self) -> &DriverBase {
        &self.base
    }

    fn driver_type(&self) -> &'static str {
        "DirectPin"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adaptors::HostAdaptor;
    use crate::sim::{SimAdaptor, WriteKind};
    use crate::system::MockFilesystem;
    use ferrobot_types::Params;

    fn level(v: i64) -> Params {
        let mut params = Params::new();
        params.insert("level".into(), Value::from(v));
        params
    }

    #[test]
    fn commands_reach_every_capability() {
        let sim = Arc::new(SimAdaptor::new());
        sim.connect().unwrap();
        sim.set_digital("9", 1);
        let pin = DirectPinDriver::new(Arc::clone(&sim), "9");
        let commander = pin.commander();
        commander.call("DigitalWrite", &level(1)).unwrap().unwrap();
        commander.call("PwmWrite", &level(128)).unwrap().unwrap();
        commander.call("ServoWrite", &level(90)).unwrap().unwrap();
        let read = commander.call("DigitalRead", &Params::new()).unwrap().unwrap();
        assert_eq!(read.as_map().unwrap()["val"], Value::Int(1));

        assert_eq!(sim.written(WriteKind::Digital, "9"), vec![1]);
        assert_eq!(sim.written(WriteKind::Pwm, "9"), vec![128]);
        assert_eq!(sim.written(WriteKind::Servo, "9"), vec![90]);
        pin.off().unwrap();
        assert_eq!(sim.written(WriteKind::Digital, "9"), vec![1, 0]);
    }

    #[test]
    fn missing_capability_is_reported() {
        let host = Arc::new(HostAdaptor::with_filesystem(Arc::new(MockFilesystem::default())));
        host.set_name("host");
        let pin = DirectPinDriver::new(host, "thermal_zone0");
        assert_eq!(
            pin.digital_write(1).unwrap_err(),
            FerroError::Unsupported {
                capability: "DigitalWrite".into(),
                connection: "host".into(),
            }
        );
        let read = pin.commander().call("DigitalRead", &Params::new()).unwrap().unwrap();
        assert_eq!(
            read.as_map().unwrap()["err"],
            Value::from("host does not support DigitalRead")
        );
        assert!(pin.commander().call("ServoWrite", &level(-1)).unwrap().is_err());
    }
}
