use std::sync::Arc;

use ferrobot_types::{FerroError, Value};
use parking_lot::Mutex;

use super::level_param;
use crate::connection::{Connection, DigitalWriter, unsupported};
use crate::device::{Device, DriverBase};

struct LedCore {
    connection: Arc<dyn Connection>,
    writer: Arc<dyn DigitalWriter>,
    pin: String,
    high: Mutex<bool>,
}

impl LedCore {
    fn set(&self, on: bool) -> Result<(), FerroError> {
        let mut high = self.high.lock();
        self.writer.digital_write(&self.pin, u8::from(on))?;
        *high = on;
        Ok(())
    }

    fn toggle(&self) -> Result<(), FerroError> {
        let on = !*self.high.lock();
        self.set(on)
    }

    fn brightness(&self, level: u8) -> Result<(), FerroError> {
        let pwm = self
            .connection
            .as_pwm_writer()
            .ok_or_else(|| unsupported("PwmWrite", self.connection.as_ref()))?;
        let mut high = self.high.lock();
        pwm.pwm_write(&self.pin, level)?;
        *high = level > 0;
        Ok(())
    }
}

/// An LED on a digital output.
///
/// Commands: `On`, `Off`, `Toggle` and `Brightness` (param `level`, needs a
/// PWM capable connection).
pub struct LedDriver {
    base: DriverBase,
    core: Arc<LedCore>,
}

impl LedDriver {
    pub fn new<C: DigitalWriter + 'static>(connection: Arc<C>, pin: &str) -> Self {
        let conn: Arc<dyn Connection> = connection.clone();
        let base = DriverBase::new("LED", Arc::clone(&conn));
        let core = Arc::new(LedCore {
            connection: conn,
            writer: connection,
            pin: pin.to_string(),
            high: Mutex::new(false),
        });

        let commander = base.commander();
        let c = Arc::clone(&core);
        commander.add_command("On", move |_| c.set(true).map(|()| Value::Null));
        let c = Arc::clone(&core);
        commander.add_command("Off", move |_| c.set(false).map(|()| Value::Null));
        let c = Arc::clone(&core);
        commander.add_command("Toggle", move |_| c.toggle().map(|()| Value::Null));
        let c = Arc::clone(&core);
        commander.add_command("Brightness", move |params| {
            c.brightness(level_param(params)?).map(|()| Value::Null)
        });

        Self { base, core }
    }

    pub fn pin(&self) -> &str {
        &self.core.pin
    }

    /// Whether the LED is lit.
    pub fn state(&self) -> bool {
        *self.core.high.lock()
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
        self.core.toggle()
    }

    /// # Errors
    ///
    /// [`FerroError::Unsupported`] when the connection has no PWM output.
    pub fn brightness(&self, level: u8) -> Result<(), FerroError> {
        self.core.brightness(level)
    }
}

impl Device for LedDriver {
    fn base(&self) -> &DriverBase {
        &self.base
    }

    fn driver_type(&self) -> &'static str {
        "LED"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::NameCell;
    use crate::sim::{SimAdaptor, WriteKind};
    use ferrobot_types::Params;

    /// Digital output without PWM.
    struct PlainGpio {
        name: NameCell,
    }

    impl Connection for PlainGpio {
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
            "PlainGpio"
        }
    }

    impl DigitalWriter for PlainGpio {
        fn digital_write(&self, _pin: &str, _level: u8) -> Result<(), FerroError> {
            Ok(())
        }
    }

    fn sim() -> Arc<SimAdaptor> {
        let sim = Arc::new(SimAdaptor::new());
        sim.connect().unwrap();
        sim
    }

    #[test]
    fn on_off_toggle_track_state() {
        let sim = sim();
        let led = LedDriver::new(Arc::clone(&sim), "13");
        assert!(!led.state());
        led.on().unwrap();
        assert!(led.state());
        led.toggle().unwrap();
        assert!(!led.state());
        led.toggle().unwrap();
        led.off().unwrap();
        assert_eq!(sim.written(WriteKind::Digital, "13"), vec![1, 0, 1, 0]);
    }

    #[test]
    fn brightness_uses_pwm() {
        let sim = sim();
        let led = LedDriver::new(Arc::clone(&sim), "3");
        let mut params = Params::new();
        params.insert("level".into(), Value::from(200));
        led.commander().call("Brightness", &params).unwrap().unwrap();
        assert_eq!(sim.written(WriteKind::Pwm, "3"), vec![200]);
        assert!(led.state());

        params.insert("level".into(), Value::from(300));
        let err = led.commander().call("Brightness", &params).unwrap().unwrap_err();
        assert!(matches!(err, FerroError::Command(_)));
    }

    #[test]
    fn brightness_without_pwm_is_unsupported() {
        let gpio = Arc::new(PlainGpio {
            name: NameCell::new("plain"),
        });
        let led = LedDriver::new(gpio, "1");
        led.on().unwrap();
        let err = led.brightness(10).unwrap_err();
        assert_eq!(err.to_string(), "plain does not support PwmWrite");
        assert!(led.state());
    }

    #[test]
    fn write_failure_keeps_state() {
        let sim = Arc::new(SimAdaptor::new());
        let led = LedDriver::new(Arc::clone(&sim), "13");
        assert!(led.commander().call("On", &Params::new()).unwrap().is_err());
        assert!(!led.state());
    }
}
