use std::sync::Arc;

use ferrobot_types::{FerroError, ParamsExt, Value};
use parking_lot::Mutex;

use crate::connection::{AnalogWriter, Connection};
use crate::device::{Device, DriverBase};
use crate::scaler::{self, ActuatorScaler};

struct ActuatorState {
    scaler: ActuatorScaler,
    last_raw: i32,
    last_value: f64,
}

struct ActuatorCore {
    writer: Arc<dyn AnalogWriter>,
    pin: String,
    state: Mutex<ActuatorState>,
}

impl ActuatorCore {
    fn write(&self, value: f64) -> Result<(), FerroError> {
        let mut state = self.state.lock();
        let raw = (state.scaler)(value);
        self.writer.analog_write(&self.pin, raw)?;
        state.last_value = value;
        state.last_raw = raw;
        Ok(())
    }

    fn write_raw(&self, raw: i32) -> Result<(), FerroError> {
        let mut state = self.state.lock();
        self.writer.analog_write(&self.pin, raw)?;
        state.last_raw = raw;
        Ok(())
    }
}

/// Analog output driven by a float value through a scaler (truncation by
/// default).
///
/// Commands: `Write` and `WriteRaw`, both taking `val`.
pub struct AnalogActuatorDriver {
    base: DriverBase,
    core: Arc<ActuatorCore>,
}

impl AnalogActuatorDriver {
    pub fn new<C: AnalogWriter + 'static>(connection: Arc<C>, pin: &str) -> Self {
        let conn: Arc<dyn Connection> = connection.clone();
        let base = DriverBase::new("AnalogActuator", conn);
        let core = Arc::new(ActuatorCore {
            writer: connection,
            pin: pin.to_string(),
            state: Mutex::new(ActuatorState {
                scaler: scaler::truncate(),
                last_raw: 0,
                last_value: 0.0,
            }),
        });

        let c = Arc::clone(&core);
        base.commander().add_command("Write", move |params| {
            c.write(params.require_f64("val")?).map(|()| Value::Null)
        });
        let c = Arc::clone(&core);
        base.commander().add_command("WriteRaw", move |params| {
            let raw = i32::try_from(params.require_i64("val")?)
                .map_err(|e| FerroError::Command(format!("parameter 'val': {e}")))?;
            c.write_raw(raw).map(|()| Value::Null)
        });

        Self { base, core }
    }

    pub fn with_scaler(self, scaler: ActuatorScaler) -> Self {
        self.set_scaler(scaler);
        self
    }

    pub fn set_scaler(&self, scaler: ActuatorScaler) {
        self.core.state.lock().scaler = scaler;
    }

    pub fn pin(&self) -> &str {
        &self.core.pin
    }

    /// Scale `value` and write it.
    ///
    /// # Errors
    ///
    /// Propagates the connection's write error; cached values are kept.
    pub fn write(&self, value: f64) -> Result<(), FerroError> {
        self.core.write(value)
    }

    /// Write `raw` unscaled.
    ///
    /// # Errors
    ///
    /// Propagates the connection's write error.
    pub fn write_raw(&self, raw: i32) -> Result<(), FerroError> {
        self.core.write_raw(raw)
    }

    /// Last value passed to a successful [`write`](Self::write).
    pub fn value(&self) -> f64 {
        self.core.state.lock().last_value
    }

    pub fn raw_value(&self) -> i32 {
        self.core.state.lock().last_raw
    }
}

impl Device for AnalogActuatorDriver {
    fn base(&self) -> &DriverBase {
        &self.base
    }

    fn driver_type(&self) -> &'static str {
        "AnalogActuator"
    }
}
