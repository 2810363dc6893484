//! [`AnalogSensorDriver`] – the periodic acquisition engine.
//!
//! A started sensor reads its pin every interval and publishes:
//!
//! * `"data"` with the raw reading when it changed and is not `-1`,
//! * `"value"` with the scaled reading when it changed and is not `-1.0`,
//! * `"error"` with the message when the read failed (cached values are kept).
//!
//! The first read happens right away; both caches start at zero, so an
//! initial reading of `0` is not published.

use std::sync::Arc;
use std::time::Duration;

use ferrobot_middleware::Eventer;
use ferrobot_types::{FerroError, Value};
use parking_lot::Mutex;
use tracing::debug;

use super::{DATA, ERROR, VALUE};
use crate::connection::{AnalogReader, Connection};
use crate::device::{Device, DriverBase, read_reply};
use crate::poller::Poller;
use crate::scaler::{self, SensorScaler};

pub const DEFAULT_READ_INTERVAL: Duration = Duration::from_millis(10);

const NO_READING: i32 = -1;

struct SensorState {
    scaler: SensorScaler,
    last_raw: i32,
    last_value: f64,
}

struct SensorCore {
    reader: Arc<dyn AnalogReader>,
    pin: String,
    state: Mutex<SensorState>,
}

impl SensorCore {
    /// Read, scale and cache. The lock is held across the hardware call so
    /// a polling tick and a command never interleave on the connection.
    fn read(&self) -> Result<(i32, f64), FerroError> {
        let mut state = self.state.lock();
        let raw = self.reader.analog_read(&self.pin)?;
        let value = (state.scaler)(raw);
        state.last_raw = raw;
        state.last_value = value;
        Ok((raw, value))
    }
}

/// Polled analog input.
///
/// Commands: `Read` and `ReadRaw`, both replying `{"val", "err"}`.
pub struct AnalogSensorDriver {
    base: DriverBase,
    kind: &'static str,
    eventer: Eventer,
    core: Arc<SensorCore>,
    interval: Duration,
    poller: Poller,
}

impl AnalogSensorDriver {
    pub fn new<C: AnalogReader + 'static>(connection: Arc<C>, pin: &str) -> Self {
        Self::with_kind(connection, pin, "AnalogSensor")
    }

    /// A sensor reporting `kind` as its driver type and name prefix.
    pub(crate) fn with_kind<C: AnalogReader + 'static>(
        connection: Arc<C>,
        pin: &str,
        kind: &'static str,
    ) -> Self {
        let conn: Arc<dyn Connection> = connection.clone();
        let base = DriverBase::new(kind, conn);
        let core = Arc::new(SensorCore {
            reader: connection,
            pin: pin.to_string(),
            state: Mutex::new(SensorState {
                scaler: scaler::identity(),
                last_raw: 0,
                last_value: 0.0,
            }),
        });

        let eventer = Eventer::new();
        for topic in [DATA, VALUE, ERROR] {
            eventer.add_event(topic);
        }

        let c = Arc::clone(&core);
        base.commander()
            .add_command("Read", move |_| Ok(read_reply(c.read().map(|(_, v)| v))));
        let c = Arc::clone(&core);
        base.commander()
            .add_command("ReadRaw", move |_| Ok(read_reply(c.read().map(|(raw, _)| raw))));

        Self {
            base,
            kind,
            eventer,
            core,
            interval: DEFAULT_READ_INTERVAL,
            poller: Poller::new(),
        }
    }

    /// Poll every `interval`; zero disables polling.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_scaler(self, scaler: SensorScaler) -> Self {
        self.set_scaler(scaler);
        self
    }

    pub fn set_scaler(&self, scaler: SensorScaler) {
        self.core.state.lock().scaler = scaler;
    }

    pub fn pin(&self) -> &str {
        &self.core.pin
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Read and return the scaled value.
    ///
    /// # Errors
    ///
    /// Propagates the connection's read error.
    pub fn read(&self) -> Result<f64, FerroError> {
        self.core.read().map(|(_, value)| value)
    }

    /// Read and return the raw value.
    ///
    /// # Errors
    ///
    /// Propagates the connection's read error.
    pub fn read_raw(&self) -> Result<i32, FerroError> {
        self.core.read().map(|(raw, _)| raw)
    }

    /// Scaled value of the last successful read.
    pub fn value(&self) -> f64 {
        self.core.state.lock().last_value
    }

    /// Raw value of the last successful read.
    pub fn raw_value(&self) -> i32 {
        self.core.state.lock().last_raw
    }

    pub fn events(&self) -> &Eventer {
        &self.eventer
    }
}

impl Device for AnalogSensorDriver {
    fn base(&self) -> &DriverBase {
        &self.base
    }

    fn driver_type(&self) -> &'static str {
        self.kind
    }

    fn start(&self) -> Result<(), FerroError> {
        if self.interval.is_zero() {
            return Ok(());
        }
        let core = Arc::clone(&self.core);
        let eventer = self.eventer.clone();
        let mut old_raw = 0;
        let mut old_value = 0.0;
        let started = self.poller.start(&self.name(), self.interval, move || match core.read() {
            Err(e) => eventer.publish(ERROR, e.to_string()),
            Ok((raw, value)) => {
                if raw != old_raw && raw != NO_READING {
                    eventer.publish(DATA, raw);
                    old_raw = raw;
                }
                if value != old_value && value != f64::from(NO_READING) {
                    eventer.publish(VALUE, value);
                    old_value = value;
                }
            }
        })?;
        if !started {
            debug!(device = %self.name(), "already polling");
        }
        Ok(())
    }

    fn halt(&self) -> Result<(), FerroError> {
        self.poller.halt();
        Ok(())
    }

    fn eventer(&self) -> Option<&Eventer> {
        Some(&self.eventer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimAdaptor;
    use ferrobot_middleware::EventReceiver;
    use ferrobot_types::Params;

    fn connected_sim() -> Arc<SimAdaptor> {
        let sim = Arc::new(SimAdaptor::new());
        sim.connect().unwrap();
        sim
    }

    fn drain(rx: &mut EventReceiver) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event.payload);
        }
        out
    }

    #[test]
    fn read_applies_scaler_and_caches() {
        let sim = connected_sim();
        sim.script_analog("A0", [Ok(100)]);
        let sensor = AnalogSensorDriver::new(Arc::clone(&sim), "A0")
            .with_scaler(scaler::linear(0, 1000, 0.0, 10.0));
        assert_eq!(sensor.read().unwrap(), 1.0);
        assert_eq!(sensor.raw_value(), 100);
        assert_eq!(sensor.value(), 1.0);
        assert_eq!(sensor.read_raw().unwrap(), 100);
        assert!(sensor.name().starts_with("AnalogSensor-"));
        assert_eq!(sensor.driver_type(), "AnalogSensor");
    }

    #[test]
    fn read_error_keeps_cached_values() {
        let sim = connected_sim();
        sim.script_analog("A0", [Ok(7), Err(FerroError::io("A0", "bus"))]);
        let sensor = AnalogSensorDriver::new(Arc::clone(&sim), "A0");
        sensor.read().unwrap();
        assert!(sensor.read().is_err());
        assert_eq!(sensor.raw_value(), 7);
    }

    #[test]
    fn commands_reply_val_and_err() {
        let sim = connected_sim();
        sim.script_analog("A1", [Ok(12), Err(FerroError::io("A1", "bus"))]);
        let sensor = AnalogSensorDriver::new(Arc::clone(&sim), "A1");
        let reply = sensor.commander().call("ReadRaw", &Params::new()).unwrap().unwrap();
        assert_eq!(reply.as_map().unwrap()["val"], Value::Int(12));
        let reply = sensor.commander().call("Read", &Params::new()).unwrap().unwrap();
        assert!(reply.as_map().unwrap()["val"].is_null());
        assert!(reply.as_map().unwrap()["err"].as_str().unwrap().contains("bus"));
    }

    #[tokio::test(start_paused = true)]
    async fn publishes_only_changes_and_skips_sentinel() {
        let sim = connected_sim();
        sim.script_analog("A0", [5, 5, 5, 7, 7, -1, 8].map(Ok));
        let sensor = AnalogSensorDriver::new(Arc::clone(&sim), "A0");
        let mut data = sensor.events().subscribe(DATA).unwrap();
        let mut values = sensor.events().subscribe(VALUE).unwrap();

        sensor.start().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        sensor.halt().unwrap();

        let expected: Vec<Value> = [5, 7, 8].map(Value::from).to_vec();
        assert_eq!(drain(&mut data), expected);
        let expected: Vec<Value> = [5.0, 7.0, 8.0].map(Value::from).to_vec();
        assert_eq!(drain(&mut values), expected);
    }

    #[tokio::test(start_paused = true)]
    async fn error_does_not_republish_identical_value() {
        let sim = connected_sim();
        sim.script_analog("A0", [Ok(42), Err(FerroError::io("A0", "glitch")), Ok(42)]);
        let sensor = AnalogSensorDriver::new(Arc::clone(&sim), "A0");
        let mut data = sensor.events().subscribe(DATA).unwrap();
        let mut errors = sensor.events().subscribe(ERROR).unwrap();

        sensor.start().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        sensor.halt().unwrap();

        assert_eq!(drain(&mut data), vec![Value::from(42)]);
        let errors = drain(&mut errors);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].as_str().unwrap().contains("glitch"));
    }

    #[tokio::test(start_paused = true)]
    async fn halt_stops_reading() {
        let sim = connected_sim();
        let reads = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let r = Arc::clone(&reads);
        sim.set_analog_generator("A0", move || {
            r.fetch_add(1, std::sync::atomic::Ordering::SeqCst) as i32
        });
        let sensor = AnalogSensorDriver::new(Arc::clone(&sim), "A0")
            .with_interval(Duration::from_millis(20));
        sensor.start().unwrap();
        // a second start does not spawn another loop
        sensor.start().unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        sensor.halt().unwrap();
        let seen = reads.load(std::sync::atomic::Ordering::SeqCst);
        assert_eq!(seen, 3);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(reads.load(std::sync::atomic::Ordering::SeqCst), seen);
    }

    #[tokio::test]
    async fn zero_interval_disables_polling() {
        let sim = connected_sim();
        let sensor = AnalogSensorDriver::new(Arc::clone(&sim), "A0").with_interval(Duration::ZERO);
        sensor.start().unwrap();
        sensor.halt().unwrap();
        assert_eq!(sensor.interval(), Duration::ZERO);
    }
}
