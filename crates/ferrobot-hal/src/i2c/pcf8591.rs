//! PCF8591: 4-channel 8-bit ADC with one 8-bit DAC output.
//!
//! Channels are selected by a textual description (`"s.0"`, `"d.0-1"`,
//! `"m.2-3"`, `"t.1-3"`, …) combining the input mode and the channel inside
//! that mode. Differential readings come back signed (`-128..=127`).
//!
//! The chip returns the result of the *previous* conversion on each read,
//! so every read cycle writes the control byte, drains the stale bytes and
//! then reads the fresh one.

use std::sync::Arc;
use std::time::Duration;

use ferrobot_types::{FerroError, ParamsExt, Value};
use parking_lot::Mutex;
use tracing::debug;

use super::{I2cConnector, I2cOperations};
use crate::connection::Connection;
use crate::device::{Device, DriverBase, read_reply};

pub const PCF8591_DEFAULT_ADDRESS: u8 = 0x48;

const ALL_SINGLE: u8 = 0x00;
const THREE_DIFF: u8 = 0x10;
const MIXED: u8 = 0x20;
const TWO_DIFF: u8 = 0x30;
const ANALOG_OUTPUT_ON: u8 = 0x40;
const AUTO_INCREMENT: u8 = 0x04;
const MODE_CHANNEL_MASK: u8 = 0x33;

const CONVERSION_DELAY: Duration = Duration::from_millis(1);

const MODE_TABLE: &[(&str, u8, u8)] = &[
    ("s.0", ALL_SINGLE, 0),
    ("0", ALL_SINGLE, 0),
    ("s.1", ALL_SINGLE, 1),
    ("1", ALL_SINGLE, 1),
    ("s.2", ALL_SINGLE, 2),
    ("2", ALL_SINGLE, 2),
    ("s.3", ALL_SINGLE, 3),
    ("3", ALL_SINGLE, 3),
    ("d.0-1", TWO_DIFF, 0),
    ("0-1", TWO_DIFF, 0),
    ("d.2-3", TWO_DIFF, 1),
    ("m.0", MIXED, 0),
    ("m.1", MIXED, 1),
    ("m.2-3", MIXED, 2),
    ("t.0-3", THREE_DIFF, 0),
    ("0-3", THREE_DIFF, 0),
    ("t.1-3", THREE_DIFF, 1),
    ("1-3", THREE_DIFF, 1),
    ("t.2-3", THREE_DIFF, 2),
];

/// Input mode and channel selected by a read description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pcf8591ModeChannel {
    pub mode: u8,
    pub channel: u8,
}

impl Pcf8591ModeChannel {
    /// # Errors
    ///
    /// [`FerroError::Config`] for an unknown description, listing the
    /// accepted ones.
    pub fn parse(description: &str) -> Result<Self, FerroError> {
        MODE_TABLE
            .iter()
            .find(|(d, _, _)| *d == description)
            .map(|&(_, mode, channel)| Self { mode, channel })
            .ok_or_else(|| {
                let accepted: Vec<&str> = MODE_TABLE.iter().map(|(d, _, _)| *d).collect();
                FerroError::Config(format!(
                    "unknown description '{description}' for read analog value, accepted values: {}",
                    accepted.join(", ")
                ))
            })
    }

    pub fn is_differential(&self) -> bool {
        match self.mode {
            TWO_DIFF | THREE_DIFF => true,
            MIXED => self.channel == 2,
            _ => false,
        }
    }

    fn control_bits(&self) -> u8 {
        self.mode | (self.channel & !AUTO_INCREMENT)
    }
}

struct Pcf8591State {
    address: u8,
    bus: Option<u32>,
    additional_read_write: u8,
    additional_read: u8,
    force_refresh: bool,
    ops: Option<Arc<dyn I2cOperations>>,
    last_ctrl: u8,
    last_output: u8,
}

struct Pcf8591Inner {
    name: String,
    connector: Arc<dyn I2cConnector>,
    // Serialises the write/read sequence of one conversion.
    state: Mutex<Pcf8591State>,
}

impl Pcf8591Inner {
    fn ops(&self, state: &Pcf8591State) -> Result<Arc<dyn I2cOperations>, FerroError> {
        state
            .ops
            .clone()
            .ok_or_else(|| FerroError::NotConnected(self.name.clone()))
    }

    fn write_ctrl(&self, state: &mut Pcf8591State, ctrl: u8, force: bool) -> Result<(), FerroError> {
        if state.last_ctrl != ctrl || force {
            self.ops(state)?.write_byte(ctrl)?;
            state.last_ctrl = ctrl;
        }
        Ok(())
    }

    fn analog_read(&self, description: &str) -> Result<i32, FerroError> {
        let mc = Pcf8591ModeChannel::parse(description)?;
        let mut state = self.state.lock();
        let ops = self.ops(&state)?;
        let ctrl = (state.last_ctrl & !MODE_CHANNEL_MASK) | mc.control_bits();

        let cycles = state.additional_read_write + 1;
        let mut buf = vec![0u8; 1 + usize::from(state.additional_read)];
        let mut raw = 0u8;
        for cycle in 1..=cycles {
            let force = state.force_refresh || cycle > 1;
            self.write_ctrl(&mut state, ctrl, force)?;
            let n = ops.read(&mut buf)?;
            if n != buf.len() {
                return Err(FerroError::Protocol(format!(
                    "not enough bytes ({n} of {}) read",
                    buf.len()
                )));
            }
            std::thread::sleep(CONVERSION_DELAY);
            raw = ops.read_byte()?;
        }

        let value = i32::from(raw);
        Ok(if mc.is_differential() && raw > 127 { value - 256 } else { value })
    }

    fn analog_write(&self, value: i32) -> Result<(), FerroError> {
        let mut state = self.state.lock();
        let byte = (value & 0xFF) as u8;
        if state.last_output == byte {
            debug!(device = %self.name, value = byte, "analog write skipped, value unchanged");
            return Ok(());
        }
        let ctrl = state.last_ctrl | ANALOG_OUTPUT_ON;
        self.ops(&state)?.write_byte_data(ctrl, byte)?;
        state.last_ctrl = ctrl;
        state.last_output = byte;
        Ok(())
    }

    fn analog_output_state(&self, on: bool) -> Result<(), FerroError> {
        let mut state = self.state.lock();
        let ctrl = if on {
            state.last_ctrl | ANALOG_OUTPUT_ON
        } else {
            state.last_ctrl & !ANALOG_OUTPUT_ON
        };
        let force = state.force_refresh;
        self.write_ctrl(&mut state, ctrl, force)
    }
}

/// Driver for the PCF8591 ADC/DAC.
///
/// Commands: `AnalogRead` (param `description`) and `AnalogWrite`
/// (param `val`).
pub struct Pcf8591Driver {
    base: DriverBase,
    inner: Arc<Pcf8591Inner>,
}

impl Pcf8591Driver {
    pub fn new<C: I2cConnector + 'static>(connector: Arc<C>) -> Self {
        let connection: Arc<dyn Connection> = connector.clone();
        let base = DriverBase::new("PCF8591", connection);
        let inner = Arc::new(Pcf8591Inner {
            name: base.name(),
            connector,
            state: Mutex::new(Pcf8591State {
                address: PCF8591_DEFAULT_ADDRESS,
                bus: None,
                additional_read_write: 0,
                additional_read: 0,
                force_refresh: false,
                ops: None,
                last_ctrl: 0,
                last_output: 0,
            }),
        });

        let reader = Arc::clone(&inner);
        base.commander().add_command("AnalogRead", move |params| {
            let description = params.require_str("description")?;
            Ok(read_reply(reader.analog_read(description)))
        });
        let writer = Arc::clone(&inner);
        base.commander().add_command("AnalogWrite", move |params| {
            let val = params.require_i64("val")?;
            writer.analog_write(val as i32).map(|()| Value::Null)
        });

        Self { base, inner }
    }

    pub fn with_address(self, address: u8) -> Self {
        self.inner.state.lock().address = address;
        self
    }

    pub fn with_bus(self, bus: u32) -> Self {
        self.inner.state.lock().bus = Some(bus);
        self
    }

    /// Extra write/read cycles and extra drained bytes per read, needed for
    /// stable readings at 400 kbit/s. `None` selects `(1, 2)`.
    pub fn with_stabilization(self, additional: Option<(u8, u8)>) -> Self {
        let (rw, r) = additional.unwrap_or((1, 2));
        {
            let mut state = self.inner.state.lock();
            state.additional_read_write = rw;
            state.additional_read = r;
        }
        self
    }

    /// Write the control byte on every read even when unchanged.
    pub fn with_force_refresh(self, force: bool) -> Self {
        self.inner.state.lock().force_refresh = force;
        self
    }

    /// Read the channel selected by `description`.
    ///
    /// # Errors
    ///
    /// Unknown description, not started, or a bus error.
    pub fn analog_read(&self, description: &str) -> Result<i32, FerroError> {
        self.inner.analog_read(description)
    }

    /// Write the DAC output. Skipped when the value is unchanged.
    ///
    /// # Errors
    ///
    /// Not started, or a bus error.
    pub fn analog_write(&self, value: i32) -> Result<(), FerroError> {
        self.inner.analog_write(value)
    }

    /// # Errors
    ///
    /// Not started, or a bus error.
    pub fn analog_output_state(&self, on: bool) -> Result<(), FerroError> {
        self.inner.analog_output_state(on)
    }
}

impl Device for Pcf8591Driver {
    fn base(&self) -> &DriverBase {
        &self.base
    }

    fn driver_type(&self) -> &'static str {
        "PCF8591"
    }

    fn start(&self) -> Result<(), FerroError> {
        {
            let mut state = self.inner.state.lock();
            let bus = state.bus.unwrap_or_else(|| self.inner.connector.default_i2c_bus());
            let ops = self.inner.connector.get_i2c_connection(state.address, bus)?;
            state.ops = Some(ops);
        }
        self.inner.analog_output_state(false)
    }

    fn halt(&self) -> Result<(), FerroError> {
        self.inner.analog_output_state(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimAdaptor;
    use ferrobot_types::Params;

    fn started(configure: impl FnOnce(Pcf8591Driver) -> Pcf8591Driver) -> (Arc<SimAdaptor>, Pcf8591Driver) {
        let sim = Arc::new(SimAdaptor::new());
        sim.connect().unwrap();
        let driver = configure(Pcf8591Driver::new(Arc::clone(&sim)));
        driver.start().unwrap();
        (sim, driver)
    }

    #[test]
    fn parses_descriptions() {
        let mc = Pcf8591ModeChannel::parse("d.2-3").unwrap();
        assert_eq!(mc, Pcf8591ModeChannel { mode: TWO_DIFF, channel: 1 });
        assert!(mc.is_differential());
        assert!(!Pcf8591ModeChannel::parse("m.1").unwrap().is_differential());
        assert!(Pcf8591ModeChannel::parse("m.2-3").unwrap().is_differential());
        assert!(!Pcf8591ModeChannel::parse("3").unwrap().is_differential());
        let err = Pcf8591ModeChannel::parse("x.9").unwrap_err().to_string();
        assert!(err.contains("'x.9'") && err.contains("t.2-3"));
    }

    #[test]
    fn single_ended_read_writes_control_and_drops_stale_byte() {
        let (sim, driver) = started(|d| d);
        let dev = sim.i2c_device(1, PCF8591_DEFAULT_ADDRESS);
        dev.queue_read(&[0x10, 0x55]);
        assert_eq!(driver.analog_read("s.1").unwrap(), 0x55);
        assert_eq!(dev.writes(), vec![vec![0x01]]);

        // unchanged control byte is not written again
        dev.queue_read(&[0, 0x56]);
        assert_eq!(driver.analog_read("1").unwrap(), 0x56);
        assert_eq!(dev.writes().len(), 1);
    }

    #[test]
    fn differential_reads_are_signed() {
        let (sim, driver) = started(|d| d);
        let dev = sim.i2c_device(1, PCF8591_DEFAULT_ADDRESS);
        dev.queue_read(&[0, 200]);
        assert_eq!(driver.analog_read("d.0-1").unwrap(), -56);
        dev.queue_read(&[0, 100]);
        assert_eq!(driver.analog_read("0-1").unwrap(), 100);
        assert_eq!(dev.writes(), vec![vec![TWO_DIFF]]);
    }

    #[test]
    fn stabilization_repeats_the_cycle() {
        let (sim, driver) = started(|d| d.with_stabilization(None).with_address(0x49));
        let dev = sim.i2c_device(1, 0x49);
        // two cycles of (3 drained + 1 result)
        dev.queue_read(&[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(driver.analog_read("s.2").unwrap(), 8);
        // second cycle forces the control byte
        assert_eq!(dev.writes(), vec![vec![0x02], vec![0x02]]);
    }

    #[test]
    fn dac_write_skipped_when_unchanged() {
        let (sim, driver) = started(|d| d);
        let dev = sim.i2c_device(1, PCF8591_DEFAULT_ADDRESS);
        driver.analog_write(100).unwrap();
        driver.analog_write(100).unwrap();
        assert_eq!(dev.writes(), vec![vec![ANALOG_OUTPUT_ON, 100]]);

        driver.halt().unwrap();
        assert_eq!(dev.writes().last(), Some(&vec![0x00]));
    }

    #[test]
    fn commands_report_value_and_error() {
        let (sim, driver) = started(|d| d.with_force_refresh(true));
        sim.i2c_device(1, PCF8591_DEFAULT_ADDRESS).queue_read(&[0, 42]);
        let mut params = Params::new();
        params.insert("description".into(), Value::from("s.0"));
        let out = driver.commander().call("AnalogRead", &params).unwrap().unwrap();
        assert_eq!(out.as_map().unwrap()["val"], Value::Int(42));
        assert!(out.as_map().unwrap()["err"].is_null());

        params.insert("description".into(), Value::from("bogus"));
        let out = driver.commander().call("AnalogRead", &params).unwrap().unwrap();
        assert!(out.as_map().unwrap()["err"].as_str().unwrap().contains("bogus"));

        let mut write = Params::new();
        write.insert("val".into(), Value::from(7));
        assert!(driver.commander().call("AnalogWrite", &write).unwrap().is_ok());
    }

    #[test]
    fn read_before_start_fails() {
        let sim = Arc::new(SimAdaptor::new());
        let driver = Pcf8591Driver::new(Arc::clone(&sim));
        assert!(matches!(driver.analog_read("s.0"), Err(FerroError::NotConnected(_))));
        // start needs a connected bus
        assert!(driver.start().is_err());
    }
}
