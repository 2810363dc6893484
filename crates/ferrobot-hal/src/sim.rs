//! In-process simulation adaptor for tests, CI and demos without physical
//! hardware.
//!
//! [`SimAdaptor`] implements every capability trait. Reads return scripted
//! values (or a generator, or the last value), writes are recorded so tests
//! can assert on them, and the serial/SPI sides loop back.
//!
//! # Example
//!
//! ```rust
//! use ferrobot_hal::{AnalogReader, Connection, SimAdaptor};
//!
//! let sim = SimAdaptor::new();
//! sim.script_analog("A0", [Ok(5), Ok(7)]);
//! sim.connect().unwrap();
//! assert_eq!(sim.analog_read("A0").unwrap(), 5);
//! assert_eq!(sim.analog_read("A0").unwrap(), 7);
//! // scripts exhausted: the last value repeats
//! assert_eq!(sim.analog_read("A0").unwrap(), 7);
//! ```

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use ferrobot_types::FerroError;
use ferrobot_types::util::default_name;
use parking_lot::Mutex;
use tracing::debug;

use crate::connection::{
    AnalogReader, AnalogWriter, BleConnector, Connection, DigitalReader, DigitalWriter,
    NameCell, NotificationHandler, PwmWriter, SerialReader, SerialWriter, ServoWriter,
    SpiConnector, SpiOperations,
};
use crate::i2c::{I2cConnector, I2cOperations};

/// Kind of a recorded pin write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Analog,
    Digital,
    Pwm,
    Servo,
}

/// One recorded pin write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimWrite {
    pub kind: WriteKind,
    pub pin: String,
    pub value: i32,
}

type Script = VecDeque<Result<i32, FerroError>>;
type Generator = Box<dyn FnMut() -> i32 + Send>;

#[derive(Default)]
struct PinBank {
    scripts: HashMap<String, Script>,
    last: HashMap<String, i32>,
    generators: HashMap<String, Generator>,
}

impl PinBank {
    fn read(&mut self, pin: &str) -> Result<i32, FerroError> {
        if let Some(next) = self.scripts.get_mut(pin).and_then(VecDeque::pop_front) {
            if let Ok(v) = next {
                self.last.insert(pin.to_string(), v);
            }
            return next;
        }
        if let Some(generate) = self.generators.get_mut(pin) {
            let v = generate();
            self.last.insert(pin.to_string(), v);
            return Ok(v);
        }
        Ok(self.last.get(pin).copied().unwrap_or(0))
    }
}

#[derive(Default)]
struct SimState {
    connected: bool,
    connect_calls: u32,
    finalize_calls: u32,
    fail_connect: Option<String>,
    analog: PinBank,
    digital: PinBank,
    writes: Vec<SimWrite>,
    serial: VecDeque<u8>,
    characteristics: BTreeMap<String, Vec<u8>>,
    subscribers: HashMap<String, Vec<Arc<dyn Fn(Vec<u8>) + Send + Sync>>>,
    i2c: HashMap<(u32, u8), Arc<SimI2cDevice>>,
    spi: Vec<Arc<SimSpiDevice>>,
}

/// Simulated board implementing every capability trait.
pub struct SimAdaptor {
    name: NameCell,
    port: String,
    state: Mutex<SimState>,
}

impl SimAdaptor {
    pub fn new() -> Self {
        Self::with_port("sim://0")
    }

    pub fn with_port(port: impl Into<String>) -> Self {
        Self {
            name: NameCell::new(default_name("Sim")),
            port: port.into(),
            state: Mutex::new(SimState::default()),
        }
    }

    // -- scripting ----------------------------------------------------------

    /// Queue results returned by successive `analog_read(pin)` calls.
    pub fn script_analog<I>(&self, pin: &str, results: I)
    where
        I: IntoIterator<Item = Result<i32, FerroError>>,
    {
        let mut state = self.state.lock();
        state.analog.scripts.entry(pin.to_string()).or_default().extend(results);
    }

    /// Produce analog readings from `generator` once scripts run out.
    pub fn set_analog_generator<F>(&self, pin: &str, generator: F)
    where
        F: FnMut() -> i32 + Send + 'static,
    {
        self.state.lock().analog.generators.insert(pin.to_string(), Box::new(generator));
    }

    /// Queue results returned by successive `digital_read(pin)` calls.
    pub fn script_digital<I>(&self, pin: &str, results: I)
    where
        I: IntoIterator<Item = Result<i32, FerroError>>,
    {
        let mut state = self.state.lock();
        state.digital.scripts.entry(pin.to_string()).or_default().extend(results);
    }

    /// Hold `pin` at `level` once its script runs out.
    pub fn set_digital(&self, pin: &str, level: i32) {
        self.state.lock().digital.last.insert(pin.to_string(), level);
    }

    /// Make the next `connect` fail with `reason`.
    pub fn fail_next_connect(&self, reason: impl Into<String>) {
        self.state.lock().fail_connect = Some(reason.into());
    }

    /// Set the value of a BLE characteristic.
    pub fn set_characteristic(&self, uuid: &str, data: impl Into<Vec<u8>>) {
        self.state.lock().characteristics.insert(uuid.to_string(), data.into());
    }

    /// Deliver a BLE notification to every subscriber of `uuid`. Returns the
    /// number of handlers called.
    pub fn notify(&self, uuid: &str, data: &[u8]) -> usize {
        let handlers = self.state.lock().subscribers.get(uuid).cloned().unwrap_or_default();
        for handler in &handlers {
            handler(data.to_vec());
        }
        handlers.len()
    }

    // -- inspection ---------------------------------------------------------

    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    pub fn connect_calls(&self) -> u32 {
        self.state.lock().connect_calls
    }

    pub fn finalize_calls(&self) -> u32 {
        self.state.lock().finalize_calls
    }

    pub fn writes(&self) -> Vec<SimWrite> {
        self.state.lock().writes.clone()
    }

    /// Values written to `pin` with the given kind, oldest first.
    pub fn written(&self, kind: WriteKind, pin: &str) -> Vec<i32> {
        self.state
            .lock()
            .writes
            .iter()
            .filter(|w| w.kind == kind && w.pin == pin)
            .map(|w| w.value)
            .collect()
    }

    /// The simulated I²C device at `address` on `bus`, created on demand.
    pub fn i2c_device(&self, bus: u32, address: u8) -> Arc<SimI2cDevice> {
        Arc::clone(
            self.state
                .lock()
                .i2c
                .entry((bus, address))
                .or_insert_with(|| Arc::new(SimI2cDevice::new(address))),
        )
    }

    /// SPI devices handed out so far.
    pub fn spi_devices(&self) -> Vec<Arc<SimSpiDevice>> {
        self.state.lock().spi.clone()
    }

    // -- internals ----------------------------------------------------------

    fn ensure_connected(&self, state: &SimState) -> Result<(), FerroError> {
        if state.connected {
            Ok(())
        } else {
            Err(FerroError::NotConnected(self.name()))
        }
    }

    fn record(&self, kind: WriteKind, pin: &str, value: i32) -> Result<(), FerroError> {
        let mut state = self.state.lock();
        self.ensure_connected(&state)?;
        state.writes.push(SimWrite {
            kind,
            pin: pin.to_string(),
            value,
        });
        Ok(())
    }
}

impl Default for SimAdaptor {
    fn default() -> Self {
        Self::new()
    }
}

impl Connection for SimAdaptor {
    fn name(&self) -> String {
        self.name.get()
    }

    fn set_name(&self, name: &str) {
        self.name.set(name);
    }

    fn connect(&self) -> Result<(), FerroError> {
        let mut state = self.state.lock();
        state.connect_calls += 1;
        if let Some(reason) = state.fail_connect.take() {
            return Err(FerroError::io(self.name(), reason));
        }
        state.connected = true;
        debug!(adaptor = %self.name(), "sim connected");
        Ok(())
    }

    fn finalize(&self) -> Result<(), FerroError> {
        let mut state = self.state.lock();
        state.finalize_calls += 1;
        state.connected = false;
        state.subscribers.clear();
        Ok(())
    }

    fn port(&self) -> String {
        self.port.clone()
    }

    fn adaptor_type(&self) -> &'static str {
        "SimAdaptor"
    }

    fn as_analog_reader(&self) -> Option<&dyn AnalogReader> {
        Some(self)
    }

    fn as_analog_writer(&self) -> Option<&dyn AnalogWriter> {
        Some(self)
    }

    fn as_digital_reader(&self) -> Option<&dyn DigitalReader> {
        Some(self)
    }

    fn as_digital_writer(&self) -> Option<&dyn DigitalWriter> {
        Some(self)
    }

    fn as_pwm_writer(&self) -> Option<&dyn PwmWriter> {
        Some(self)
    }

    fn as_servo_writer(&self) -> Option<&dyn ServoWriter> {
        Some(self)
    }
}

impl AnalogReader for SimAdaptor {
    fn analog_read(&self, pin: &str) -> Result<i32, FerroError> {
        let mut state = self.state.lock();
        self.ensure_connected(&state)?;
        state.analog.read(pin)
    }
}

impl AnalogWriter for SimAdaptor {
    fn analog_write(&self, pin: &str, value: i32) -> Result<(), FerroError> {
        self.record(WriteKind::Analog, pin, value)
    }
}

impl DigitalReader for SimAdaptor {
    fn digital_read(&self, pin: &str) -> Result<i32, FerroError> {
        let mut state = self.state.lock();
        self.ensure_connected(&state)?;
        state.digital.read(pin)
    }
}

impl DigitalWriter for SimAdaptor {
    fn digital_write(&self, pin: &str, level: u8) -> Result<(), FerroError> {
        self.record(WriteKind::Digital, pin, i32::from(level))
    }
}

impl PwmWriter for SimAdaptor {
    fn pwm_write(&self, pin: &str, level: u8) -> Result<(), FerroError> {
        self.record(WriteKind::Pwm, pin, i32::from(level))
    }
}

impl ServoWriter for SimAdaptor {
    fn servo_write(&self, pin: &str, angle: u8) -> Result<(), FerroError> {
        self.record(WriteKind::Servo, pin, i32::from(angle))
    }
}

impl SerialReader for SimAdaptor {
    fn serial_read(&self, buf: &mut [u8]) -> Result<usize, FerroError> {
        let mut state = self.state.lock();
        self.ensure_connected(&state)?;
        let n = buf.len().min(state.serial.len());
        for (slot, byte) in buf.iter_mut().zip(state.serial.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl SerialWriter for SimAdaptor {
    fn serial_write(&self, data: &[u8]) -> Result<usize, FerroError> {
        let mut state = self.state.lock();
        self.ensure_connected(&state)?;
        state.serial.extend(data.iter().copied());
        Ok(data.len())
    }
}

impl BleConnector for SimAdaptor {
    fn address(&self) -> String {
        self.port.clone()
    }

    fn disconnect(&self) -> Result<(), FerroError> {
        let mut state = self.state.lock();
        state.connected = false;
        state.subscribers.clear();
        Ok(())
    }

    fn read_characteristic(&self, uuid: &str) -> Result<Vec<u8>, FerroError> {
        let state = self.state.lock();
        self.ensure_connected(&state)?;
        state
            .characteristics
            .get(uuid)
            .cloned()
            .ok_or_else(|| FerroError::Config(format!("unknown characteristic {uuid}")))
    }

    fn write_characteristic(&self, uuid: &str, data: &[u8]) -> Result<(), FerroError> {
        let mut state = self.state.lock();
        self.ensure_connected(&state)?;
        state.characteristics.insert(uuid.to_string(), data.to_vec());
        Ok(())
    }

    fn subscribe(&self, uuid: &str, handler: NotificationHandler) -> Result<(), FerroError> {
        let mut state = self.state.lock();
        self.ensure_connected(&state)?;
        state
            .subscribers
            .entry(uuid.to_string())
            .or_default()
            .push(Arc::from(handler));
        Ok(())
    }
}

impl I2cConnector for SimAdaptor {
    fn get_i2c_connection(&self, address: u8, bus: u32) -> Result<Arc<dyn I2cOperations>, FerroError> {
        {
            let state = self.state.lock();
            self.ensure_connected(&state)?;
        }
        if bus > 1 {
            return Err(FerroError::Config(format!("bus number {bus} out of range")));
        }
        Ok(self.i2c_device(bus, address))
    }

    fn default_i2c_bus(&self) -> u32 {
        1
    }
}

impl SpiConnector for SimAdaptor {
    fn get_spi_connection(
        &self,
        bus: u32,
        chip: u32,
        mode: u8,
        bits: u8,
        max_speed_hz: u32,
    ) -> Result<Arc<dyn SpiOperations>, FerroError> {
        let mut state = self.state.lock();
        self.ensure_connected(&state)?;
        if mode > 3 {
            return Err(FerroError::Config(format!("SPI mode {mode} out of range")));
        }
        let device = Arc::new(SimSpiDevice {
            bus,
            chip,
            bits,
            max_speed_hz,
            transfers: Mutex::new(Vec::new()),
        });
        state.spi.push(Arc::clone(&device));
        Ok(device)
    }
}

// ---------------------------------------------------------------------------
// Simulated bus devices
// ---------------------------------------------------------------------------

/// A simulated I²C device: 256 byte registers, a queue of bytes returned by
/// raw reads, and a log of raw writes.
pub struct SimI2cDevice {
    address: u8,
    registers: Mutex<[u8; 256]>,
    read_queue: Mutex<VecDeque<u8>>,
    writes: Mutex<Vec<Vec<u8>>>,
}

impl SimI2cDevice {
    fn new(address: u8) -> Self {
        Self {
            address,
            registers: Mutex::new([0; 256]),
            read_queue: Mutex::new(VecDeque::new()),
            writes: Mutex::new(Vec::new()),
        }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Queue bytes for raw reads. An empty queue reads as zeros.
    pub fn queue_read(&self, bytes: &[u8]) {
        self.read_queue.lock().extend(bytes.iter().copied());
    }

    pub fn register(&self, reg: u8) -> u8 {
        self.registers.lock()[usize::from(reg)]
    }

    pub fn set_register(&self, reg: u8, value: u8) {
        self.registers.lock()[usize::from(reg)] = value;
    }

    /// Every raw write and register write (`[reg, value]`), oldest first.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.writes.lock().clone()
    }
}

impl I2cOperations for SimI2cDevice {
    fn read(&self, buf: &mut [u8]) -> Result<usize, FerroError> {
        let mut queue = self.read_queue.lock();
        for slot in buf.iter_mut() {
            *slot = queue.pop_front().unwrap_or(0);
        }
        Ok(buf.len())
    }

    fn write(&self, data: &[u8]) -> Result<usize, FerroError> {
        self.writes.lock().push(data.to_vec());
        Ok(data.len())
    }

    fn read_byte_data(&self, reg: u8) -> Result<u8, FerroError> {
        Ok(self.register(reg))
    }

    fn write_byte_data(&self, reg: u8, value: u8) -> Result<(), FerroError> {
        self.set_register(reg, value);
        self.writes.lock().push(vec![reg, value]);
        Ok(())
    }
}

/// A simulated SPI device looping transmitted bytes back.
pub struct SimSpiDevice {
    pub bus: u32,
    pub chip: u32,
    pub bits: u8,
    pub max_speed_hz: u32,
    transfers: Mutex<Vec<Vec<u8>>>,
}

impl SimSpiDevice {
    pub fn transfers(&self) -> Vec<Vec<u8>> {
        self.transfers.lock().clone()
    }
}

impl SpiOperations for SimSpiDevice {
    fn transfer(&self, tx: &[u8], rx: &mut [u8]) -> Result<(), FerroError> {
        if tx.len() != rx.len() {
            return Err(FerroError::Protocol(format!(
                "SPI transfer length mismatch: tx {} rx {}",
                tx.len(),
                rx.len()
            )));
        }
        rx.copy_from_slice(tx);
        self.transfers.lock().push(tx.to_vec());
        Ok(())
    }

    fn close(&self) -> Result<(), FerroError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn connected() -> SimAdaptor {
        let sim = SimAdaptor::new();
        sim.connect().unwrap();
        sim
    }

    #[test]
    fn io_requires_connect() {
        let sim = SimAdaptor::new();
        assert!(matches!(sim.analog_read("A0"), Err(FerroError::NotConnected(_))));
        assert!(matches!(sim.digital_write("13", 1), Err(FerroError::NotConnected(_))));
        sim.connect().unwrap();
        assert!(sim.analog_read("A0").is_ok());
        sim.finalize().unwrap();
        assert!(!sim.is_connected());
        assert_eq!((sim.connect_calls(), sim.finalize_calls()), (1, 1));
    }

    #[test]
    fn scripted_reads_then_generator() {
        let sim = connected();
        sim.script_analog("A0", [Ok(1), Err(FerroError::io("A0", "glitch")), Ok(3)]);
        let mut n = 10;
        sim.set_analog_generator("A0", move || {
            n += 1;
            n
        });
        assert_eq!(sim.analog_read("A0").unwrap(), 1);
        assert!(sim.analog_read("A0").is_err());
        assert_eq!(sim.analog_read("A0").unwrap(), 3);
        assert_eq!(sim.analog_read("A0").unwrap(), 11);
        assert_eq!(sim.analog_read("A0").unwrap(), 12);
    }

    #[test]
    fn fail_next_connect_fails_once() {
        let sim = SimAdaptor::new();
        sim.fail_next_connect("port busy");
        assert!(sim.connect().unwrap_err().to_string().contains("port busy"));
        assert!(sim.connect().is_ok());
    }

    #[test]
    fn writes_are_recorded_by_kind() {
        let sim = connected();
        sim.digital_write("13", 1).unwrap();
        sim.pwm_write("3", 128).unwrap();
        sim.digital_write("13", 0).unwrap();
        assert_eq!(sim.written(WriteKind::Digital, "13"), vec![1, 0]);
        assert_eq!(sim.written(WriteKind::Pwm, "3"), vec![128]);
        assert_eq!(sim.writes().len(), 3);
    }

    #[test]
    fn serial_loops_back() {
        let sim = connected();
        assert_eq!(sim.serial_write(b"hello").unwrap(), 5);
        let mut buf = [0u8; 3];
        assert_eq!(sim.serial_read(&mut buf).unwrap(), 3);
        assert_eq!(&buf, b"hel");
        assert_eq!(sim.serial_read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"lo");
    }

    #[test]
    fn ble_characteristics_and_notifications() {
        let sim = connected();
        sim.write_characteristic("2a19", &[99]).unwrap();
        assert_eq!(sim.read_characteristic("2a19").unwrap(), vec![99]);
        assert!(sim.read_characteristic("ffff").is_err());

        let seen = Arc::new(AtomicUsize::new(0));
        let s = Arc::clone(&seen);
        sim.subscribe("2a19", Box::new(move |data| {
            s.fetch_add(data.len(), Ordering::SeqCst);
        }))
        .unwrap();
        assert_eq!(sim.notify("2a19", &[1, 2, 3]), 1);
        assert_eq!(seen.load(Ordering::SeqCst), 3);

        sim.disconnect().unwrap();
        assert_eq!(sim.notify("2a19", &[1]), 0);
    }

    #[test]
    fn i2c_devices_are_shared_per_address() {
        let sim = connected();
        let ops = sim.get_i2c_connection(0x48, sim.default_i2c_bus()).unwrap();
        ops.write_byte_data(0x10, 0xAB).unwrap();
        ops.write_word_data(0x20, 0x1234).unwrap();
        let dev = sim.i2c_device(1, 0x48);
        assert_eq!(dev.register(0x10), 0xAB);
        assert_eq!(ops.read_word_data(0x20).unwrap(), 0x1234);
        dev.queue_read(&[7]);
        assert_eq!(ops.read_byte().unwrap(), 7);
        assert!(sim.get_i2c_connection(0x48, 5).is_err());
    }

    #[test]
    fn spi_loops_back() {
        let sim = connected();
        let spi = sim.get_spi_connection(0, 0, 0, 8, 500_000).unwrap();
        let mut rx = [0u8; 2];
        spi.transfer(&[0xDE, 0xAD], &mut rx).unwrap();
        assert_eq!(rx, [0xDE, 0xAD]);
        assert!(spi.transfer(&[1], &mut rx).is_err());
        assert_eq!(sim.spi_devices()[0].transfers(), vec![vec![0xDE, 0xAD]]);
        assert!(sim.get_spi_connection(0, 0, 7, 8, 1).is_err());
    }
}
