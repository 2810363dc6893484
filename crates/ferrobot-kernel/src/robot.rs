//! [`Robot`] – a named group of connections and devices with optional work.
//!
//! # Start
//!
//! 1. Connections are connected in declaration order. On failure the ones
//!    already connected are finalized in reverse order.
//! 2. Devices are started in declaration order. On failure the ones already
//!    started are halted in reverse order, then every connection is
//!    finalized in reverse order.
//! 3. The robot is marked running and, with auto-run on, the work is
//!    spawned with a fresh [`ShutdownToken`]. A panicking work task is logged
//!    and clears the running flag; it never reaches the caller of `start`,
//!    and the robot still counts as started until it is halted.
//!
//! # Halt
//!
//! Best effort: signal the work token, cancel scheduled units, halt devices
//! in reverse order, finalize connections in reverse order, and return every
//! error collected on the way. Halting a robot that was never started, or
//! is already halted, does nothing.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use ferrobot_hal::{Connection, Device};
use ferrobot_middleware::{Commander, Eventer, ShutdownSignal, ShutdownToken};
use ferrobot_types::util::default_name;
use ferrobot_types::{FerroError, Params, RobotJson, Value};
use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::work::{WorkRegistry, WorkUnitInfo};

/// User work: called on every start with a token that resolves at halt.
pub type Work =
    Arc<dyn Fn(ShutdownToken) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct Robot {
    name: String,
    connections: RwLock<Vec<Arc<dyn Connection>>>,
    devices: RwLock<Vec<Arc<dyn Device>>>,
    commander: Commander,
    eventer: Eventer,
    work: RwLock<Option<Work>>,
    auto_run: AtomicBool,
    running: Arc<AtomicBool>,
    /// Set by a successful `start`, cleared by `halt`. Unlike `running`, work
    /// panics leave it alone.
    started: AtomicBool,
    shutdown: Mutex<Option<ShutdownSignal>>,
    registry: WorkRegistry,
}

impl Robot {
    /// An empty name is replaced by `"Robot-{hex5}"`.
    pub fn new(name: &str) -> Self {
        let name = if name.is_empty() {
            default_name("Robot")
        } else {
            name.to_string()
        };
        Self {
            name,
            connections: RwLock::new(Vec::new()),
            devices: RwLock::new(Vec::new()),
            commander: Commander::new(),
            eventer: Eventer::new(),
            work: RwLock::new(None),
            auto_run: AtomicBool::new(true),
            running: Arc::new(AtomicBool::new(false)),
            started: AtomicBool::new(false),
            shutdown: Mutex::new(None),
            registry: WorkRegistry::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // -----------------------------------------------------------------------
    // Composition
    // -----------------------------------------------------------------------

    /// # Errors
    ///
    /// [`FerroError::Config`] if a connection with the same name exists.
    pub fn add_connection(&self, connection: Arc<dyn Connection>) -> Result<(), FerroError> {
        let mut connections = self.connections.write();
        let name = connection.name();
        if connections.iter().any(|c| c.name() == name) {
            return Err(FerroError::Config(format!(
                "robot '{}' already has a connection named '{name}'",
                self.name
            )));
        }
        connections.push(connection);
        Ok(())
    }

    /// # Errors
    ///
    /// [`FerroError::Config`] if the device's connection is not one of this
    /// robot's connections, or a device with the same name exists.
    pub fn add_device(&self, device: Arc<dyn Device>) -> Result<(), FerroError> {
        let connection = device.connection().name();
        if self.connection(&connection).is_none() {
            return Err(FerroError::Config(format!(
                "device '{}' uses connection '{connection}', which robot '{}' does not own",
                device.name(),
                self.name
            )));
        }
        let mut devices = self.devices.write();
        let name = device.name();
        if devices.iter().any(|d| d.name() == name) {
            return Err(FerroError::Config(format!(
                "robot '{}' already has a device named '{name}'",
                self.name
            )));
        }
        devices.push(device);
        Ok(())
    }

    pub fn set_work<F, Fut>(&self, work: F)
    where
        F: Fn(ShutdownToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let work: Work = Arc::new(move |token| Box::pin(work(token)));
        *self.work.write() = Some(work);
    }

    /// Whether `start` spawns the work. On by default.
    pub fn set_auto_run(&self, auto_run: bool) {
        self.auto_run.store(auto_run, Ordering::SeqCst);
    }

    // -----------------------------------------------------------------------
    // Lookups
    // -----------------------------------------------------------------------

    pub fn connection(&self, name: &str) -> Option<Arc<dyn Connection>> {
        self.connections.read().iter().find(|c| c.name() == name).cloned()
    }

    pub fn device(&self, name: &str) -> Option<Arc<dyn Device>> {
        self.devices.read().iter().find(|d| d.name() == name).cloned()
    }

    pub fn connections(&self) -> Vec<Arc<dyn Connection>> {
        self.connections.read().clone()
    }

    pub fn devices(&self) -> Vec<Arc<dyn Device>> {
        self.devices.read().clone()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    pub fn device_count(&self) -> usize {
        self.devices.read().len()
    }

    pub fn commander(&self) -> &Commander {
        &self.commander
    }

    pub fn add_command<F>(&self, name: &str, handler: F)
    where
        F: Fn(&Params) -> Result<Value, FerroError> + Send + Sync + 'static,
    {
        self.commander.add_command(name, handler);
    }

    /// Robot-level events, streamed by the API.
    pub fn eventer(&self) -> &Eventer {
        &self.eventer
    }

    pub fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    // -----------------------------------------------------------------------
    // Scheduling
    // -----------------------------------------------------------------------

    /// Run `f` every `period` until the robot halts.
    ///
    /// # Errors
    ///
    /// Zero period, or no Tokio runtime.
    pub fn every<F>(&self, period: Duration, f: F) -> Result<Uuid, FerroError>
    where
        F: FnMut() + Send + 'static,
    {
        self.registry.every(period, f)
    }

    /// Run `f` once after `delay` unless the robot halts first.
    ///
    /// # Errors
    ///
    /// No Tokio runtime.
    pub fn after<F>(&self, delay: Duration, f: F) -> Result<Uuid, FerroError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.registry.after(delay, f)
    }

    pub fn work_units(&self) -> Vec<WorkUnitInfo> {
        self.registry.units()
    }

    pub fn cancel_work_unit(&self, id: &Uuid) -> bool {
        self.registry.cancel(id)
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// # Errors
    ///
    /// The first connection or device failure, wrapped with its name, after
    /// rollback. [`FerroError::Runtime`] if work must be spawned outside a
    /// Tokio runtime.
    pub fn start(&self) -> Result<(), FerroError> {
        if self.started.load(Ordering::SeqCst) {
            debug!(robot = %self.name, "already started");
            return Ok(());
        }
        let work = if self.auto_run.load(Ordering::SeqCst) {
            self.work.read().clone()
        } else {
            None
        };
        let runtime = match work {
            Some(_) => Some(Handle::try_current().map_err(|e| {
                FerroError::Runtime(format!("robot '{}': cannot spawn work: {e}", self.name))
            })?),
            None => None,
        };

        info!(robot = %self.name, "starting robot");
        let connections = self.connections();
        let devices = self.devices();

        for (i, connection) in connections.iter().enumerate() {
            info!(robot = %self.name, connection = %connection.name(), "connecting");
            if let Err(e) = connection.connect() {
                error!(robot = %self.name, connection = %connection.name(), error = %e, "connect failed");
                self.finalize_all(&connections[..i]);
                return Err(e.context(format!("connection '{}'", connection.name())));
            }
        }

        for (i, device) in devices.iter().enumerate() {
            info!(robot = %self.name, device = %device.name(), "starting device");
            if let Err(e) = device.start() {
                error!(robot = %self.name, device = %device.name(), error = %e, "device start failed");
                for started in devices[..i].iter().rev() {
                    if let Err(e) = started.halt() {
                        warn!(robot = %self.name, device = %started.name(), error = %e, "halt during rollback failed");
                    }
                }
                self.finalize_all(&connections);
                return Err(e.context(format!("device '{}'", device.name())));
            }
        }

        self.started.store(true, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
        if let (Some(work), Some(runtime)) = (work, runtime) {
            self.spawn_work(&work, &runtime);
        }
        info!(robot = %self.name, "robot started");
        Ok(())
    }

    /// # Errors
    ///
    /// Every device halt and connection finalize error, aggregated.
    pub fn halt(&self) -> Result<(), FerroError> {
        if !self.started.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.running.store(false, Ordering::SeqCst);
        info!(robot = %self.name, "halting robot");
        if let Some(signal) = self.shutdown.lock().take() {
            signal.trigger();
        }
        let cancelled = self.registry.cancel_all();
        if cancelled > 0 {
            debug!(robot = %self.name, cancelled, "scheduled work cancelled");
        }

        let mut errors = Vec::new();
        for device in self.devices().iter().rev() {
            if let Err(e) = device.halt() {
                errors.push(e.context(format!("device '{}'", device.name())));
            }
        }
        for connection in self.connections().iter().rev() {
            if let Err(e) = connection.finalize() {
                errors.push(e.context(format!("connection '{}'", connection.name())));
            }
        }
        if !errors.is_empty() {
            warn!(robot = %self.name, errors = errors.len(), "robot halted with errors");
        }
        FerroError::multi(errors)
    }

    fn finalize_all(&self, connections: &[Arc<dyn Connection>]) {
        for connection in connections.iter().rev() {
            if let Err(e) = connection.finalize() {
                warn!(robot = %self.name, connection = %connection.name(), error = %e, "finalize during rollback failed");
            }
        }
    }

    fn spawn_work(&self, work: &Work, runtime: &Handle) {
        let (signal, token) = ShutdownSignal::pair();
        *self.shutdown.lock() = Some(signal);

        let name = self.name.clone();
        let running = Arc::clone(&self.running);
        let future = match std::panic::catch_unwind(AssertUnwindSafe(|| work(token))) {
            Ok(future) => future,
            Err(_) => {
                error!(robot = %name, "work panicked");
                running.store(false, Ordering::SeqCst);
                return;
            }
        };
        let task = runtime.spawn(future);
        runtime.spawn(async move {
            match task.await {
                Ok(()) => debug!(robot = %name, "work finished"),
                Err(e) if e.is_panic() => {
                    error!(robot = %name, "work panicked");
                    running.store(false, Ordering::SeqCst);
                }
                Err(_) => debug!(robot = %name, "work cancelled"),
            }
        });
    }

    pub fn to_json(&self) -> RobotJson {
        RobotJson {
            name: self.name.clone(),
            commands: self.commander.commands(),
            connections: self.connections().iter().map(|c| c.to_json()).collect(),
            devices: self.devices().iter().map(|d| d.to_json()).collect(),
        }
    }
}

impl std::fmt::Debug for Robot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Robot")
            .field("name", &self.name)
            .field("connections", &self.connection_count())
            .field("devices", &self.device_count())
            .field("running", &self.running())
            .finish()
    }
}
