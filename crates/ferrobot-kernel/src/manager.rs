//! [`Manager`] – the top-level orchestrator and the [`ApiService`] seam.
//!
//! The manager owns robots, manager-scoped commands, a manager-level
//! eventer and an optional API service. `Manager` is a cheap handle; clones
//! share the same state, which is how the API server reaches back into it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use ferrobot_hal::{Connection, Device};
use ferrobot_middleware::{Commander, Eventer};
use ferrobot_types::{FerroError, ManagerJson, Params, Value};
use parking_lot::RwLock;
use tracing::{error, info, warn};

use crate::robot::Robot;

/// A control surface started before, and stopped after, the robots.
#[async_trait]
pub trait ApiService: Send + Sync {
    /// Begin serving. Must return once requests are accepted; serving
    /// continues in the background.
    async fn start(&self, manager: Manager) -> Result<(), FerroError>;

    async fn stop(&self) -> Result<(), FerroError>;
}

struct ManagerInner {
    robots: RwLock<Vec<Arc<Robot>>>,
    commander: Commander,
    eventer: Eventer,
    api: RwLock<Option<Arc<dyn ApiService>>>,
    running: AtomicBool,
}

#[derive(Clone)]
pub struct Manager {
    inner: Arc<ManagerInner>,
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}

impl Manager {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                robots: RwLock::new(Vec::new()),
                commander: Commander::new(),
                eventer: Eventer::new(),
                api: RwLock::new(None),
                running: AtomicBool::new(false),
            }),
        }
    }

    pub fn with_api(self, api: Arc<dyn ApiService>) -> Self {
        self.set_api(api);
        self
    }

    pub fn set_api(&self, api: Arc<dyn ApiService>) {
        *self.inner.api.write() = Some(api);
    }

    // -----------------------------------------------------------------------
    // Robots
    // -----------------------------------------------------------------------

    /// Add a robot. A robot with the same name is replaced in place.
    pub fn add_robot(&self, robot: Arc<Robot>) -> Arc<Robot> {
        let mut robots = self.inner.robots.write();
        match robots.iter_mut().find(|r| r.name() == robot.name()) {
            Some(slot) => {
                warn!(robot = %robot.name(), "replacing robot with the same name");
                *slot = Arc::clone(&robot);
            }
            None => robots.push(Arc::clone(&robot)),
        }
        robot
    }

    pub fn robot(&self, name: &str) -> Option<Arc<Robot>> {
        self.inner.robots.read().iter().find(|r| r.name() == name).cloned()
    }

    pub fn robots(&self) -> Vec<Arc<Robot>> {
        self.inner.robots.read().clone()
    }

    pub fn device(&self, robot: &str, device: &str) -> Option<Arc<dyn Device>> {
        self.robot(robot)?.device(device)
    }

    pub fn connection(&self, robot: &str, connection: &str) -> Option<Arc<dyn Connection>> {
        self.robot(robot)?.connection(connection)
    }

    // -----------------------------------------------------------------------
    // Commands and events
    // -----------------------------------------------------------------------

    pub fn commander(&self) -> &Commander {
        &self.inner.commander
    }

    pub fn add_command<F>(&self, name: &str, handler: F)
    where
        F: Fn(&Params) -> Result<Value, FerroError> + Send + Sync + 'static,
    {
        self.inner.commander.add_command(name, handler);
    }

    pub fn eventer(&self) -> &Eventer {
        &self.inner.eventer
    }

    pub fn running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Start the API (if any), then every robot.
    ///
    /// # Errors
    ///
    /// An API start failure aborts before any robot starts. Robot failures
    /// are aggregated; if no robot started the API is stopped again.
    pub async fn start(&self) -> Result<(), FerroError> {
        let api = self.inner.api.read().clone();
        if let Some(api) = &api {
            info!("starting api");
            api.start(self.clone()).await.map_err(|e| e.context("api"))?;
        }

        let robots = self.robots();
        let mut errors = Vec::new();
        let mut started = 0usize;
        for robot in &robots {
            match robot.start() {
                Ok(()) => started += 1,
                Err(e) => {
                    error!(robot = %robot.name(), error = %e, "robot failed to start");
                    errors.push(e.context(format!("robot '{}'", robot.name())));
                }
            }
        }

        if started == 0 && !errors.is_empty() {
            if let Some(api) = &api {
                if let Err(e) = api.stop().await {
                    errors.push(e.context("api"));
                }
            }
            return FerroError::multi(errors);
        }
        self.inner.running.store(true, Ordering::SeqCst);
        info!(robots = robots.len(), started, "manager started");
        FerroError::multi(errors)
    }

    /// Halt every robot, then stop the API.
    ///
    /// # Errors
    ///
    /// Every robot halt and API stop error, aggregated.
    pub async fn halt(&self) -> Result<(), FerroError> {
        info!("halting manager");
        let mut errors = Vec::new();
        for robot in self.robots() {
            if let Err(e) = robot.halt() {
                errors.push(e.context(format!("robot '{}'", robot.name())));
            }
        }
        let api = self.inner.api.read().clone();
        if let Some(api) = api {
            if let Err(e) = api.stop().await {
                errors.push(e.context("api"));
            }
        }
        self.inner.running.store(false, Ordering::SeqCst);
        FerroError::multi(errors)
    }

    /// Alias of [`Manager::halt`].
    ///
    /// # Errors
    ///
    /// See [`Manager::halt`].
    pub async fn stop(&self) -> Result<(), FerroError> {
        self.halt().await
    }

    /// Start, wait for Ctrl-C, then halt.
    ///
    /// # Errors
    ///
    /// Start errors, a failure to install the signal handler, or halt errors.
    pub async fn run_until_signal(&self) -> Result<(), FerroError> {
        self.start().await?;
        info!("press Ctrl-C to stop");
        let waited = tokio::signal::ctrl_c()
            .await
            .map_err(|e| FerroError::Runtime(format!("cannot listen for Ctrl-C: {e}")));
        info!("shutting down");
        let halted = self.halt().await;
        waited?;
        halted
    }

    pub fn to_json(&self) -> ManagerJson {
        ManagerJson {
            robots: self.robots().iter().map(|r| r.to_json()).collect(),
            commands: self.inner.commander.commands(),
        }
    }
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("robots", &self.inner.robots.read().len())
            .field("api", &self.inner.api.read().is_some())
            .field("running", &self.running())
            .finish()
    }
}
