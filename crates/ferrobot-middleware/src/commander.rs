//! [`Commander`] – a registry of named command handlers attached to any
//! controllable entity.

use std::collections::BTreeMap;
use std::sync::Arc;

use ferrobot_types::{FerroError, Params, Value};
use parking_lot::RwLock;

/// A command handler: receives the call parameters, returns a result value.
///
/// Handlers run synchronously on the caller's thread (user code or an API
/// request worker) and should not block for long.
pub type CommandHandler = Arc<dyn Fn(&Params) -> Result<Value, FerroError> + Send + Sync>;

/// Thread-safe name → handler mapping. Clones share the same registry.
#[derive(Clone, Default)]
pub struct Commander {
    commands: Arc<RwLock<BTreeMap<String, CommandHandler>>>,
}

impl Commander {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`, replacing any previous handler with
    /// the same name.
    pub fn add_command<F>(&self, name: &str, handler: F)
    where
        F: Fn(&Params) -> Result<Value, FerroError> + Send + Sync + 'static,
    {
        self.commands.write().insert(name.to_string(), Arc::new(handler));
    }

    /// The handler registered under `name`, or `None`.
    pub fn command(&self, name: &str) -> Option<CommandHandler> {
        self.commands.read().get(name).cloned()
    }

    /// Registered command names.
    pub fn commands(&self) -> Vec<String> {
        self.commands.read().keys().cloned().collect()
    }

    /// Look up and invoke `name`. Returns `None` when no such command exists.
    ///
    /// The registry lock is released before the handler runs, so handlers may
    /// themselves register or call commands.
    pub fn call(&self, name: &str, params: &Params) -> Option<Result<Value, FerroError>> {
        self.command(name).map(|handler| handler(params))
    }
}

impl std::fmt::Debug for Commander {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Commander").field("commands", &self.commands()).finish()
    }
}
