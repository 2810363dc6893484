//! [`FerroError`] – the single error type shared by every ferrobot crate.

use thiserror::Error;

/// Global error type spanning configuration mistakes, hardware I/O failures,
/// command dispatch failures and aggregated lifecycle errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FerroError {
    /// Invalid configuration supplied by the caller (bad option, duplicate
    /// name, device bound to a foreign connection, …).
    #[error("configuration error: {0}")]
    Config(String),

    /// A pin identifier the platform translator does not know.
    #[error("'{0}' is not a valid id of a pin")]
    UnknownPin(String),

    /// A driver asked its connection for a capability it does not provide.
    #[error("{connection} does not support {capability}")]
    Unsupported {
        capability: String,
        connection: String,
    },

    /// I/O attempted on a connection before `connect()` (or after
    /// `finalize()`).
    #[error("{0}: not connected")]
    NotConnected(String),

    /// A hardware transaction failed.
    #[error("I/O fault on {component}: {details}")]
    Io { component: String, details: String },

    /// A malformed packet or out-of-range response from a peripheral.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A command handler rejected its parameters or failed.
    #[error("command error: {0}")]
    Command(String),

    /// Subscription to a topic that was never registered.
    #[error("unknown event '{0}'")]
    UnknownEvent(String),

    /// An operation that spawns tasks was called outside a Tokio runtime.
    #[error("runtime error: {0}")]
    Runtime(String),

    /// Wraps an inner error with the name of the entity it came from.
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<FerroError>,
    },

    /// Errors collected by a best-effort operation (robot halt, manager
    /// start).
    #[error("{}", join_errors(.0))]
    Multi(Vec<FerroError>),
}

impl FerroError {
    /// Wrap `self` with a context label such as `"connection 'arduino'"`.
    pub fn context(self, context: impl Into<String>) -> Self {
        FerroError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Shorthand for [`FerroError::Io`].
    pub fn io(component: impl Into<String>, details: impl Into<String>) -> Self {
        FerroError::Io {
            component: component.into(),
            details: details.into(),
        }
    }

    /// Collapse a list of collected errors: empty becomes `Ok(())`, a single
    /// error is returned as-is, anything else is wrapped in
    /// [`FerroError::Multi`].
    pub fn multi(mut errors: Vec<FerroError>) -> Result<(), FerroError> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(FerroError::Multi(errors)),
        }
    }

    /// Number of leaf errors carried by this value.
    pub fn count(&self) -> usize {
        match self {
            FerroError::Multi(errors) => errors.iter().map(FerroError::count).sum(),
            _ => 1,
        }
    }
}

fn join_errors(errors: &[FerroError]) -> String {
    let parts: Vec<String> = errors.iter().map(ToString::to_string).collect();
    format!("{} errors occurred: {}", errors.len(), parts.join("; "))
}

impl From<std::io::Error> for FerroError {
    fn from(e: std::io::Error) -> Self {
        FerroError::io(format!("{:?}", e.kind()), e.to_string())
    }
}
