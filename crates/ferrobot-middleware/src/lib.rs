//! `ferrobot-middleware` – in-process plumbing shared by robots, drivers
//! and user code.
//!
//! # Modules
//!
//! | Module | Contents |
//! |---|---|
//! | [`eventer`] | Topic-based publish/subscribe ([`Eventer`]) |
//! | [`commander`] | Late-bound command registry ([`Commander`]) |
//! | [`scheduler`] | [`after`] / [`every`] helpers returning a [`TaskHandle`] |
//! | [`shutdown`] | One-shot cooperative stop signal ([`ShutdownToken`]) |

pub mod commander;
pub mod eventer;
pub mod scheduler;
pub mod shutdown;

pub use commander::{CommandHandler, Commander};
pub use eventer::{Event, EventHandle, EventReceiver, Eventer, Subscription};
pub use scheduler::{TaskHandle, after, every};
pub use shutdown::{ShutdownSignal, ShutdownToken};
