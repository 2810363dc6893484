//! `ferrobot-types` – shared vocabulary of the ferrobot workspace.
//!
//! # Modules
//!
//! | Module | Contents |
//! |---|---|
//! | [`error`] | [`FerroError`], the error type used across every crate |
//! | [`value`] | [`Value`] tagged sum, [`Params`] and [`ParamsExt`] |
//! | [`json`] | Introspection shapes (`RobotJson`, `DeviceJson`, …) |
//! | [`util`] | Name generator, numeric scaling, checksum and bit helpers |

pub mod error;
pub mod json;
pub mod util;
pub mod value;

pub use error::FerroError;
pub use json::{ConnectionJson, DeviceJson, ManagerJson, RobotJson};
pub use value::{Params, ParamsExt, Value};
