//! Digital I/O drivers.
//!
//! | Driver | Connection capability |
//! |---|---|
//! | [`LedDriver`] | [`DigitalWriter`](crate::DigitalWriter), optional PWM for brightness |
//! | [`ButtonDriver`] | [`DigitalReader`](crate::DigitalReader), polled |
//! | [`RelayDriver`] | [`DigitalWriter`](crate::DigitalWriter) |
//! | [`DirectPinDriver`] | any; every operation probes its capability |

mod button;
mod direct_pin;
mod led;
mod relay;

pub use button::{ButtonDriver, DEFAULT_POLL_INTERVAL};
pub use direct_pin::DirectPinDriver;
pub use led::LedDriver;
pub use relay::RelayDriver;

/// Button left its default state.
pub const PUSH: &str = "push";
/// Button returned to its default state.
pub const RELEASE: &str = "release";
/// A read failed.
pub const ERROR: &str = "error";

use ferrobot_types::{FerroError, Params, ParamsExt};

/// The `level` parameter of write commands as a byte.
fn level_param(params: &Params) -> Result<u8, FerroError> {
    let level = params.require_i64("level")?;
    u8::try_from(level)
        .map_err(|_| FerroError::Command(format!("parameter 'level' out of range: {level}")))
}
