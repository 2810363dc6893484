//! Platform adaptors built on the [`system`](crate::system) access layer.

mod analog_pins;
mod host;

pub use analog_pins::{AnalogPinTranslator, AnalogPinsAdaptor};
pub use host::{HostAdaptor, THERMAL_ZONE_ROOT};
