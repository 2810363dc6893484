//! Scalers convert between raw integer readings/writes and semantic values.
//!
//! | Function | Direction | Behaviour |
//! |---|---|---|
//! | [`identity`] | raw → value | `value = raw as f64` |
//! | [`linear`] | raw → value | straight line through two points, input clamped |
//! | [`ntc`] | raw → °C | B-parameter thermistor equation over a voltage divider |
//! | [`truncate`] | value → raw | `raw = value as i32` |
//! | [`actuator_linear`] | value → raw | straight line through two points, input clamped |

use std::sync::Arc;

/// Converts a raw sensor reading into a value.
pub type SensorScaler = Arc<dyn Fn(i32) -> f64 + Send + Sync>;

/// Converts an actuator value into the raw value written to the pin.
pub type ActuatorScaler = Arc<dyn Fn(f64) -> i32 + Send + Sync>;

const KELVIN_OFFSET: f64 = 273.15;

pub fn identity() -> SensorScaler {
    Arc::new(|raw: i32| f64::from(raw))
}

/// Map `[from_min, from_max]` onto `[to_min, to_max]`. Inputs at or outside
/// the source range return the corresponding bound.
pub fn linear(from_min: i32, from_max: i32, to_min: f64, to_max: f64) -> SensorScaler {
    let m = (to_max - to_min) / (f64::from(from_max) - f64::from(from_min));
    let n = to_min - m * f64::from(from_min);
    Arc::new(move |input: i32| {
        if input <= from_min {
            to_min
        } else if input >= from_max {
            to_max
        } else {
            f64::from(input) * m + n
        }
    })
}

pub fn truncate() -> ActuatorScaler {
    Arc::new(|value: f64| value as i32)
}

/// Map `[from_min, from_max]` onto `[to_min, to_max]`, truncating the
/// result. Inputs at or outside the source range return the corresponding
/// bound.
pub fn actuator_linear(from_min: f64, from_max: f64, to_min: i32, to_max: i32) -> ActuatorScaler {
    let m = (f64::from(to_max) - f64::from(to_min)) / (from_max - from_min);
    let n = f64::from(to_min) - m * from_min;
    Arc::new(move |input: f64| {
        if input <= from_min {
            to_min
        } else if input >= from_max {
            to_max
        } else {
            (input * m + n) as i32
        }
    })
}

// ---------------------------------------------------------------------------
// NTC thermistor
// ---------------------------------------------------------------------------

/// Thermistor characteristics.
///
/// `b` may be left at `0.0` when a second calibration point
/// (`tc1`, `r1`) is known; it is then derived from both points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NtcConfig {
    /// Reference temperature in °C.
    pub tc0: f64,
    /// Resistance at `tc0` in Ω.
    pub r0: f64,
    /// B value in K.
    pub b: f64,
    /// Second calibration temperature in °C.
    pub tc1: f64,
    /// Resistance at `tc1` in Ω.
    pub r1: f64,
}

impl NtcConfig {
    pub fn new(tc0: f64, r0: f64, b: f64) -> Self {
        Self {
            tc0,
            r0,
            b,
            tc1: 0.0,
            r1: 0.0,
        }
    }

    /// Calibrate from two points instead of a B value.
    pub fn from_two_points(tc0: f64, r0: f64, tc1: f64, r1: f64) -> Self {
        Self {
            tc0,
            r0,
            b: 0.0,
            tc1,
            r1,
        }
    }

    /// Precompute the constants used per reading: `(b, t0, r)` with
    /// `t0 = tc0 + 273.15` and `r = b / t0`.
    fn constants(&self) -> (f64, f64, f64) {
        let t0 = self.tc0 + KELVIN_OFFSET;
        let b = if self.b <= 0.0 {
            let t1 = self.tc1 + KELVIN_OFFSET;
            (self.r1 / self.r0).ln() / (1.0 / t1 - 1.0 / t0)
        } else {
            self.b
        };
        (b, t0, b / t0)
    }
}

/// Temperature in °C from a raw divider reading.
///
/// `v_ref` is the reading at full supply voltage, `r_series` the fixed
/// resistor of the divider. With `reverse == false` the thermistor sits
/// between the sense point and ground.
pub fn ntc(v_ref: u32, r_series: u32, reverse: bool, config: NtcConfig) -> SensorScaler {
    let (b, _t0, r) = config.constants();
    let v_ref = f64::from(v_ref);
    let r_series = f64::from(r_series);
    let r0 = config.r0;
    Arc::new(move |raw: i32| {
        let value = f64::from(raw).clamp(0.0, v_ref);
        // One count stands in for a zero side of the divider, keeping the
        // result away from ±273.15.
        let low = value.max(1.0);
        let high = (v_ref - value).max(1.0);
        let resistance = if reverse {
            r_series * low / high
        } else {
            r_series * high / low
        };
        b / (r + (resistance / r0).ln()) - KELVIN_OFFSET
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_converts() {
        assert_eq!(identity()(42), 42.0);
        assert_eq!(identity()(-1), -1.0);
    }

    #[test]
    fn linear_clamps_to_range() {
        let s = linear(0, 255, 0.0, 255.0);
        assert_eq!(s(-5), 0.0);
        assert_eq!(s(260), 255.0);
        assert_eq!(s(128), 128.0);
    }

    #[test]
    fn linear_with_offset_and_slope() {
        let s = linear(0, 1023, -40.0, 125.0);
        assert_eq!(s(0), -40.0);
        assert!((s(512) - 42.580_645).abs() < 1e-3);
        assert_eq!(s(1023), 125.0);
    }

    #[test]
    fn actuator_linear_clamps_and_truncates() {
        let s = actuator_linear(-10.0, 10.0, 0, 255);
        assert_eq!(s(-20.0), 0);
        assert_eq!(s(20.0), 255);
        assert_eq!(s(0.0), 127);
        assert_eq!(truncate()(3.9), 3);
    }

    #[test]
    fn full_i32_ranges_do_not_overflow() {
        let s = linear(i32::MIN, i32::MAX, 0.0, 1.0);
        assert_eq!(s(i32::MIN), 0.0);
        assert_eq!(s(i32::MAX), 1.0);
        assert!((s(0) - 0.5).abs() < 1e-6);

        let a = actuator_linear(0.0, 1.0, i32::MIN, i32::MAX);
        assert_eq!(a(0.0), i32::MIN);
        assert_eq!(a(1.0), i32::MAX);
        assert!(a(0.5).abs() <= 1);
    }

    #[test]
    fn ntc_matches_reference_reading() {
        let s = ntc(1023, 10_000, false, NtcConfig::new(25.0, 10_000.0, 3975.0));
        assert!((s(585) - 31.615).abs() < 0.01, "got {}", s(585));
    }

    #[test]
    fn ntc_at_midpoint_returns_reference_temperature() {
        let s = ntc(1000, 10_000, false, NtcConfig::new(25.0, 10_000.0, 3950.0));
        assert!((s(500) - 25.0).abs() < 1e-9);
        let reversed = ntc(1000, 10_000, true, NtcConfig::new(25.0, 10_000.0, 3950.0));
        assert!((reversed(500) - 25.0).abs() < 1e-9);
    }

    #[test]
    fn ntc_guards_degenerate_readings() {
        let s = ntc(1023, 10_000, false, NtcConfig::new(25.0, 10_000.0, 3975.0));
        assert!(s(1023).is_finite());
        assert!(s(0).is_finite());
        // negative and over-range readings are clamped
        assert_eq!(s(-5), s(0));
        assert_eq!(s(5000), s(1023));
    }

    #[test]
    fn ntc_derives_b_from_second_point() {
        let from_b = NtcConfig::new(25.0, 10_000.0, 3950.0);
        let (b, t0, _) = from_b.constants();
        // resistance the B equation predicts at 50 °C
        let t1 = 50.0 + KELVIN_OFFSET;
        let r1 = 10_000.0 * (b * (1.0 / t1 - 1.0 / t0)).exp();
        let derived = NtcConfig::from_two_points(25.0, 10_000.0, 50.0, r1);
        let (b2, _, _) = derived.constants();
        assert!((b2 - 3950.0).abs() < 1e-6);
    }
}
