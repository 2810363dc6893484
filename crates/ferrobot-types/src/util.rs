//! Small numeric and naming helpers used by drivers and user code.

use std::sync::LazyLock;
use std::sync::atomic::{AtomicU32, Ordering};

use uuid::Uuid;

// ---------------------------------------------------------------------------
// Names
// ---------------------------------------------------------------------------

const NAME_TAG_MASK: u32 = 0xF_FFFF;

static NAME_SEED: LazyLock<u32> = LazyLock::new(|| {
    let bytes = Uuid::new_v4().into_bytes();
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
});

static NAME_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Return `"{prefix}-{hex5}"`, e.g. `"Robot-3FA01"`.
///
/// The tag is a process-wide counter offset by a random seed, so the first
/// 2^20 names issued by a process never repeat.
pub fn default_name(prefix: &str) -> String {
    let n = NAME_COUNTER.fetch_add(1, Ordering::Relaxed);
    let tag = NAME_SEED.wrapping_add(n) & NAME_TAG_MASK;
    format!("{prefix}-{tag:05X}")
}

// ---------------------------------------------------------------------------
// Scaling
// ---------------------------------------------------------------------------

/// Linearly map `x` from `[in_min, in_max]` onto `[out_min, out_max]`
/// without clamping.
pub fn rescale(x: f64, in_min: f64, in_max: f64, out_min: f64, out_max: f64) -> f64 {
    (x - in_min) * (out_max - out_min) / (in_max - in_min) + out_min
}

/// Restrict `x` to `[lo, hi]`.
pub fn clamp<T: PartialOrd>(x: T, lo: T, hi: T) -> T {
    if x < lo {
        lo
    } else if x > hi {
        hi
    } else {
        x
    }
}

/// Map `input` from `[min, max]` (in either order) to `0.0..=1.0`.
pub fn from_scale(input: f64, min: f64, max: f64) -> f64 {
    let (lo, hi) = (min.min(max), min.max(max));
    (input - lo) / (hi - lo)
}

/// Map `input` from `0.0..=1.0` to `[min, max]`, clamping the result.
pub fn to_scale(input: f64, min: f64, max: f64) -> f64 {
    let (lo, hi) = (min.min(max), min.max(max));
    clamp(input * (hi - lo) + lo, lo, hi)
}

// ---------------------------------------------------------------------------
// Checksums and bits
// ---------------------------------------------------------------------------

/// Ones-complement of the low byte of the sum of `bytes`.
pub fn checksum_modulo256(bytes: &[u8]) -> u8 {
    !bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Set bit `pos` of `n`. Positions outside the word leave `n` unchanged.
pub fn set_bit(n: u32, pos: u32) -> u32 {
    n | 1u32.checked_shl(pos).unwrap_or(0)
}

/// Clear bit `pos` of `n`.
pub fn clear_bit(n: u32, pos: u32) -> u32 {
    n & !1u32.checked_shl(pos).unwrap_or(0)
}

/// Whether bit `pos` of `n` is set.
pub fn is_bit_set(n: u32, pos: u32) -> bool {
    n & 1u32.checked_shl(pos).unwrap_or(0) != 0
}
