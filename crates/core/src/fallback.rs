//! "Keep the last good value" filtering for flaky sensor channels.
//!
//! DHT and BME sensors occasionally return NaN (bus glitch, sensor busy).
//! Rather than surfacing an error, each channel reports the most recent value
//! that was not NaN, or zero if the channel has never produced one.

/// Last-good filter for a single quantity.
#[derive(Debug, Clone, Copy, Default)]
pub struct LastGood {
    last: f32,
    seen: bool,
}

impl LastGood {
    pub const fn new() -> Self {
        Self {
            last: 0.0,
            seen: false,
        }
    }

    /// Feed a raw value and get back the value to report.
    pub fn filter(&mut self, raw: f32) -> f32 {
        if raw.is_nan() {
            return self.last;
        }
        self.last = raw;
        self.seen = true;
        raw
    }

    /// Whether at least one non-NaN value has been seen.
    pub fn has_value(&self) -> bool {
        self.seen
    }
}

/// Barometric altitude in metres for `pressure_hpa`, relative to the given
/// sea-level pressure. NaN in, NaN out.
pub fn altitude_m(pressure_hpa: f32, sea_level_hpa: f32) -> f32 {
    44330.0 * (1.0 - (pressure_hpa / sea_level_hpa).powf(0.1903))
}

// ===========================================================================
// Tests
// ===========================================================================
