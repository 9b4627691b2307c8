use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Room identity
// ---------------------------------------------------------------------------

/// Room identifier carried in byte 0 of every radio frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub u8);

impl RoomId {
    pub const BEDROOM: RoomId = RoomId(0);
    pub const LIVING_ROOM: RoomId = RoomId(1);
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// One timestamped climate sample for a room.
///
/// Values are already filtered (no NaN) by the time a `Reading` exists; see
/// [`crate::fallback::LastGood`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub room: RoomId,
    /// Epoch seconds.
    pub time: i64,
    /// Degrees Celsius.
    pub temperature: f32,
    /// Relative humidity, percent.
    pub humidity: f32,
    /// hPa.
    pub pressure: f32,
    /// Metres above sea level.
    pub altitude: f32,
    /// kOhm, only on gas-capable sensors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_resistance: Option<f32>,
}

impl Reading {
    /// Space-separated line served by `/data`:
    /// `time temperature humidity pressure altitude [gas]`.
    pub fn to_line(&self) -> String {
        let mut line = format!(
            "{} {:.2} {:.2} {:.2} {:.2}",
            self.time, self.temperature, self.humidity, self.pressure, self.altitude
        );
        if let Some(gas) = self.gas_resistance {
            line.push_str(&format!(" {gas:.2}"));
        }
        line
    }

    /// Comma-separated record used by the chart endpoints:
    /// `room,time,temperature,humidity,pressure,altitude[,gas_resistance]`.
    pub fn to_record(&self) -> String {
        let mut record = format!(
            "{},{},{:.2},{:.2},{:.2},{:.2}",
            self.room, self.time, self.temperature, self.humidity, self.pressure, self.altitude
        );
        if let Some(gas) = self.gas_resistance {
            record.push_str(&format!(",{gas:.2}"));
        }
        record
    }
}

// ===========================================================================
// Tests
// ===========================================================================
