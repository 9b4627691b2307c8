//! Fixed binary radio frame exchanged between a sensor node and the hub.
//!
//! Byte layout is the naturally aligned C struct a microcontroller node
//! sends over the air (little-endian, 4-byte aligned):
//!
//! ```text
//! offset  size  field
//!      0     1  room id (u8)
//!      1     3  padding (zero on encode, ignored on decode)
//!      4     4  temperature (f32, °C)
//!      8     4  humidity (f32, %)
//!     12     4  pressure (f32, hPa)
//!     16     4  altitude (f32, m)
//!     20     4  time (u32, epoch seconds)
//! ```

use crate::reading::{Reading, RoomId};

/// Encoded frame length in bytes.
pub const FRAME_LEN: usize = 24;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("frame is {0} bytes, expected {FRAME_LEN}")]
    Length(usize),
    #[error("timestamp {0} does not fit in 32 bits")]
    Timestamp(i64),
    #[error("{0} is not a finite number")]
    NonFinite(&'static str),
}

/// Encode a reading into its 24-byte radio representation. Gas resistance is
/// not carried over the radio link.
pub fn encode(reading: &Reading) -> Result<[u8; FRAME_LEN], FrameError> {
    let time = u32::try_from(reading.time).map_err(|_| FrameError::Timestamp(reading.time))?;

    let mut buf = [0u8; FRAME_LEN];
    buf[0] = reading.room.0;
    buf[4..8].copy_from_slice(&reading.temperature.to_le_bytes());
    buf[8..12].copy_from_slice(&reading.humidity.to_le_bytes());
    buf[12..16].copy_from_slice(&reading.pressure.to_le_bytes());
    buf[16..20].copy_from_slice(&reading.altitude.to_le_bytes());
    buf[20..24].copy_from_slice(&time.to_le_bytes());
    Ok(buf)
}

/// Decode a received datagram. Anything that is not exactly
/// [`FRAME_LEN`] bytes, or that carries NaN or infinity, is rejected.
pub fn decode(bytes: &[u8]) -> Result<Reading, FrameError> {
    let buf: &[u8; FRAME_LEN] = bytes.try_into().map_err(|_| FrameError::Length(bytes.len()))?;

    Ok(Reading {
        room: RoomId(buf[0]),
        temperature: finite_at(buf, 4, "temperature")?,
        humidity: finite_at(buf, 8, "humidity")?,
        pressure: finite_at(buf, 12, "pressure")?,
        altitude: finite_at(buf, 16, "altitude")?,
        time: i64::from(u32::from_le_bytes([buf[20], buf[21], buf[22], buf[23]])),
        gas_resistance: None,
    })
}

fn finite_at(buf: &[u8; FRAME_LEN], at: usize, field: &'static str) -> Result<f32, FrameError> {
    let v = f32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);
    if v.is_finite() {
        Ok(v)
    } else {
        Err(FrameError::NonFinite(field))
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn reading() -> Reading {
        Reading {
            room: RoomId::BEDROOM,
            time: 1_700_000_000,
            temperature: 19.25,
            humidity: 51.5,
            pressure: 1009.75,
            altitude: 36.5,
            gas_resistance: None,
        }
    }

    #[test]
    fn encode_lays_out_fields_at_struct_offsets() {
        let buf = encode(&reading()).unwrap();
        assert_eq!(buf.len(), FRAME_LEN);
        assert_eq!(buf[0], 0);
        assert_eq!(&buf[1..4], &[0, 0, 0]);
        assert_eq!(&buf[4..8], &19.25f32.to_le_bytes());
        assert_eq!(&buf[20..24], &1_700_000_000u32.to_le_bytes());
    }

    #[test]
    fn decode_restores_what_encode_wrote() {
        let r = reading();
        assert_eq!(decode(&encode(&r).unwrap()).unwrap(), r);
    }

    #[test]
    fn decode_ignores_padding_bytes() {
        let mut buf = encode(&reading()).unwrap();
        buf[1] = 0xAA;
        buf[2] = 0x55;
        buf[3] = 0xFF;
        assert_eq!(decode(&buf).unwrap(), reading());
    }

    #[test]
    fn decode_rejects_short_frame() {
        assert_eq!(decode(&[0u8; 23]), Err(FrameError::Length(23)));
    }

    #[test]
    fn decode_rejects_long_frame() {
        assert_eq!(decode(&[0u8; 32]), Err(FrameError::Length(32)));
    }

    #[test]
    fn decode_rejects_empty_datagram() {
        assert_eq!(decode(&[]), Err(FrameError::Length(0)));
    }

    #[test]
    fn decode_rejects_nan_and_infinity() {
        let mut buf = encode(&reading()).unwrap();
        buf[4..8].copy_from_slice(&f32::NAN.to_le_bytes());
        assert_eq!(decode(&buf), Err(FrameError::NonFinite("temperature")));

        let mut buf = encode(&reading()).unwrap();
        buf[12..16].copy_from_slice(&f32::INFINITY.to_le_bytes());
        assert_eq!(decode(&buf), Err(FrameError::NonFinite("pressure")));
    }

    #[test]
    fn encode_rejects_negative_time() {
        let r = Reading {
            time: -1,
            ..reading()
        };
        assert_eq!(encode(&r), Err(FrameError::Timestamp(-1)));
    }

    #[test]
    fn decoded_frame_never_carries_gas() {
        let r = Reading {
            gas_resistance: Some(80.0),
            ..reading()
        };
        assert_eq!(decode(&encode(&r).unwrap()).unwrap().gas_resistance, None);
    }
}
