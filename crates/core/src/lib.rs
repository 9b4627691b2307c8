//! Shared room-climate model for the hub and the sensor nodes: readings,
//! last-good filtering, the radio frame, and the sensor drivers.

pub mod bme280;
pub mod fallback;
pub mod frame;
pub mod reading;
pub mod sensor;
#[cfg(feature = "sim")]
pub mod sim;

pub use fallback::LastGood;
pub use reading::{Reading, RoomId};
pub use sensor::{open_sensor, Calibration, ClimateReader, ClimateSensor, RawSample};
