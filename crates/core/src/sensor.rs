//! Sensor abstraction and the filtered reader built on top of it.

use crate::fallback::{altitude_m, LastGood};
use crate::reading::{Reading, RoomId};

/// Unfiltered sample as reported by a driver. Any field may be NaN.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSample {
    pub temperature: f32,
    pub humidity: f32,
    /// hPa.
    pub pressure: f32,
    /// kOhm. `None` for sensors without a gas heater.
    pub gas_resistance: Option<f32>,
}

impl RawSample {
    /// A sample where every channel failed.
    pub const fn failed() -> Self {
        Self {
            temperature: f32::NAN,
            humidity: f32::NAN,
            pressure: f32::NAN,
            gas_resistance: None,
        }
    }
}

/// Anything that can produce a climate sample: a real I2C device, the
/// simulator, or a test double.
pub trait ClimateSensor: Send {
    fn sample(&mut self) -> anyhow::Result<RawSample>;

    /// Short name used in log lines.
    fn name(&self) -> &str;
}

impl<S: ClimateSensor + ?Sized> ClimateSensor for Box<S> {
    fn sample(&mut self) -> anyhow::Result<RawSample> {
        (**self).sample()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Simulated day length for `"sim"` sensors, in seconds.
#[cfg(feature = "sim")]
const SIM_DAY_S: f32 = 86_400.0;

/// Open the sensor named by `kind`: `"sim"`, `"sim680"` (simulator with a
/// gas channel) or `"bme280"`. Each kind is only available when its cargo
/// feature is enabled.
#[allow(unused_variables)]
pub fn open_sensor(
    kind: &str,
    sim_scenario: &str,
    i2c_addr: &str,
) -> anyhow::Result<Box<dyn ClimateSensor>> {
    match kind {
        #[cfg(feature = "sim")]
        "sim" | "sim680" => {
            let scenario = crate::sim::Scenario::from_str_lossy(sim_scenario);
            let mut sim = crate::sim::ClimateSim::new(scenario, SIM_DAY_S);
            if kind == "sim680" {
                sim = sim.with_gas();
            }
            tracing::info!(kind, scenario = %sim.scenario(), "using simulated climate sensor");
            Ok(Box::new(sim))
        }
        #[cfg(feature = "i2c")]
        "bme280" => {
            let addr = crate::bme280::parse_addr(i2c_addr)?;
            Ok(Box::new(crate::bme280::Bme280::new(addr)?))
        }
        other => anyhow::bail!("sensor '{other}' is not available in this build"),
    }
}

/// Calibration applied on top of the raw channels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    /// Added to every reported temperature, fallback values included.
    pub temperature_offset: f32,
    /// Reference pressure for the altitude estimate.
    pub sea_level_hpa: f32,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            temperature_offset: -2.0,
            sea_level_hpa: 1014.0,
        }
    }
}

/// Wraps a [`ClimateSensor`] with one last-good filter per quantity and turns
/// raw samples into [`Reading`]s. Never fails: a driver error counts as NaN on
/// every channel.
pub struct ClimateReader<S> {
    sensor: S,
    room: RoomId,
    calibration: Calibration,
    temperature: LastGood,
    humidity: LastGood,
    pressure: LastGood,
    altitude: LastGood,
    gas: LastGood,
}

impl<S: ClimateSensor> ClimateReader<S> {
    pub fn new(sensor: S, room: RoomId, calibration: Calibration) -> Self {
        Self {
            sensor,
            room,
            calibration,
            temperature: LastGood::new(),
            humidity: LastGood::new(),
            pressure: LastGood::new(),
            altitude: LastGood::new(),
            gas: LastGood::new(),
        }
    }

    pub fn room(&self) -> RoomId {
        self.room
    }

    /// Sample the sensor once and stamp the result with `time`.
    pub fn read(&mut self, time: i64) -> Reading {
        let raw = match self.sensor.sample() {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(sensor = self.sensor.name(), "sensor read failed, keeping old values: {e:#}");
                RawSample::failed()
            }
        };

        if raw.temperature.is_nan() || raw.humidity.is_nan() || raw.pressure.is_nan() {
            tracing::warn!(
                sensor = self.sensor.name(),
                never_read = !self.temperature.has_value(),
                temperature_nan = raw.temperature.is_nan(),
                humidity_nan = raw.humidity.is_nan(),
                pressure_nan = raw.pressure.is_nan(),
                "invalid channel value, kept the old value"
            );
        }

        let temperature = self.temperature.filter(raw.temperature) + self.calibration.temperature_offset;
        let humidity = self.humidity.filter(raw.humidity);
        let pressure = self.pressure.filter(raw.pressure);
        let altitude = self
            .altitude
            .filter(altitude_m(raw.pressure, self.calibration.sea_level_hpa));
        let gas_resistance = raw.gas_resistance.map(|g| self.gas.filter(g));

        let reading = Reading {
            room: self.room,
            time,
            temperature,
            humidity,
            pressure,
            altitude,
            gas_resistance,
        };
        tracing::debug!(
            sensor = self.sensor.name(),
            room = %self.room,
            line = %reading.to_line(),
            "sampled"
        );
        reading
    }
}

// ===========================================================================
// Tests
// ===========================================================================
