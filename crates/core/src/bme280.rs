//! BME280 temperature / humidity / pressure sensor over I2C.
//!
//! Runs the sensor in forced mode with x1 oversampling on every channel: one
//! measurement per `sample()` call, then the chip goes back to sleep. The
//! compensation maths is the floating-point variant from the Bosch datasheet
//! (section 8.1) and lives in plain functions so it can be tested on any host.
//! Only the bus access needs the `i2c` feature.

// ── Register addresses ──────────────────────────────────────────────────────

/// Chip id register. Reads 0x60 on a BME280.
pub const REG_CHIP_ID: u8 = 0xD0;
pub const CHIP_ID: u8 = 0x60;
/// Soft reset register; write 0xB6.
pub const REG_RESET: u8 = 0xE0;
pub const RESET_CMD: u8 = 0xB6;
/// First block of calibration data: T1..P9 and H1 (0x88..=0xA1).
pub const REG_CALIB_00: u8 = 0x88;
pub const CALIB_00_LEN: usize = 26;
/// Second block of calibration data: H2..H6 (0xE1..=0xE7).
pub const REG_CALIB_26: u8 = 0xE1;
pub const CALIB_26_LEN: usize = 7;
pub const REG_CTRL_HUM: u8 = 0xF2;
pub const REG_STATUS: u8 = 0xF3;
pub const REG_CTRL_MEAS: u8 = 0xF4;
/// Burst read start: press[3], temp[3], hum[2].
pub const REG_DATA: u8 = 0xF7;
pub const DATA_LEN: usize = 8;

/// ctrl_hum: osrs_h = x1.
pub const CTRL_HUM_X1: u8 = 0b001;
/// ctrl_meas: osrs_t = x1 [7:5], osrs_p = x1 [4:2], mode = forced [1:0].
pub const CTRL_MEAS_FORCED_X1: u8 = 0b001_001_01;
/// Status bit 3: conversion running.
pub const STATUS_MEASURING: u8 = 1 << 3;

/// Raw value the chip reports for a channel that was skipped.
const SKIPPED_20BIT: i32 = 0x80000;
const SKIPPED_16BIT: i32 = 0x8000;

// ── Calibration ─────────────────────────────────────────────────────────────

/// Factory trimming parameters burned into each chip.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Calibration {
    pub t1: u16,
    pub t2: i16,
    pub t3: i16,
    pub p1: u16,
    pub p2: i16,
    pub p3: i16,
    pub p4: i16,
    pub p5: i16,
    pub p6: i16,
    pub p7: i16,
    pub p8: i16,
    pub p9: i16,
    pub h1: u8,
    pub h2: i16,
    pub h3: u8,
    pub h4: i16,
    pub h5: i16,
    pub h6: i8,
}

fn u16_le(b: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([b[at], b[at + 1]])
}

fn i16_le(b: &[u8], at: usize) -> i16 {
    i16::from_le_bytes([b[at], b[at + 1]])
}

impl Calibration {
    /// Build from the two calibration register blocks.
    pub fn from_registers(block0: &[u8; CALIB_00_LEN], block1: &[u8; CALIB_26_LEN]) -> Self {
        Self {
            t1: u16_le(block0, 0),
            t2: i16_le(block0, 2),
            t3: i16_le(block0, 4),
            p1: u16_le(block0, 6),
            p2: i16_le(block0, 8),
            p3: i16_le(block0, 10),
            p4: i16_le(block0, 12),
            p5: i16_le(block0, 14),
            p6: i16_le(block0, 16),
            p7: i16_le(block0, 18),
            p8: i16_le(block0, 20),
            p9: i16_le(block0, 22),
            // block0[24] (0xA0) is unused
            h1: block0[25],
            h2: i16_le(block1, 0),
            h3: block1[2],
            // H4 and H5 share the nibbles of 0xE5.
            h4: ((block1[3] as i8 as i16) << 4) | (block1[4] & 0x0F) as i16,
            h5: ((block1[5] as i8 as i16) << 4) | (block1[4] >> 4) as i16,
            h6: block1[6] as i8,
        }
    }
}

// ── Raw data ────────────────────────────────────────────────────────────────

/// Uncompensated ADC values from one burst read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawData {
    pub pressure: i32,
    pub temperature: i32,
    pub humidity: i32,
}

impl RawData {
    pub fn from_registers(b: &[u8; DATA_LEN]) -> Self {
        let twenty = |msb: u8, lsb: u8, xlsb: u8| {
            ((msb as i32) << 12) | ((lsb as i32) << 4) | ((xlsb as i32) >> 4)
        };
        Self {
            pressure: twenty(b[0], b[1], b[2]),
            temperature: twenty(b[3], b[4], b[5]),
            humidity: ((b[6] as i32) << 8) | b[7] as i32,
        }
    }
}

// ── Compensation ────────────────────────────────────────────────────────────

/// Returns (°C, t_fine). `t_fine` feeds the pressure and humidity formulas.
pub fn compensate_temperature(cal: &Calibration, adc_t: i32) -> (f64, f64) {
    let adc = adc_t as f64;
    let t1 = cal.t1 as f64;
    let var1 = (adc / 16384.0 - t1 / 1024.0) * cal.t2 as f64;
    let d = adc / 131072.0 - t1 / 8192.0;
    let var2 = d * d * cal.t3 as f64;
    let t_fine = var1 + var2;
    (t_fine / 5120.0, t_fine)
}

/// Pressure in Pa.
pub fn compensate_pressure(cal: &Calibration, adc_p: i32, t_fine: f64) -> f64 {
    let mut var1 = t_fine / 2.0 - 64000.0;
    let mut var2 = var1 * var1 * cal.p6 as f64 / 32768.0;
    var2 += var1 * cal.p5 as f64 * 2.0;
    var2 = var2 / 4.0 + cal.p4 as f64 * 65536.0;
    var1 = (cal.p3 as f64 * var1 * var1 / 524288.0 + cal.p2 as f64 * var1) / 524288.0;
    var1 = (1.0 + var1 / 32768.0) * cal.p1 as f64;
    if var1 == 0.0 {
        return 0.0;
    }
    let mut p = 1048576.0 - adc_p as f64;
    p = (p - var2 / 4096.0) * 6250.0 / var1;
    var1 = cal.p9 as f64 * p * p / 2147483648.0;
    var2 = p * cal.p8 as f64 / 32768.0;
    p + (var1 + var2 + cal.p7 as f64) / 16.0
}

/// Relative humidity in percent, clamped to 0..=100.
pub fn compensate_humidity(cal: &Calibration, adc_h: i32, t_fine: f64) -> f64 {
    let mut h = t_fine - 76800.0;
    h = (adc_h as f64 - (cal.h4 as f64 * 64.0 + cal.h5 as f64 / 16384.0 * h))
        * (cal.h2 as f64 / 65536.0
            * (1.0 + cal.h6 as f64 / 67108864.0 * h * (1.0 + cal.h3 as f64 / 67108864.0 * h)));
    h *= 1.0 - cal.h1 as f64 * h / 524288.0;
    h.clamp(0.0, 100.0)
}

/// Turn one burst read into a sample. Skipped channels come back as NaN so
/// the last-good filter upstream takes over.
pub fn compensate(cal: &Calibration, raw: RawData) -> crate::sensor::RawSample {
    if raw.temperature == SKIPPED_20BIT {
        return crate::sensor::RawSample::failed();
    }
    let (temperature, t_fine) = compensate_temperature(cal, raw.temperature);
    let pressure = if raw.pressure == SKIPPED_20BIT {
        f32::NAN
    } else {
        (compensate_pressure(cal, raw.pressure, t_fine) / 100.0) as f32
    };
    let humidity = if raw.humidity == SKIPPED_16BIT {
        f32::NAN
    } else {
        compensate_humidity(cal, raw.humidity, t_fine) as f32
    };
    crate::sensor::RawSample {
        temperature: temperature as f32,
        humidity,
        pressure,
        gas_resistance: None,
    }
}

/// Parse an I2C address such as `"0x76"` or `"118"`. Empty means the
/// default 0x76 (SDO tied to GND).
pub fn parse_addr(val: &str) -> anyhow::Result<u16> {
    let val = val.trim();
    if val.is_empty() {
        return Ok(0x76);
    }
    let addr = match val.strip_prefix("0x").or_else(|| val.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => val.parse(),
    }
    .map_err(|_| anyhow::anyhow!("invalid I2C address: {val:?}"))?;
    anyhow::ensure!(
        addr == 0x76 || addr == 0x77,
        "BME280 address must be 0x76 or 0x77, got {addr:#04x}"
    );
    Ok(addr)
}

// ── Driver ──────────────────────────────────────────────────────────────────

#[cfg(feature = "i2c")]
pub use driver::Bme280;

#[cfg(feature = "i2c")]
mod driver {
    use super::*;
    use crate::sensor::{ClimateSensor, RawSample};
    use rppal::i2c::I2c;
    use std::{thread, time::Duration};

    /// x1 oversampling on all three channels needs at most ~9.3 ms.
    const MEASURE_WAIT: Duration = Duration::from_millis(10);

    /// BME280 driver backed by `rppal::i2c`.
    pub struct Bme280 {
        i2c: I2c,
        cal: Calibration,
    }

    impl Bme280 {
        /// Open I2C bus 1, check the chip id and load calibration.
        pub fn new(addr: u16) -> anyhow::Result<Self> {
            let mut i2c = I2c::new()?;
            i2c.set_slave_address(addr)?;

            let id = i2c.smbus_read_byte(REG_CHIP_ID)?;
            anyhow::ensure!(id == CHIP_ID, "no BME280 at {addr:#04x} (chip id {id:#04x})");

            i2c.smbus_write_byte(REG_RESET, RESET_CMD)?;
            thread::sleep(Duration::from_millis(5));

            let mut block0 = [0u8; CALIB_00_LEN];
            i2c.block_read(REG_CALIB_00, &mut block0)?;
            let mut block1 = [0u8; CALIB_26_LEN];
            i2c.block_read(REG_CALIB_26, &mut block1)?;
            let cal = Calibration::from_registers(&block0, &block1);

            // ctrl_hum only takes effect after a ctrl_meas write.
            i2c.smbus_write_byte(REG_CTRL_HUM, CTRL_HUM_X1)?;

            tracing::info!(addr = format_args!("0x{addr:02x}"), "bme280 initialised");
            Ok(Self { i2c, cal })
        }

        fn read_raw(&mut self) -> anyhow::Result<RawData> {
            self.i2c.smbus_write_byte(REG_CTRL_MEAS, CTRL_MEAS_FORCED_X1)?;
            thread::sleep(MEASURE_WAIT);

            for _ in 0..3 {
                if self.i2c.smbus_read_byte(REG_STATUS)? & STATUS_MEASURING == 0 {
                    break;
                }
                thread::sleep(Duration::from_millis(2));
            }

            let mut buf = [0u8; DATA_LEN];
            self.i2c.block_read(REG_DATA, &mut buf)?;
            Ok(RawData::from_registers(&buf))
        }
    }

    impl ClimateSensor for Bme280 {
        fn sample(&mut self) -> anyhow::Result<RawSample> {
            let raw = self.read_raw()?;
            Ok(compensate(&self.cal, raw))
        }

        fn name(&self) -> &str {
            "bme280"
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
