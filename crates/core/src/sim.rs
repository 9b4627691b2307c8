//! Stateful room climate simulator for running hub and node without hardware.
//!
//! Models the behaviour that matters to the rest of the system:
//! - Temporal coherence via random walk with mean reversion
//! - A day/night temperature swing (humidity moves the other way)
//! - Per-channel measurement noise
//! - Dropouts: a channel occasionally reads NaN, like a DHT11 or BME280
//!   that missed its conversion window

use std::fmt;

use crate::sensor::{ClimateSensor, RawSample};

// ---------------------------------------------------------------------------
// Gaussian approximation (no extra dependency)
// ---------------------------------------------------------------------------

/// Approximate a sample from N(0,1) using the Irwin-Hall method:
/// sum of 12 uniform [0,1) values minus 6.
fn approx_std_normal() -> f32 {
    let mut sum = 0.0;
    for _ in 0..12 {
        sum += fastrand::f32();
    }
    sum - 6.0
}

fn gaussian(mean: f32, sigma: f32) -> f32 {
    mean + sigma * approx_std_normal()
}

// ---------------------------------------------------------------------------
// Scenario presets
// ---------------------------------------------------------------------------

/// Pre-configured simulation profiles selectable via `SIM_SCENARIO`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// Indoor room, small noise, rare dropouts.
    Steady,
    /// Sun-facing room: large day/night swing, moderate noise.
    Sunny,
    /// Bad wiring: ~20% of channel reads come back NaN.
    Flaky,
    /// Sensor never answers. Every channel is NaN.
    Dead,
}

impl Scenario {
    pub fn from_str_lossy(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "sunny" => Self::Sunny,
            "flaky" => Self::Flaky,
            "dead" => Self::Dead,
            _ => Self::Steady,
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Steady => write!(f, "steady"),
            Self::Sunny => write!(f, "sunny"),
            Self::Flaky => write!(f, "flaky"),
            Self::Dead => write!(f, "dead"),
        }
    }
}

// ---------------------------------------------------------------------------
// Per-quantity random walk
// ---------------------------------------------------------------------------

struct Walk {
    value: f32,
    center: f32,
    sigma: f32,
    reversion: f32,
    noise: f32,
    min: f32,
    max: f32,
}

impl Walk {
    fn step(&mut self) -> f32 {
        let pull = self.reversion * (self.center - self.value);
        self.value = (self.value + pull + gaussian(0.0, self.sigma)).clamp(self.min, self.max);
        (self.value + gaussian(0.0, self.noise)).clamp(self.min, self.max)
    }
}

// ---------------------------------------------------------------------------
// Simulator
// ---------------------------------------------------------------------------

pub struct ClimateSim {
    scenario: Scenario,
    temperature: Walk,
    humidity: Walk,
    pressure: Walk,
    gas: Option<Walk>,
    dropout_prob: f32,
    diurnal_amplitude: f32,
    diurnal_period_s: f32,
    ticks: u64,
}

impl ClimateSim {
    /// `diurnal_period_s` sets the simulated day length. Use something short
    /// (600) to watch charts move, 86400 for real time.
    pub fn new(scenario: Scenario, diurnal_period_s: f32) -> Self {
        let (t_sigma, noise, dropout_prob, amplitude) = match scenario {
            Scenario::Steady => (0.05, 0.05, 0.01, 1.0),
            Scenario::Sunny => (0.1, 0.1, 0.02, 4.0),
            Scenario::Flaky => (0.1, 0.3, 0.2, 1.0),
            Scenario::Dead => (0.0, 0.0, 1.0, 0.0),
        };

        Self {
            scenario,
            temperature: Walk {
                value: gaussian(21.0, 1.0),
                center: 21.0,
                sigma: t_sigma,
                reversion: 0.02,
                noise,
                min: -40.0,
                max: 85.0,
            },
            humidity: Walk {
                value: gaussian(45.0, 3.0),
                center: 45.0,
                sigma: t_sigma * 4.0,
                reversion: 0.02,
                noise: noise * 4.0,
                min: 0.0,
                max: 100.0,
            },
            pressure: Walk {
                value: gaussian(1013.0, 2.0),
                center: 1013.0,
                sigma: 0.05,
                reversion: 0.005,
                noise: 0.1,
                min: 870.0,
                max: 1085.0,
            },
            gas: None,
            dropout_prob,
            diurnal_amplitude: amplitude,
            diurnal_period_s: diurnal_period_s.max(1.0),
            ticks: 0,
        }
    }

    /// Also simulate a BME680-style gas resistance channel (kOhm).
    pub fn with_gas(mut self) -> Self {
        self.gas = Some(Walk {
            value: 120.0,
            center: 120.0,
            sigma: 2.0,
            reversion: 0.05,
            noise: 1.0,
            min: 5.0,
            max: 500.0,
        });
        self
    }

    pub fn scenario(&self) -> Scenario {
        self.scenario
    }

    fn dropout(&self, value: f32) -> f32 {
        if fastrand::f32() < self.dropout_prob {
            f32::NAN
        } else {
            value
        }
    }

    /// Next sample. Channels drop out independently.
    pub fn next_sample(&mut self) -> RawSample {
        self.ticks += 1;

        let now_s = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();
        let day_frac = (now_s % self.diurnal_period_s as f64) as f32 / self.diurnal_period_s;
        let phase = 2.0 * std::f32::consts::PI * day_frac;
        let swing = self.diurnal_amplitude * phase.sin();

        let temperature = self.temperature.step() + swing;
        let humidity = (self.humidity.step() - 2.0 * swing).clamp(0.0, 100.0);
        let pressure = self.pressure.step();
        let gas = self.gas.as_mut().map(Walk::step);

        RawSample {
            temperature: self.dropout(temperature),
            humidity: self.dropout(humidity),
            pressure: self.dropout(pressure),
            gas_resistance: gas.map(|g| self.dropout(g)),
        }
    }
}

impl ClimateSensor for ClimateSim {
    fn sample(&mut self) -> anyhow::Result<RawSample> {
        Ok(self.next_sample())
    }

    fn name(&self) -> &str {
        "sim"
    }
}

// ===========================================================================
// Tests
// ===========================================================================
