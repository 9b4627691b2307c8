//! TOML config file loading, validation and environment overrides for the
//! hub.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use homebot_core::{Calibration, RoomId};

// ---------------------------------------------------------------------------
// Config file structures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub rooms: Vec<RoomEntry>,
    /// Room sampled by the hub's own sensor.
    pub local_room: u8,
    /// `"sim"` or `"bme280"`.
    pub sensor: String,
    pub sim_scenario: String,
    pub i2c_addr: String,
    /// BCM pin of the status LED.
    pub led_gpio: u8,
    /// Added to the system clock's epoch seconds before stamping readings.
    pub time_offset_sec: i64,
    pub timing: TimingConfig,
    pub calibration: CalibrationConfig,
    pub bot: BotConfig,
    pub web: WebConfig,
    pub radio: RadioConfig,
    pub mqtt: Option<MqttConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoomEntry {
    pub id: u8,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub bot_poll_ms: u64,
    pub sample_ms: u64,
    pub drain_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub temperature_offset: f32,
    pub sea_level_hpa: f32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Empty disables the bot. Usually supplied through `BOT_TOKEN`.
    pub token: String,
    pub api_base: String,
    pub allowed_chats: Vec<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub port: u16,
    pub auth: Option<BasicAuth>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BasicAuth {
    pub user: String,
    pub pass: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    pub bind: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub topic: String,
    pub publish_ms: u64,
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for Config {
    fn default() -> Self {
        Self {
            rooms: vec![
                RoomEntry {
                    id: RoomId::BEDROOM.0,
                    name: "Bedroom".into(),
                },
                RoomEntry {
                    id: RoomId::LIVING_ROOM.0,
                    name: "Living room".into(),
                },
            ],
            local_room: RoomId::LIVING_ROOM.0,
            sensor: "sim".into(),
            sim_scenario: "steady".into(),
            i2c_addr: "0x76".into(),
            led_gpio: 2,
            time_offset_sec: 0,
            timing: TimingConfig::default(),
            calibration: CalibrationConfig::default(),
            bot: BotConfig::default(),
            web: WebConfig::default(),
            radio: RadioConfig::default(),
            mqtt: None,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            bot_poll_ms: 500,
            sample_ms: 1000,
            drain_ms: 100,
        }
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        let cal = Calibration::default();
        Self {
            temperature_offset: cal.temperature_offset,
            sea_level_hpa: cal.sea_level_hpa,
        }
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_base: "https://api.telegram.org".into(),
            allowed_chats: Vec::new(),
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            auth: None,
        }
    }
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:4210".into(),
        }
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 1883,
            client_id: "homebot-hub".into(),
            topic: "home/climate".into(),
            publish_ms: 5000,
        }
    }
}

// ---------------------------------------------------------------------------
// Accessors
// ---------------------------------------------------------------------------

impl Config {
    pub fn local_room_id(&self) -> RoomId {
        RoomId(self.local_room)
    }

    pub fn room_ids(&self) -> impl Iterator<Item = RoomId> + '_ {
        self.rooms.iter().map(|r| RoomId(r.id))
    }

    /// Display name for a room, falling back to its number.
    pub fn room_name(&self, id: RoomId) -> String {
        self.rooms
            .iter()
            .find(|r| r.id == id.0)
            .map(|r| r.name.clone())
            .unwrap_or_else(|| format!("Room {id}"))
    }

    pub fn sensor_calibration(&self) -> Calibration {
        Calibration {
            temperature_offset: self.calibration.temperature_offset,
            sea_level_hpa: self.calibration.sea_level_hpa,
        }
    }
}

impl TimingConfig {
    pub fn bot_poll(&self) -> Duration {
        Duration::from_millis(self.bot_poll_ms)
    }

    pub fn sample(&self) -> Duration {
        Duration::from_millis(self.sample_ms)
    }

    pub fn drain(&self) -> Duration {
        Duration::from_millis(self.drain_ms)
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Plausible sea-level pressure range in hPa (record low / record high).
const SEA_LEVEL_RANGE: std::ops::RangeInclusive<f32> = 870.0..=1085.0;

const SENSOR_KINDS: &[&str] = &["sim", "sim680", "bme280"];

impl Config {
    /// Validate all config entries. Returns `Ok(())` or an error describing
    /// every violation found (not just the first one).
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        self.validate_rooms(&mut errors);
        self.validate_sensor(&mut errors);
        self.validate_timing(&mut errors);
        self.validate_services(&mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "config validation failed ({} error{}):\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            );
        }
    }

    fn validate_rooms(&self, errors: &mut Vec<String>) {
        let mut seen_ids: HashSet<u8> = HashSet::new();

        if self.rooms.is_empty() {
            errors.push("no rooms defined".into());
        }

        for r in &self.rooms {
            if !seen_ids.insert(r.id) {
                errors.push(format!("room {}: duplicate id", r.id));
            }
            if r.name.trim().is_empty() {
                errors.push(format!("room {}: name is empty", r.id));
            }
        }

        if !self.rooms.is_empty() && !seen_ids.contains(&self.local_room) {
            errors.push(format!(
                "local_room {} does not match any defined room",
                self.local_room
            ));
        }
    }

    fn validate_sensor(&self, errors: &mut Vec<String>) {
        if !SENSOR_KINDS.contains(&self.sensor.as_str()) {
            errors.push(format!(
                "sensor '{}' is not one of: {}",
                self.sensor,
                SENSOR_KINDS.join(", ")
            ));
        }

        if !self.calibration.temperature_offset.is_finite() {
            errors.push("calibration.temperature_offset must be a finite number".into());
        }
        if !SEA_LEVEL_RANGE.contains(&self.calibration.sea_level_hpa) {
            errors.push(format!(
                "calibration.sea_level_hpa {} out of range [{}, {}]",
                self.calibration.sea_level_hpa,
                SEA_LEVEL_RANGE.start(),
                SEA_LEVEL_RANGE.end()
            ));
        }
    }

    fn validate_timing(&self, errors: &mut Vec<String>) {
        let t = &self.timing;
        for (name, value) in [
            ("bot_poll_ms", t.bot_poll_ms),
            ("sample_ms", t.sample_ms),
            ("drain_ms", t.drain_ms),
        ] {
            if value == 0 {
                errors.push(format!("timing.{name} must be positive"));
            }
        }
        if let Some(m) = &self.mqtt {
            if m.publish_ms == 0 {
                errors.push("mqtt.publish_ms must be positive".into());
            }
        }
    }

    fn validate_services(&self, errors: &mut Vec<String>) {
        if self.radio.bind.parse::<SocketAddr>().is_err() {
            errors.push(format!(
                "radio.bind '{}' is not a socket address",
                self.radio.bind
            ));
        }

        let mut seen_chats: HashSet<i64> = HashSet::new();
        for chat in &self.bot.allowed_chats {
            if !seen_chats.insert(*chat) {
                errors.push(format!("bot.allowed_chats: duplicate chat id {chat}"));
            }
        }
        if !self.bot.api_base.starts_with("http://") && !self.bot.api_base.starts_with("https://") {
            errors.push(format!("bot.api_base '{}' is not an http(s) URL", self.bot.api_base));
        }

        if let Some(auth) = &self.web.auth {
            if auth.user.is_empty() {
                errors.push("web.auth.user is empty".into());
            }
            if auth.pass.is_empty() {
                errors.push("web.auth.pass is empty".into());
            }
        }

        if let Some(m) = &self.mqtt {
            if m.host.trim().is_empty() {
                errors.push("mqtt.host is empty".into());
            }
            if m.topic.trim().is_empty() || m.topic.contains(['+', '#']) {
                errors.push(format!(
                    "mqtt.topic '{}' must be a non-empty topic without wildcards",
                    m.topic
                ));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Environment overrides
// ---------------------------------------------------------------------------

impl Config {
    /// Apply `MQTT_HOST`, `MQTT_PORT`, `WEB_PORT`, `RADIO_BIND` and
    /// `BOT_TOKEN` on top of the file. Setting `MQTT_HOST` enables MQTT even
    /// without an `[mqtt]` section.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(host) = var("MQTT_HOST") {
            self.mqtt.get_or_insert_with(MqttConfig::default).host = host;
        }
        if let Some(port) = var("MQTT_PORT").and_then(|s| s.parse().ok()) {
            if let Some(m) = self.mqtt.as_mut() {
                m.port = port;
            }
        }
        if let Some(port) = var("WEB_PORT").and_then(|s| s.parse().ok()) {
            self.web.port = port;
        }
        if let Some(bind) = var("RADIO_BIND") {
            self.radio.bind = bind;
        }
        if let Some(token) = var("BOT_TOKEN") {
            self.bot.token = token;
        }
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Read, parse, and validate a TOML config file. A missing file yields the
/// built-in defaults.
pub fn load(path: &str) -> Result<Config> {
    if !Path::new(path).exists() {
        tracing::warn!(path, "config file not found, using defaults");
        return Ok(Config::default());
    }
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("failed to read config: {path}"))?;
    let config: Config =
        toml::from_str(&contents).with_context(|| format!("failed to parse config: {path}"))?;
    config
        .validate()
        .with_context(|| format!("invalid config: {path}"))?;
    Ok(config)
}

// ===========================================================================
// Tests
// ===========================================================================
