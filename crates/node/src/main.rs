use anyhow::{Context, Result};
use std::{env, time::Duration};
use time::OffsetDateTime;
use tokio::net::UdpSocket;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

use homebot_core::frame::{self, FRAME_LEN};
use homebot_core::{open_sensor, Calibration, ClimateReader, RoomId};

#[cfg(feature = "sim")]
const DEFAULT_SENSOR: &str = "sim";
#[cfg(not(feature = "sim"))]
const DEFAULT_SENSOR: &str = "bme280";

// ---------------------------------------------------------------------------
// Env config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
struct NodeConfig {
    room: RoomId,
    hub_addr: String,
    sample_every: Duration,
    calibration: Calibration,
    sensor: String,
    sim_scenario: String,
    i2c_addr: String,
}

impl NodeConfig {
    fn from_env(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Calibration::default();
        Self {
            room: RoomId(
                var("ROOM_ID")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(RoomId::BEDROOM.0),
            ),
            hub_addr: var("HUB_ADDR").unwrap_or_else(|| "127.0.0.1:4210".to_string()),
            sample_every: Duration::from_millis(
                var("SAMPLE_EVERY_MS")
                    .and_then(|s| s.parse().ok())
                    .filter(|ms| *ms > 0)
                    .unwrap_or(1000),
            ),
            calibration: Calibration {
                temperature_offset: var("TEMPERATURE_OFFSET")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.temperature_offset),
                sea_level_hpa: var("SEA_LEVEL_HPA")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.sea_level_hpa),
            },
            sensor: var("SENSOR").unwrap_or_else(|| DEFAULT_SENSOR.to_string()),
            sim_scenario: var("SIM_SCENARIO").unwrap_or_else(|| "steady".to_string()),
            i2c_addr: var("I2C_ADDR").unwrap_or_else(|| "0x76".to_string()),
        }
    }
}

fn now_unix() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

// ---------------------------------------------------------------------------
// Send
// ---------------------------------------------------------------------------

/// Send one frame and report the outcome the way the radio's send callback
/// did. Returns whether the whole frame went out.
async fn send_frame(socket: &UdpSocket, hub_addr: &str, bytes: &[u8; FRAME_LEN]) -> bool {
    match socket.send_to(bytes, hub_addr).await {
        Ok(n) if n == FRAME_LEN => {
            tracing::info!(hub = hub_addr, "delivery success");
            true
        }
        Ok(n) => {
            tracing::warn!(hub = hub_addr, sent = n, "delivery failed: short write");
            false
        }
        Err(e) => {
            tracing::warn!(hub = hub_addr, "delivery failed: {e}");
            false
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = NodeConfig::from_env(|key| env::var(key).ok());
    tracing::info!(
        room = %cfg.room,
        hub = %cfg.hub_addr,
        sensor = %cfg.sensor,
        interval_ms = cfg.sample_every.as_millis() as u64,
        "node starting"
    );

    let sensor = open_sensor(&cfg.sensor, &cfg.sim_scenario, &cfg.i2c_addr)
        .context("failed to open climate sensor")?;
    let mut reader = ClimateReader::new(sensor, cfg.room, cfg.calibration);

    let socket = UdpSocket::bind("0.0.0.0:0")
        .await
        .context("failed to open radio socket")?;

    loop {
        let reading = reader.read(now_unix());
        match frame::encode(&reading) {
            Ok(bytes) => {
                send_frame(&socket, &cfg.hub_addr, &bytes).await;
            }
            Err(e) => tracing::error!("frame encode failed: {e}"),
        }
        sleep(cfg.sample_every).await;
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn now_unix_is_recent() {
        let ts = now_unix();
        // Should be after 2024-01-01 (1704067200) and before 2040-01-01 (2208988800)
        assert!(ts > 1_704_067_200, "timestamp too old: {ts}");
        assert!(ts < 2_208_988_800, "timestamp too far in future: {ts}");
    }

    #[test]
    fn defaults_without_env() {
        let cfg = NodeConfig::from_env(env(&[]));
        assert_eq!(cfg.room, RoomId::BEDROOM);
        assert_eq!(cfg.hub_addr, "127.0.0.1:4210");
        assert_eq!(cfg.sample_every, Duration::from_millis(1000));
        assert_eq!(cfg.calibration, Calibration::default());
        assert_eq!(cfg.sensor, DEFAULT_SENSOR);
    }

    #[test]
    fn env_overrides_apply() {
        let cfg = NodeConfig::from_env(env(&[
            ("ROOM_ID", "1"),
            ("HUB_ADDR", "10.0.0.2:5000"),
            ("SAMPLE_EVERY_MS", "250"),
            ("TEMPERATURE_OFFSET", "0.5"),
            ("SEA_LEVEL_HPA", "1020"),
            ("SIM_SCENARIO", "flaky"),
        ]));
        assert_eq!(cfg.room, RoomId::LIVING_ROOM);
        assert_eq!(cfg.hub_addr, "10.0.0.2:5000");
        assert_eq!(cfg.sample_every, Duration::from_millis(250));
        assert_eq!(cfg.calibration.temperature_offset, 0.5);
        assert_eq!(cfg.calibration.sea_level_hpa, 1020.0);
        assert_eq!(cfg.sim_scenario, "flaky");
    }

    #[test]
    fn garbage_values_fall_back() {
        let cfg = NodeConfig::from_env(env(&[("ROOM_ID", "300"), ("SAMPLE_EVERY_MS", "0")]));
        assert_eq!(cfg.room, RoomId::BEDROOM);
        assert_eq!(cfg.sample_every, Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn frame_reaches_listener() {
        let hub = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let hub_addr = hub.local_addr().unwrap().to_string();
        let node = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let reading = homebot_core::Reading {
            room: RoomId(1),
            time: 1_700_000_000,
            temperature: 21.0,
            humidity: 40.0,
            pressure: 1010.0,
            altitude: 33.0,
            gas_resistance: None,
        };
        let bytes = frame::encode(&reading).unwrap();
        assert!(send_frame(&node, &hub_addr, &bytes).await);

        let mut buf = [0u8; 64];
        let (n, _) = hub.recv_from(&mut buf).await.unwrap();
        assert_eq!(n, FRAME_LEN);
        assert_eq!(frame::decode(&buf[..n]).unwrap(), reading);
    }
}
