use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use serde::Serialize;
use std::time::Duration;
use tokio::time::sleep;

use homebot_core::Reading;

use crate::config::MqttConfig;
use crate::context::HubContext;

const KEEP_ALIVE: Duration = Duration::from_secs(30);
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub(crate) struct ClimateMsg {
    pub(crate) time: i64,
    pub(crate) temperature: f32,
    pub(crate) humidity: f32,
    pub(crate) pressure: f32,
    pub(crate) altitude: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) gas_resistance: Option<f32>,
}

impl From<&Reading> for ClimateMsg {
    fn from(r: &Reading) -> Self {
        Self {
            time: r.time,
            temperature: r.temperature,
            humidity: r.humidity,
            pressure: r.pressure,
            altitude: r.altitude,
            gas_resistance: r.gas_resistance,
        }
    }
}

pub(crate) fn payload(reading: &Reading) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(&ClimateMsg::from(reading))
}

// ---------------------------------------------------------------------------
// Publisher
// ---------------------------------------------------------------------------

/// Start the publisher: one task publishes the local room's newest reading
/// every interval, the caller's task drives the connection.
pub async fn run(ctx: HubContext, cfg: MqttConfig) {
    let mut options = MqttOptions::new(cfg.client_id.clone(), cfg.host.clone(), cfg.port);
    options.set_keep_alive(KEEP_ALIVE);
    let (client, eventloop) = AsyncClient::new(options, 10);
    tracing::info!(host = %cfg.host, port = cfg.port, topic = %cfg.topic, "mqtt publisher starting");

    tokio::spawn(publish_loop(ctx.clone(), client, cfg));
    drive(ctx, eventloop).await;
}

async fn publish_loop(ctx: HubContext, client: AsyncClient, cfg: MqttConfig) {
    let interval = Duration::from_millis(cfg.publish_ms);
    let room = ctx.config.local_room_id();
    loop {
        sleep(interval).await;

        let Some(reading) = ctx.rooms.read().await.last(room).copied() else {
            continue;
        };
        let body = match payload(&reading) {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!("mqtt: payload encode failed: {e}");
                continue;
            }
        };
        match client.publish(&cfg.topic, QoS::AtLeastOnce, false, body).await {
            Ok(()) => tracing::debug!(topic = %cfg.topic, time = reading.time, "mqtt: published"),
            Err(e) => tracing::warn!("mqtt: publish failed: {e}"),
        }
    }
}

async fn drive(ctx: HubContext, mut eventloop: EventLoop) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                tracing::info!("mqtt connected");
                let mut st = ctx.status.write().await;
                st.mqtt_connected = true;
                st.record_system("mqtt connected".to_string());
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                tracing::info!("mqtt disconnected");
                let mut st = ctx.status.write().await;
                st.mqtt_connected = false;
                st.record_system("mqtt disconnected".to_string());
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("mqtt error: {e}. reconnecting...");
                let mut st = ctx.status.write().await;
                st.mqtt_connected = false;
                st.record_error(format!("mqtt error: {e}"));
                drop(st);

                sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
