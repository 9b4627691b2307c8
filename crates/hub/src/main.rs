mod bot;
mod buffer;
mod config;
mod context;
mod led;
mod mqtt;
mod radio;
mod sampler;
mod staging;
mod state;
mod telegram;
mod web;

use anyhow::{Context, Result};
use std::env;
use tracing_subscriber::EnvFilter;

use homebot_core::{open_sensor, ClimateReader};

use context::HubContext;
use led::Led;
use telegram::TelegramClient;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ── Config ──────────────────────────────────────────────────────
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "hub.toml".to_string());
    let mut cfg = config::load(&config_path)?;
    cfg.apply_env(|key| env::var(key).ok());
    cfg.validate()
        .context("invalid config after environment overrides")?;

    tracing::info!(
        rooms = cfg.rooms.len(),
        local_room = %cfg.room_name(cfg.local_room_id()),
        allowed_chats = cfg.bot.allowed_chats.len(),
        "config loaded from {config_path}"
    );

    // ── Hardware ────────────────────────────────────────────────────
    // Any init failure ends the process; the supervisor restarts it.
    let led = Led::new(cfg.led_gpio).context("failed to initialise status led")?;
    let sensor = open_sensor(&cfg.sensor, &cfg.sim_scenario, &cfg.i2c_addr)
        .context("failed to open climate sensor")?;
    let reader = ClimateReader::new(sensor, cfg.local_room_id(), cfg.sensor_calibration());

    let ctx = HubContext::new(cfg, led);
    ctx.status
        .write()
        .await
        .record_system("hub started".to_string());

    // ── Sockets ─────────────────────────────────────────────────────
    let radio_socket = radio::bind(&ctx.config.radio.bind).await?;
    let listener = web::bind(ctx.config.web.port).await?;
    tokio::spawn({
        let status_led = ctx.led.clone();
        async move { led::signal_ready(&status_led).await }
    });

    // ── Tasks ───────────────────────────────────────────────────────
    tokio::spawn(sampler::run(ctx.clone(), reader));
    tokio::spawn(radio::receive(ctx.clone(), radio_socket));
    tokio::spawn(radio::drain(ctx.clone()));

    match ctx.config.mqtt.clone() {
        Some(mqtt_cfg) => {
            tokio::spawn(mqtt::run(ctx.clone(), mqtt_cfg));
        }
        None => tracing::info!("mqtt not configured, publisher disabled"),
    }

    if ctx.config.bot.token.is_empty() {
        tracing::warn!("BOT_TOKEN not set, chat bot disabled");
    } else {
        let client = TelegramClient::new(&ctx.config.bot.api_base, &ctx.config.bot.token)
            .context("failed to build telegram client")?;
        let bot_ctx = ctx.clone();
        tokio::spawn(async move { bot::run(bot_ctx, &client).await });
    }

    web::serve(ctx, listener).await
}
