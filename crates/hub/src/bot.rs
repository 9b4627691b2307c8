//! Chat bot: command parsing, allow-list check, dispatch and the polling task.

use std::fmt::Write as _;
use time::macros::format_description;
use time::OffsetDateTime;
use tokio::time::sleep;

use homebot_core::Reading;

use crate::context::HubContext;
use crate::led::{self, BLINK_HALF_PERIOD, BLINK_TIMES};
use crate::telegram::{BotApi, Message};

pub const NOT_AUTHORIZED: &str = "You are not authorized to use this bot.";
pub const INVALID_COMMAND: &str = "Invalid command";
pub const NO_SENSOR_DATA: &str = "No sensor data yet";

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    LedOn,
    LedOff,
    State,
    Blink,
    Help,
    CoreId,
    ReadSensor,
}

impl Command {
    /// Exact match on the message text; no trimming, no arguments.
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "/start" => Some(Self::Start),
            "/led_on" => Some(Self::LedOn),
            "/led_off" => Some(Self::LedOff),
            "/state" => Some(Self::State),
            "/blink" => Some(Self::Blink),
            "/help" => Some(Self::Help),
            "/coreID" => Some(Self::CoreId),
            "/read_sensor" => Some(Self::ReadSensor),
            _ => None,
        }
    }
}

fn command_list() -> &'static str {
    "Use the following commands to control your bot :\n\n\
     /led_on to turn GPIO ON\n\
     /led_off to turn GPIO OFF\n\
     /state to request current GPIO state\n\
     /blink to blink LED\n\
     /read_sensor to display the latest reading of every room\n\
     /help to display this message\n\
     /coreID to display which worker runs this bot\n"
}

fn welcome(name: &str) -> String {
    format!("Welcome, {name}!\n{}", command_list())
}

fn worker_label() -> String {
    let thread = std::thread::current();
    format!("{} ({:?})", thread.name().unwrap_or("unnamed thread"), thread.id())
}

fn format_clock(epoch: i64) -> String {
    let fmt = format_description!("[hour]:[minute]:[second]");
    OffsetDateTime::from_unix_timestamp(epoch)
        .ok()
        .and_then(|t| t.format(&fmt).ok())
        .unwrap_or_else(|| epoch.to_string())
}

fn format_room(out: &mut String, name: &str, r: &Reading) {
    let _ = writeln!(out, "{name}");
    let _ = writeln!(out, "  time: {}", format_clock(r.time));
    let _ = writeln!(out, "  temperature: {:.2} °C", r.temperature);
    let _ = writeln!(out, "  humidity: {:.2} %", r.humidity);
    let _ = writeln!(out, "  pressure: {:.2} hPa", r.pressure);
    let _ = writeln!(out, "  altitude: {:.2} m", r.altitude);
    if let Some(gas) = r.gas_resistance {
        let _ = writeln!(out, "  gas resistance: {gas:.2} kOhm");
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// What to do in response to one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub reply: String,
    /// Blink the LED once the reply has been sent.
    pub blink: bool,
}

impl Outcome {
    fn reply(text: impl Into<String>) -> Self {
        Self {
            reply: text.into(),
            blink: false,
        }
    }
}

pub fn is_authorized(ctx: &HubContext, chat_id: i64) -> bool {
    ctx.config.bot.allowed_chats.contains(&chat_id)
}

/// Decide the reply for `msg` and apply any LED change it asks for.
pub async fn handle(ctx: &HubContext, msg: &Message) -> Outcome {
    if !is_authorized(ctx, msg.chat.id) {
        return Outcome::reply(NOT_AUTHORIZED);
    }

    let text = msg.text.as_deref().unwrap_or("");
    let Some(cmd) = Command::parse(text) else {
        return Outcome::reply(INVALID_COMMAND);
    };

    match cmd {
        Command::Start => Outcome::reply(welcome(msg.from_name())),
        Command::Help => Outcome::reply(command_list()),
        Command::LedOn => {
            ctx.set_led(true).await;
            Outcome::reply("LED state set to ON")
        }
        Command::LedOff => {
            ctx.set_led(false).await;
            Outcome::reply("LED state set to OFF")
        }
        Command::State => {
            let on = ctx.led_on();
            Outcome::reply(if on { "LED is ON" } else { "LED is OFF" })
        }
        Command::Blink => Outcome {
            reply: "LED will blink".into(),
            blink: true,
        },
        Command::CoreId => Outcome::reply(format!("This bot is running on {}", worker_label())),
        Command::ReadSensor => Outcome::reply(read_sensor(ctx).await),
    }
}

async fn read_sensor(ctx: &HubContext) -> String {
    let store = ctx.rooms.read().await;
    let mut out = String::new();
    for (id, buf) in store.rooms() {
        if let Some(r) = buf.last() {
            if !out.is_empty() {
                out.push('\n');
            }
            format_room(&mut out, &ctx.room_name(id), r);
        }
    }
    if out.is_empty() {
        NO_SENSOR_DATA.into()
    } else {
        out
    }
}

// ---------------------------------------------------------------------------
// Polling task
// ---------------------------------------------------------------------------

/// Fetch and answer every pending update, advancing `offset` past each one.
/// Returns the number of updates consumed.
pub async fn poll_once<A: BotApi + ?Sized>(ctx: &HubContext, api: &A, offset: &mut i64) -> usize {
    let mut handled = 0;
    loop {
        let updates = match api.get_updates(*offset).await {
            Ok(u) if u.is_empty() => return handled,
            Ok(u) => u,
            Err(e) => {
                tracing::warn!("bot: getUpdates failed: {e}");
                return handled;
            }
        };
        tracing::debug!(count = updates.len(), "bot: got updates");

        for update in updates {
            *offset = (*offset).max(update.update_id + 1);
            handled += 1;
            let Some(msg) = update.message else { continue };
            respond(ctx, api, &msg).await;
        }
    }
}

async fn respond<A: BotApi + ?Sized>(ctx: &HubContext, api: &A, msg: &Message) {
    let outcome = handle(ctx, msg).await;
    let text = msg.text.as_deref().unwrap_or("");
    tracing::info!(chat = msg.chat.id, text, "bot: message handled");
    ctx.status
        .write()
        .await
        .record_bot(format!("{text:?} from chat {}", msg.chat.id));

    if let Err(e) = api.send_message(msg.chat.id, &outcome.reply).await {
        tracing::warn!(chat = msg.chat.id, "bot: sendMessage failed: {e}");
    }
    if outcome.blink {
        led::blink(&ctx.led, BLINK_TIMES, BLINK_HALF_PERIOD).await;
    }
}

/// Bot task: drain pending updates, then sleep for the poll interval.
pub async fn run<A: BotApi + ?Sized>(ctx: HubContext, api: &A) {
    let interval = ctx.config.timing.bot_poll();
    let mut offset = 0;
    tracing::info!(
        allowed = ctx.config.bot.allowed_chats.len(),
        interval_ms = interval.as_millis() as u64,
        "bot task started"
    );
    loop {
        poll_once(&ctx, api, &mut offset).await;
        sleep(interval).await;
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(all(test, not(feature = "gpio")))]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::led::Led;
    use crate::telegram::{BotApiError, Chat, Update, User};
    use async_trait::async_trait;
    use homebot_core::RoomId;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    const ALLOWED: i64 = 1001;
    const STRANGER: i64 = 666;

    fn ctx() -> HubContext {
        let mut config = Config::default();
        config.bot.allowed_chats = vec![ALLOWED, -42];
        HubContext::new(config, Led::new(2).unwrap())
    }

    fn msg(chat: i64, text: &str) -> Message {
        Message {
            chat: Chat { id: chat },
            from: Some(User {
                first_name: "Ana".into(),
            }),
            text: Some(text.into()),
        }
    }

    fn reading(room: RoomId, time: i64) -> Reading {
        Reading {
            room,
            time,
            temperature: 23.5,
            humidity: 44.0,
            pressure: 1013.2,
            altitude: 120.4,
            gas_resistance: None,
        }
    }

    #[derive(Default)]
    struct MockApi {
        batches: Mutex<VecDeque<Result<Vec<Update>, BotApiError>>>,
        offsets: Mutex<Vec<i64>>,
        sent: Mutex<Vec<(i64, String)>>,
        fail_send: bool,
    }

    impl MockApi {
        fn with_batches(batches: Vec<Vec<Update>>) -> Self {
            Self {
                batches: Mutex::new(batches.into_iter().map(Ok).collect()),
                ..Self::default()
            }
        }

        fn sent(&self) -> Vec<(i64, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BotApi for MockApi {
        async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, BotApiError> {
            self.offsets.lock().unwrap().push(offset);
            self.batches.lock().unwrap().pop_front().unwrap_or(Ok(vec![]))
        }

        async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), BotApiError> {
            if self.fail_send {
                return Err(BotApiError::Api("Bad Request: chat not found".into()));
            }
            self.sent.lock().unwrap().push((chat_id, text.to_string()));
            Ok(())
        }
    }

    fn update(id: i64, chat: i64, text: &str) -> Update {
        Update {
            update_id: id,
            message: Some(msg(chat, text)),
        }
    }

    // -- parse ------------------------------------------------------------

    #[test]
    fn parse_is_exact() {
        assert_eq!(Command::parse("/led_on"), Some(Command::LedOn));
        assert_eq!(Command::parse("/coreID"), Some(Command::CoreId));
        assert_eq!(Command::parse("/coreid"), None);
        assert_eq!(Command::parse(" /state"), None);
        assert_eq!(Command::parse("/state now"), None);
        assert_eq!(Command::parse(""), None);
    }

    // -- handle -----------------------------------------------------------

    #[tokio::test]
    async fn stranger_is_refused_for_every_command() {
        let ctx = ctx();
        for text in [
            "/start", "/led_on", "/led_off", "/state", "/blink", "/help", "/coreID",
            "/read_sensor", "hello",
        ] {
            let out = handle(&ctx, &msg(STRANGER, text)).await;
            assert_eq!(out.reply, NOT_AUTHORIZED, "command {text}");
            assert!(!out.blink);
        }
        assert!(!ctx.led.lock().await.is_on(), "refused /led_on must not touch the led");
    }

    #[tokio::test]
    async fn group_chat_on_allow_list_is_accepted() {
        let out = handle(&ctx(), &msg(-42, "/state")).await;
        assert_eq!(out.reply, "LED is OFF");
    }

    #[tokio::test]
    async fn unknown_text_is_invalid() {
        let out = handle(&ctx(), &msg(ALLOWED, "/dance")).await;
        assert_eq!(out.reply, INVALID_COMMAND);
    }

    #[tokio::test]
    async fn message_without_text_is_invalid() {
        let mut m = msg(ALLOWED, "");
        m.text = None;
        assert_eq!(handle(&ctx(), &m).await.reply, INVALID_COMMAND);
    }

    #[tokio::test]
    async fn led_commands_change_and_report_state() {
        let ctx = ctx();
        assert_eq!(handle(&ctx, &msg(ALLOWED, "/led_on")).await.reply, "LED state set to ON");
        assert_eq!(handle(&ctx, &msg(ALLOWED, "/state")).await.reply, "LED is ON");
        assert_eq!(handle(&ctx, &msg(ALLOWED, "/led_off")).await.reply, "LED state set to OFF");
        assert_eq!(handle(&ctx, &msg(ALLOWED, "/state")).await.reply, "LED is OFF");
    }

    #[tokio::test]
    async fn blink_replies_then_requests_blink() {
        let out = handle(&ctx(), &msg(ALLOWED, "/blink")).await;
        assert_eq!(out.reply, "LED will blink");
        assert!(out.blink);
    }

    #[tokio::test]
    async fn start_greets_by_name_and_help_does_not() {
        let ctx = ctx();
        let start = handle(&ctx, &msg(ALLOWED, "/start")).await.reply;
        let help = handle(&ctx, &msg(ALLOWED, "/help")).await.reply;
        assert!(start.starts_with("Welcome, Ana!\n"));
        assert!(start.ends_with(&help));
        assert!(!help.contains("Welcome"));
        assert!(help.contains("/read_sensor"));
    }

    #[tokio::test]
    async fn core_id_names_a_thread() {
        let out = handle(&ctx(), &msg(ALLOWED, "/coreID")).await;
        assert!(out.reply.starts_with("This bot is running on "));
        assert!(out.reply.contains("ThreadId"));
    }

    #[tokio::test]
    async fn read_sensor_without_data() {
        let out = handle(&ctx(), &msg(ALLOWED, "/read_sensor")).await;
        assert_eq!(out.reply, NO_SENSOR_DATA);
    }

    #[tokio::test]
    async fn read_sensor_lists_latest_per_room() {
        let ctx = ctx();
        {
            let mut rooms = ctx.rooms.write().await;
            rooms.append(reading(RoomId::BEDROOM, 100)).unwrap();
            rooms.append(reading(RoomId::BEDROOM, 3723)).unwrap();
        }
        let out = handle(&ctx, &msg(ALLOWED, "/read_sensor")).await.reply;
        assert!(out.starts_with("Bedroom\n"));
        assert!(out.contains("  time: 01:02:03\n"));
        assert!(out.contains("  temperature: 23.50 °C\n"));
        assert!(out.contains("  pressure: 1013.20 hPa\n"));
        assert!(!out.contains("Living room"), "empty rooms are skipped");
    }

    // -- polling ----------------------------------------------------------

    #[tokio::test]
    async fn poll_drains_batches_and_advances_offset() {
        let ctx = ctx();
        let api = MockApi::with_batches(vec![
            vec![update(10, ALLOWED, "/led_on"), update(11, STRANGER, "/state")],
            vec![update(12, ALLOWED, "/state")],
        ]);
        let mut offset = 0;

        let handled = poll_once(&ctx, &api, &mut offset).await;

        assert_eq!(handled, 3);
        assert_eq!(offset, 13);
        assert_eq!(*api.offsets.lock().unwrap(), vec![0, 12, 13]);
        assert_eq!(
            api.sent(),
            vec![
                (ALLOWED, "LED state set to ON".to_string()),
                (STRANGER, NOT_AUTHORIZED.to_string()),
                (ALLOWED, "LED is ON".to_string()),
            ]
        );
        assert_eq!(ctx.status.read().await.events.len(), 3);
    }

    #[tokio::test]
    async fn update_without_message_still_advances_offset() {
        let ctx = ctx();
        let api = MockApi::with_batches(vec![vec![Update {
            update_id: 7,
            message: None,
        }]]);
        let mut offset = 0;
        assert_eq!(poll_once(&ctx, &api, &mut offset).await, 1);
        assert_eq!(offset, 8);
        assert!(api.sent().is_empty());
    }

    #[tokio::test]
    async fn get_updates_error_ends_poll() {
        let ctx = ctx();
        let api = MockApi {
            batches: Mutex::new(VecDeque::from([Err(BotApiError::Api("Conflict".into()))])),
            ..MockApi::default()
        };
        let mut offset = 5;
        assert_eq!(poll_once(&ctx, &api, &mut offset).await, 0);
        assert_eq!(offset, 5);
    }

    #[tokio::test]
    async fn send_failure_is_not_retried() {
        let ctx = ctx();
        let api = MockApi {
            batches: Mutex::new(VecDeque::from([Ok(vec![update(1, ALLOWED, "/led_on")])])),
            fail_send: true,
            ..MockApi::default()
        };
        let mut offset = 0;
        assert_eq!(poll_once(&ctx, &api, &mut offset).await, 1);
        assert!(ctx.led.lock().await.is_on(), "the command still took effect");
        assert_eq!(offset, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn blink_runs_after_reply() {
        let ctx = ctx();
        let api = MockApi::with_batches(vec![vec![update(1, ALLOWED, "/blink")]]);
        let mut offset = 0;
        poll_once(&ctx, &api, &mut offset).await;
        assert_eq!(api.sent(), vec![(ALLOWED, "LED will blink".to_string())]);
        let led = ctx.led.lock().await;
        assert!(!led.is_on());
        assert_eq!(led.toggles, BLINK_TIMES * 2);
    }
}
