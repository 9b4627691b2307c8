use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::{Mutex, RwLock};

use homebot_core::RoomId;

use crate::buffer::{RoomStore, SharedRooms};
use crate::config::Config;
use crate::led::{Led, SharedLed};
use crate::staging::StagingSlot;
use crate::state::{RoomStatus, SharedState, StatusResponse, SystemState};

/// Everything the hub's tasks share. Cloning is cheap; each field carries its
/// own lock so tasks only contend on the resource they touch.
#[derive(Clone)]
pub struct HubContext {
    pub config: Arc<Config>,
    pub rooms: SharedRooms,
    pub status: SharedState,
    pub led: SharedLed,
    /// Last state set through [`HubContext::set_led`]. Readable while a
    /// blink holds the LED lock.
    led_on: Arc<AtomicBool>,
    pub staging: Arc<StagingSlot>,
}

impl HubContext {
    pub fn new(config: Config, led: Led) -> Self {
        let rooms = RoomStore::new(config.room_ids());
        let led_on = led.is_on();
        Self {
            config: Arc::new(config),
            rooms: Arc::new(RwLock::new(rooms)),
            status: Arc::new(RwLock::new(SystemState::new())),
            led: Arc::new(Mutex::new(led)),
            led_on: Arc::new(AtomicBool::new(led_on)),
            staging: Arc::new(StagingSlot::new()),
        }
    }

    pub fn room_name(&self, id: RoomId) -> String {
        self.config.room_name(id)
    }

    pub async fn set_led(&self, on: bool) {
        self.led.lock().await.set(on);
        self.led_on.store(on, Ordering::Relaxed);
    }

    pub fn led_on(&self) -> bool {
        self.led_on.load(Ordering::Relaxed)
    }

    /// Current epoch seconds, shifted by the configured offset.
    pub fn now(&self) -> i64 {
        OffsetDateTime::now_utc().unix_timestamp() + self.config.time_offset_sec
    }

    /// Snapshot for `/api/status`. Takes each lock in turn, never two at once,
    /// and never the LED lock.
    pub async fn status_snapshot(&self) -> StatusResponse {
        let rooms: Vec<RoomStatus> = {
            let store = self.rooms.read().await;
            store
                .rooms()
                .map(|(id, buf)| RoomStatus {
                    id,
                    name: self.room_name(id),
                    count: buf.len(),
                    last: buf.last().copied(),
                })
                .collect()
        };
        let led_on = self.led_on();
        let pending = self.staging.is_pending();
        let st = self.status.read().await;
        st.to_status(rooms, led_on, pending)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
