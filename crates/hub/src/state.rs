use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use homebot_core::{Reading, RoomId};

/// Maximum number of events retained in the ring buffer.
const MAX_EVENTS: usize = 200;

// ---------------------------------------------------------------------------
// Public type alias
// ---------------------------------------------------------------------------

pub type SharedState = Arc<RwLock<SystemState>>;

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

/// Hub health and activity, separate from the room buffers so status updates
/// never contend with sampling.
pub struct SystemState {
    pub started_at: Instant,
    pub mqtt_connected: bool,
    pub radio: RadioCounters,
    pub events: VecDeque<SystemEvent>,
}

#[derive(Clone, Copy, Default, Serialize)]
pub struct RadioCounters {
    /// Frames decoded and staged.
    pub received: u64,
    /// Datagrams that failed to decode or named an unknown room.
    pub rejected: u64,
    /// Staged frames replaced before the drain task consumed them.
    pub overwritten: u64,
}

#[derive(Clone, Serialize)]
pub struct SystemEvent {
    #[serde(with = "time::serde::rfc3339")]
    pub ts: OffsetDateTime,
    pub kind: EventKind,
    pub detail: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Radio,
    Bot,
    Error,
    System,
}

// ---------------------------------------------------------------------------
// JSON response (what the API returns)
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct RoomStatus {
    pub id: RoomId,
    pub name: String,
    pub count: usize,
    pub last: Option<Reading>,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub uptime_secs: u64,
    pub mqtt_connected: bool,
    pub led_on: bool,
    pub radio: RadioCounters,
    /// A radio reading is staged and waiting for the drain task.
    pub radio_pending: bool,
    pub rooms: Vec<RoomStatus>,
    pub events: Vec<SystemEvent>,
}

// ---------------------------------------------------------------------------
// Construction & mutation
// ---------------------------------------------------------------------------

impl Default for SystemState {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemState {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            mqtt_connected: false,
            radio: RadioCounters::default(),
            events: VecDeque::with_capacity(MAX_EVENTS),
        }
    }

    /// Record a radio frame that made it into the staging slot.
    pub fn record_frame(&mut self, room: RoomId, overwrote: bool) {
        self.radio.received += 1;
        if overwrote {
            self.radio.overwritten += 1;
            self.push_event(
                EventKind::Radio,
                format!("room {room}: frame replaced an undrained one"),
            );
        }
    }

    /// Record a datagram that was dropped.
    pub fn record_rejected(&mut self, detail: String) {
        self.radio.rejected += 1;
        self.push_event(EventKind::Radio, detail);
    }

    /// Record a handled bot command.
    pub fn record_bot(&mut self, detail: String) {
        self.push_event(EventKind::Bot, detail);
    }

    /// Record an error event.
    pub fn record_error(&mut self, detail: String) {
        self.push_event(EventKind::Error, detail);
    }

    /// Record a generic system event.
    pub fn record_system(&mut self, detail: String) {
        self.push_event(EventKind::System, detail);
    }

    /// Build the JSON-serialisable status snapshot, newest event first.
    pub fn to_status(&self, rooms: Vec<RoomStatus>, led_on: bool, radio_pending: bool) -> StatusResponse {
        StatusResponse {
            uptime_secs: self.started_at.elapsed().as_secs(),
            mqtt_connected: self.mqtt_connected,
            led_on,
            radio: self.radio,
            radio_pending,
            rooms,
            events: self.events.iter().rev().cloned().collect(),
        }
    }

    fn push_event(&mut self, kind: EventKind, detail: String) {
        if self.events.len() >= MAX_EVENTS {
            self.events.pop_front();
        }
        self.events.push_back(SystemEvent {
            ts: OffsetDateTime::now_utc(),
            kind,
            detail,
        });
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_counters_track_overwrites() {
        let mut st = SystemState::new();
        st.record_frame(RoomId(0), false);
        st.record_frame(RoomId(0), true);
        assert_eq!(st.radio.received, 2);
        assert_eq!(st.radio.overwritten, 1);
        assert_eq!(st.events.len(), 1);
    }

    #[test]
    fn rejected_frames_are_counted_and_logged() {
        let mut st = SystemState::new();
        st.record_rejected("bad frame".into());
        assert_eq!(st.radio.rejected, 1);
        assert_eq!(st.events[0].kind, EventKind::Radio);
    }

    #[test]
    fn event_ring_is_bounded() {
        let mut st = SystemState::new();
        for i in 0..(MAX_EVENTS + 25) {
            st.record_system(format!("event {i}"));
        }
        assert_eq!(st.events.len(), MAX_EVENTS);
        assert_eq!(st.events.front().unwrap().detail, "event 25");
    }

    #[test]
    fn status_lists_newest_event_first() {
        let mut st = SystemState::new();
        st.record_system("first".into());
        st.record_error("second".into());
        let status = st.to_status(vec![], true, false);
        assert!(status.led_on);
        assert_eq!(status.events[0].detail, "second");
        assert_eq!(status.events[1].detail, "first");
    }

    #[test]
    fn status_serializes_event_kind_lowercase() {
        let mut st = SystemState::new();
        st.record_bot("/state from 1".into());
        let json = serde_json::to_value(st.to_status(vec![], false, true)).unwrap();
        assert_eq!(json["events"][0]["kind"], "bot");
        assert_eq!(json["radio_pending"], true);
        assert!(json["events"][0]["ts"].is_string());
    }
}
