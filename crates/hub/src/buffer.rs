//! Per-room ring buffers of recent readings.

use std::collections::BTreeMap;
use std::sync::Arc;

use homebot_core::{Reading, RoomId};
use tokio::sync::RwLock;

/// Readings kept per room.
pub const MAX_DATA: usize = 10;

pub type SharedRooms = Arc<RwLock<RoomStore>>;

// ---------------------------------------------------------------------------
// Single room
// ---------------------------------------------------------------------------

/// Fixed-capacity FIFO. `head` indexes the oldest entry; once full, a push
/// overwrites the oldest slot and advances `head`.
#[derive(Debug, Clone)]
pub struct RoomBuffer {
    slots: [Option<Reading>; MAX_DATA],
    head: usize,
    len: usize,
}

impl Default for RoomBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomBuffer {
    pub const fn new() -> Self {
        Self {
            slots: [None; MAX_DATA],
            head: 0,
            len: 0,
        }
    }

    /// Append a reading, evicting the oldest one when full. Returns the
    /// evicted reading, if any.
    pub fn push(&mut self, reading: Reading) -> Option<Reading> {
        if self.len < MAX_DATA {
            let tail = (self.head + self.len) % MAX_DATA;
            self.slots[tail] = Some(reading);
            self.len += 1;
            None
        } else {
            let evicted = self.slots[self.head].replace(reading);
            self.head = (self.head + 1) % MAX_DATA;
            evicted
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Newest reading.
    pub fn last(&self) -> Option<&Reading> {
        if self.len == 0 {
            return None;
        }
        self.slots[(self.head + self.len - 1) % MAX_DATA].as_ref()
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &Reading> + '_ {
        (0..self.len).filter_map(move |i| self.slots[(self.head + i) % MAX_DATA].as_ref())
    }
}

// ---------------------------------------------------------------------------
// All rooms
// ---------------------------------------------------------------------------

/// Which entries of a buffer to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Span {
    All,
    Last,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("unknown room {0}")]
    UnknownRoom(RoomId),
}

/// One buffer per configured room, keyed and iterated by room id.
#[derive(Debug, Clone, Default)]
pub struct RoomStore {
    rooms: BTreeMap<RoomId, RoomBuffer>,
}

impl RoomStore {
    pub fn new(rooms: impl IntoIterator<Item = RoomId>) -> Self {
        Self {
            rooms: rooms.into_iter().map(|id| (id, RoomBuffer::new())).collect(),
        }
    }

    /// Store `reading` in its room's buffer. Rooms are fixed at startup, so a
    /// reading for an unknown room is rejected rather than creating one.
    pub fn append(&mut self, reading: Reading) -> Result<(), StoreError> {
        let buf = self
            .rooms
            .get_mut(&reading.room)
            .ok_or(StoreError::UnknownRoom(reading.room))?;
        buf.push(reading);
        Ok(())
    }

    pub fn room(&self, id: RoomId) -> Option<&RoomBuffer> {
        self.rooms.get(&id)
    }

    pub fn contains(&self, id: RoomId) -> bool {
        self.rooms.contains_key(&id)
    }

    pub fn rooms(&self) -> impl Iterator<Item = (RoomId, &RoomBuffer)> + '_ {
        self.rooms.iter().map(|(id, buf)| (*id, buf))
    }

    pub fn last(&self, id: RoomId) -> Option<&Reading> {
        self.rooms.get(&id).and_then(RoomBuffer::last)
    }

    /// One room as `;`-separated records. Empty string for an empty or
    /// unknown room.
    pub fn render_room(&self, id: RoomId, span: Span) -> String {
        let Some(buf) = self.room(id).filter(|b| !b.is_empty()) else {
            return String::new();
        };
        match span {
            Span::All => buf.iter().map(Reading::to_record).collect::<Vec<_>>().join(";"),
            Span::Last => buf.last().map(Reading::to_record).unwrap_or_default(),
        }
    }

    /// Every room, one line each, ordered by room id.
    pub fn render(&self, span: Span) -> String {
        self.rooms
            .keys()
            .map(|id| self.render_room(*id, span))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ===========================================================================
// Tests
// ===========================================================================
