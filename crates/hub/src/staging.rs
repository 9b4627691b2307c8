//! Single-slot hand-off between the radio receiver and the drain task.
//!
//! Holds at most one unconsumed reading. A reading that arrives before the
//! previous one was drained replaces it; the replaced reading is gone.

use std::sync::Mutex;

use homebot_core::Reading;

#[derive(Debug, Default)]
pub struct StagingSlot {
    slot: Mutex<Option<Reading>>,
}

impl StagingSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage `reading`, returning the unconsumed reading it replaced.
    pub fn put(&self, reading: Reading) -> Option<Reading> {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        slot.replace(reading)
    }

    /// Take the staged reading, leaving the slot empty.
    pub fn take(&self) -> Option<Reading> {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        slot.take()
    }

    pub fn is_pending(&self) -> bool {
        self.slot.lock().unwrap_or_else(|e| e.into_inner()).is_some()
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use homebot_core::RoomId;

    fn reading(time: i64) -> Reading {
        Reading {
            room: RoomId::BEDROOM,
            time,
            temperature: 20.0,
            humidity: 50.0,
            pressure: 1010.0,
            altitude: 30.0,
            gas_resistance: None,
        }
    }

    #[test]
    fn empty_slot_yields_nothing() {
        let slot = StagingSlot::new();
        assert!(!slot.is_pending());
        assert!(slot.take().is_none());
    }

    #[test]
    fn take_consumes_and_clears() {
        let slot = StagingSlot::new();
        assert!(slot.put(reading(1)).is_none());
        assert!(slot.is_pending());
        assert_eq!(slot.take().unwrap().time, 1);
        assert!(!slot.is_pending());
        assert!(slot.take().is_none());
    }

    #[test]
    fn second_put_before_drain_overwrites_first() {
        let slot = StagingSlot::new();
        slot.put(reading(1));
        let lost = slot.put(reading(2));
        assert_eq!(lost.map(|r| r.time), Some(1));
        assert_eq!(slot.take().unwrap().time, 2);
        assert!(slot.take().is_none());
    }

    #[test]
    fn burst_keeps_only_latest() {
        let slot = StagingSlot::new();
        let lost = (1..=5).filter_map(|t| slot.put(reading(t))).count();
        assert_eq!(lost, 4);
        assert_eq!(slot.take().unwrap().time, 5);
    }
}
