//! Local sampling task: reads the hub's own sensor into its room buffer.

use tokio::time::sleep;

use homebot_core::{ClimateReader, ClimateSensor};

use crate::context::HubContext;

/// Take one reading and append it. The write lock is held only for the
/// append, never across the sensor read.
pub async fn sample_once<S: ClimateSensor>(ctx: &HubContext, reader: &mut ClimateReader<S>) {
    let reading = reader.read(ctx.now());
    if let Err(e) = ctx.rooms.write().await.append(reading) {
        tracing::warn!("sampler: reading dropped: {e}");
        return;
    }
    tracing::info!(
        room = %ctx.room_name(reading.room),
        line = %reading.to_line(),
        "sampler: reading stored"
    );
}

pub async fn run<S: ClimateSensor>(ctx: HubContext, mut reader: ClimateReader<S>) {
    let interval = ctx.config.timing.sample();
    tracing::info!(
        room = %ctx.room_name(reader.room()),
        interval_ms = interval.as_millis() as u64,
        "sampler started"
    );
    loop {
        sample_once(&ctx, &mut reader).await;
        sleep(interval).await;
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(all(test, not(feature = "gpio")))]
mod tests {
    use super::*;
    use crate::buffer::MAX_DATA;
    use crate::config::Config;
    use crate::led::Led;
    use homebot_core::{Calibration, RawSample, RoomId};

    /// Yields a fixed temperature sequence; NaN entries model a failed read.
    struct Sequence {
        temps: Vec<f32>,
        i: usize,
    }

    impl ClimateSensor for Sequence {
        fn sample(&mut self) -> anyhow::Result<RawSample> {
            let t = self.temps[self.i % self.temps.len()];
            self.i += 1;
            Ok(RawSample {
                temperature: t,
                humidity: 40.0,
                pressure: 1014.0,
                gas_resistance: None,
            })
        }

        fn name(&self) -> &str {
            "sequence"
        }
    }

    fn setup(temps: Vec<f32>) -> (HubContext, ClimateReader<Sequence>) {
        let ctx = HubContext::new(Config::default(), Led::new(2).unwrap());
        let cal = Calibration {
            temperature_offset: 0.0,
            sea_level_hpa: 1014.0,
        };
        let reader = ClimateReader::new(Sequence { temps, i: 0 }, ctx.config.local_room_id(), cal);
        (ctx, reader)
    }

    #[tokio::test]
    async fn sample_lands_in_local_room() {
        let (ctx, mut reader) = setup(vec![22.0]);
        sample_once(&ctx, &mut reader).await;

        let rooms = ctx.rooms.read().await;
        let last = rooms.last(RoomId::LIVING_ROOM).unwrap();
        assert_eq!(last.temperature, 22.0);
        assert!(last.time > 1_600_000_000);
        assert!(rooms.room(RoomId::BEDROOM).unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_read_repeats_last_value() {
        let (ctx, mut reader) = setup(vec![22.0, f32::NAN]);
        sample_once(&ctx, &mut reader).await;
        sample_once(&ctx, &mut reader).await;

        let rooms = ctx.rooms.read().await;
        let temps: Vec<f32> = rooms
            .room(RoomId::LIVING_ROOM)
            .unwrap()
            .iter()
            .map(|r| r.temperature)
            .collect();
        assert_eq!(temps, vec![22.0, 22.0]);
    }

    #[tokio::test]
    async fn buffer_stays_bounded() {
        let (ctx, mut reader) = setup((0..15).map(|t| t as f32).collect());
        for _ in 0..15 {
            sample_once(&ctx, &mut reader).await;
        }
        let rooms = ctx.rooms.read().await;
        let buf = rooms.room(RoomId::LIVING_ROOM).unwrap();
        assert_eq!(buf.len(), MAX_DATA);
        assert_eq!(buf.iter().next().unwrap().temperature, 5.0);
        assert_eq!(buf.last().unwrap().temperature, 14.0);
    }
}
