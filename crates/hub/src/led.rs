//! Status LED. The `gpio` feature gates the real rppal driver; without it, a
//! mock implementation records the state and logs changes.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

#[cfg(feature = "gpio")]
use rppal::gpio::{Gpio, OutputPin};

pub type SharedLed = Arc<Mutex<Led>>;

/// Number of on/off cycles for `/blink`.
pub const BLINK_TIMES: u32 = 10;
/// Half period of one blink cycle.
pub const BLINK_HALF_PERIOD: Duration = Duration::from_millis(100);
/// Cycles flashed once the hub is listening.
pub const READY_BLINKS: u32 = 3;

// ---------------------------------------------------------------------------
// Real GPIO LED (requires rppal + Raspberry Pi hardware)
// ---------------------------------------------------------------------------
#[cfg(feature = "gpio")]
pub struct Led {
    pin: OutputPin,
    on: bool,
}

#[cfg(feature = "gpio")]
impl Led {
    pub fn new(gpio_pin: u8) -> Result<Self> {
        let mut pin = Gpio::new()?.get(gpio_pin)?.into_output();
        pin.set_low();
        tracing::info!(gpio = gpio_pin, "led initialised");
        Ok(Self { pin, on: false })
    }

    pub fn set(&mut self, on: bool) {
        if on {
            self.pin.set_high();
        } else {
            self.pin.set_low();
        }
        self.on = on;
        tracing::debug!(on, "led set");
    }

    pub fn is_on(&self) -> bool {
        self.on
    }
}

// ---------------------------------------------------------------------------
// Mock LED (no hardware, logs state changes)
// ---------------------------------------------------------------------------
#[cfg(not(feature = "gpio"))]
pub struct Led {
    on: bool,
    pub(crate) toggles: u32,
}

#[cfg(not(feature = "gpio"))]
impl Led {
    pub fn new(gpio_pin: u8) -> Result<Self> {
        tracing::info!(gpio = gpio_pin, "[mock-gpio] led registered (not wired)");
        Ok(Self { on: false, toggles: 0 })
    }

    pub fn set(&mut self, on: bool) {
        if self.on != on {
            self.toggles += 1;
        }
        self.on = on;
        tracing::debug!(on, toggles = self.toggles, "[mock-gpio] led set");
    }

    pub fn is_on(&self) -> bool {
        self.on
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Blink `times` cycles, then restore the previous state. Holds the LED lock
/// for the whole sequence so a concurrent `/led_on` lands after the blink.
pub async fn blink(led: &SharedLed, times: u32, half_period: Duration) {
    let mut led = led.lock().await;
    let was_on = led.is_on();
    for _ in 0..times {
        led.set(true);
        tokio::time::sleep(half_period).await;
        led.set(false);
        tokio::time::sleep(half_period).await;
    }
    led.set(was_on);
}

/// Flash the LED to show the hub has bound its sockets.
pub async fn signal_ready(led: &SharedLed) {
    blink(led, READY_BLINKS, BLINK_HALF_PERIOD).await;
    tracing::info!("ready");
}

// ===========================================================================
// Tests
// ===========================================================================
