//! Platform seams.
//!
//! The control layer needs five things from a board: a free-running tick
//! counter, one-shot virtual timers, the PD and SYNC control pins, pad
//! (edge) interrupts and the boot agent. Each is a trait here so the core
//! never depends on a particular driver.
//!
//! # Callback contract
//!
//! [`TimerCallback`]s and [`PadCallback`]s run in interrupt context (see
//! [`crate::irq`]). They must not block, must not wait on events and must
//! not log. Drivers invoke them with no driver lock held, so a callback may
//! re-arm its own timer or drive a pin.

use modos_common::boot::BootAgent;
use modos_common::gpio::{EdgeMode, PinLevel, PinRef};
use std::sync::Arc;
use thiserror::Error;

/// Raw counter value of a [`TickSource`].
pub type Tick = u32;

/// Ticks kept in reserve below the counter width when arming the longest
/// timer, so the callback always runs before the counter laps.
pub const TIMER_GUARD_TICKS: Tick = 2;

/// One-shot virtual timer callback.
pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// Pad interrupt callback.
pub type PadCallback = Arc<dyn Fn() + Send + Sync + 'static>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HalError {
    #[error("pin {0} is not known to the pad controller")]
    UnknownPin(PinRef),

    #[error("pin {0} has no callback installed")]
    NoCallback(PinRef),

    #[error("platform initialization failed: {0}")]
    InitFailed(String),
}

// ─── Time ───────────────────────────────────────────────────────────

/// Free-running, wrapping system tick counter.
pub trait TickSource: Send + Sync {
    /// Current counter value, already masked to the counter width.
    fn now(&self) -> Tick;

    fn frequency_hz(&self) -> u32;

    /// Mask of valid counter bits.
    fn counter_mask(&self) -> Tick {
        Tick::MAX
    }

    /// Ticks elapsed since `since`, correct across one counter wrap.
    fn elapsed_since(&self, since: Tick) -> Tick {
        self.now().wrapping_sub(since) & self.counter_mask()
    }

    /// Longest delay a virtual timer may be armed with.
    fn max_interval_ticks(&self) -> Tick {
        self.counter_mask().saturating_sub(TIMER_GUARD_TICKS)
    }

    fn ticks_to_us(&self, ticks: Tick) -> u64 {
        u64::from(ticks) * 1_000_000 / u64::from(self.frequency_hz())
    }

    /// Conversion rounds up and saturates at the counter mask.
    fn us_to_ticks(&self, us: u64) -> Tick {
        let freq = u64::from(self.frequency_hz());
        let ticks = us.saturating_mul(freq).div_ceil(1_000_000);
        Tick::try_from(ticks)
            .unwrap_or(Tick::MAX)
            .min(self.counter_mask())
    }
}

/// One-shot timer in the platform's timer queue.
pub trait VirtualTimer: Send + Sync {
    /// Arm the timer `delay` ticks from now. An armed timer is replaced.
    fn set(&self, delay: Tick, callback: TimerCallback);

    /// Disarm. No effect on a disarmed timer.
    fn reset(&self);

    fn is_armed(&self) -> bool;
}

// ─── GPIO ───────────────────────────────────────────────────────────

/// A drivable, readable control pin.
///
/// On a shared open-drain line `read` returns the line level, which may
/// differ from what this module drives.
pub trait ControlPin: Send + Sync {
    fn read(&self) -> PinLevel;
    fn write(&self, level: PinLevel);
}

/// Pad edge interrupt controller.
pub trait PadEvents: Send + Sync {
    /// Install (or with `None`, remove) the callback of `pin`.
    fn set_callback(&self, pin: PinRef, callback: Option<PadCallback>);

    /// Start delivering edges matching `mode`.
    fn enable_event(&self, pin: PinRef, mode: EdgeMode) -> Result<(), HalError>;

    fn disable_event(&self, pin: PinRef);

    fn is_event_enabled(&self, pin: PinRef) -> bool;
}

// ─── Platform bundle ────────────────────────────────────────────────

/// Everything the control layer needs from one module's board.
#[derive(Clone)]
pub struct Platform {
    pub ticks: Arc<dyn TickSource>,
    pub pads: Arc<dyn PadEvents>,
    pub pd: Arc<dyn ControlPin>,
    pub sync: Arc<dyn ControlPin>,
    /// Keeps the uptime accumulator ahead of counter wraps.
    pub uptime_timer: Arc<dyn VirtualTimer>,
    /// Drives the SYNC clock on the master.
    pub sync_timer: Arc<dyn VirtualTimer>,
    pub boot_agent: Arc<dyn BootAgent>,
}
