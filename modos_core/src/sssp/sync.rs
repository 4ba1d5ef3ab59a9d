//! SYNC clock.
//!
//! The master toggles SYNC every half period. Deasserting edges fall on
//! multiples of the period in master uptime: after asserting, the timer is
//! re-armed against an absolute deadline so callback latency does not
//! accumulate. Followers snap their uptime to the period grid on every
//! deasserting edge while in `Operation`.

use crate::uptime::UptimeClock;
use modos_common::gpio::{ControlGpio, GpioState};
use modos_common::sssp::Stage;
use modos_hal::{ControlPin, TickSource, VirtualTimer};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use super::StageView;

// ─── Master ─────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct PulseState {
    running: bool,
    asserted: bool,
    deadline_us: u64,
}

/// Master SYNC pulse generator.
pub struct SyncPulse {
    period_us: u64,
    gpio: ControlGpio,
    pin: Arc<dyn ControlPin>,
    clock: Arc<UptimeClock>,
    ticks: Arc<dyn TickSource>,
    timer: Arc<dyn VirtualTimer>,
    state: Mutex<PulseState>,
    toggles: AtomicU64,
}

impl SyncPulse {
    pub fn new(
        period_us: u64,
        gpio: ControlGpio,
        pin: Arc<dyn ControlPin>,
        clock: Arc<UptimeClock>,
        ticks: Arc<dyn TickSource>,
        timer: Arc<dyn VirtualTimer>,
    ) -> Arc<Self> {
        Arc::new(Self {
            period_us,
            gpio,
            pin,
            clock,
            ticks,
            timer,
            state: Mutex::new(PulseState::default()),
            toggles: AtomicU64::new(0),
        })
    }

    /// First toggle half a period after the rendezvous.
    pub fn start(self: &Arc<Self>) {
        let mut state = self.state.lock();
        *state = PulseState {
            running: true,
            asserted: false,
            deadline_us: 0,
        };
        self.arm(self.period_us / 2);
    }

    pub fn stop(&self) {
        let mut state = self.state.lock();
        state.running = false;
        self.timer.reset();
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    /// Uptime at which the next deasserting edge is due.
    pub fn deadline_us(&self) -> u64 {
        self.state.lock().deadline_us
    }

    pub fn toggles(&self) -> u64 {
        self.toggles.load(Ordering::Relaxed)
    }

    fn arm(self: &Arc<Self>, delay_us: u64) {
        let pulse = Arc::clone(self);
        self.timer
            .set(self.ticks.us_to_ticks(delay_us), Box::new(move || pulse.on_timer()));
    }

    fn on_timer(self: &Arc<Self>) {
        let mut state = self.state.lock();
        if !state.running {
            return;
        }
        state.asserted = !state.asserted;
        let level = if state.asserted {
            self.gpio.level_for(GpioState::Asserted)
        } else {
            self.gpio.level_for(GpioState::Deasserted)
        };
        self.pin.write(level);
        self.toggles.fetch_add(1, Ordering::Relaxed);

        if state.asserted {
            state.deadline_us += self.period_us;
            let delay = state.deadline_us.saturating_sub(self.clock.now_us());
            self.arm(delay);
        } else {
            self.arm(self.period_us / 2);
        }
    }
}

// ─── Follower ───────────────────────────────────────────────────────

/// Follower uptime correction, run from the SYNC interrupt.
pub struct FollowerCorrection {
    clock: Arc<UptimeClock>,
    stage: StageView,
    pin: Arc<dyn ControlPin>,
    gpio: ControlGpio,
    period_us: u64,
    last_correction_us: AtomicI64,
    corrections: AtomicU64,
}

impl FollowerCorrection {
    pub fn new(
        clock: Arc<UptimeClock>,
        stage: StageView,
        pin: Arc<dyn ControlPin>,
        gpio: ControlGpio,
        period_us: u64,
    ) -> Self {
        Self {
            clock,
            stage,
            pin,
            gpio,
            period_us,
            last_correction_us: AtomicI64::new(0),
            corrections: AtomicU64::new(0),
        }
    }

    /// Correct uptime if this edge deasserted SYNC during `Operation`.
    pub fn on_sync_edge(&self) -> Option<i64> {
        if self.stage.get() != Stage::Operation {
            return None;
        }
        if self.gpio.state_of(self.pin.read()) != GpioState::Deasserted {
            return None;
        }
        let correction = self.clock.align_to_period(self.period_us);
        self.last_correction_us.store(correction, Ordering::Relaxed);
        self.corrections.fetch_add(1, Ordering::Relaxed);
        Some(correction)
    }

    pub fn last_correction_us(&self) -> i64 {
        self.last_correction_us.load(Ordering::Relaxed)
    }

    pub fn corrections(&self) -> u64 {
        self.corrections.load(Ordering::Relaxed)
    }
}
