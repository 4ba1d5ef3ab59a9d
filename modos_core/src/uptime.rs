//! System uptime.
//!
//! Uptime is kept as an accumulated microsecond count plus the ticks
//! elapsed since the last accumulation. The tick counter wraps, so a
//! virtual timer accumulates at the longest interval the counter
//! supports. Followers snap the accumulator to the nearest multiple of
//! the SYNC period on every deasserting SYNC edge.
//!
//! Threads wait for an uptime deadline with [`UptimeClock::sleep_until`].

use crate::event::{EventError, EventSource, EventWaiter};
use modos_common::consts::{
    MICROSECONDS_PER_DAY, MICROSECONDS_PER_HOUR, MICROSECONDS_PER_MILLISECOND,
    MICROSECONDS_PER_MINUTE, MICROSECONDS_PER_SECOND,
};
use modos_hal::{Tick, TickSource, VirtualTimer};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Wall clock bound on one sleep wait, so cancellation is noticed while
/// the tick counter stands still.
const SLEEP_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Default)]
struct ClockState {
    accumulated_us: u64,
    last_sample: Tick,
    /// Sub-microsecond part of the folded ticks, in microseconds times
    /// the counter frequency. Always below the frequency.
    residue: u64,
    running: bool,
}

/// How a [`UptimeClock::sleep_until`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepOutcome {
    Reached,
    Cancelled,
    /// The clock is not running, so no deadline can be reached.
    ClockStopped,
}

pub struct UptimeClock {
    ticks: Arc<dyn TickSource>,
    state: Mutex<ClockState>,
}

impl UptimeClock {
    pub fn new(ticks: Arc<dyn TickSource>) -> Self {
        Self {
            ticks,
            state: Mutex::new(ClockState::default()),
        }
    }

    /// Zero the clock at the current tick. Called at the rendezvous.
    pub fn start(&self) {
        let mut state = self.state.lock();
        state.accumulated_us = 0;
        state.last_sample = self.ticks.now();
        state.residue = 0;
        state.running = true;
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    /// Fold ticks elapsed since the last sample into the accumulator.
    pub fn accumulate(&self) {
        let mut state = self.state.lock();
        self.fold(&mut state);
    }

    /// Current uptime in microseconds; 0 before [`start`](Self::start).
    pub fn now_us(&self) -> u64 {
        let state = self.state.lock();
        if !state.running {
            return 0;
        }
        let (us, _) = self.split(self.ticks.elapsed_since(state.last_sample), state.residue);
        state.accumulated_us + us
    }

    /// Snap uptime to the nearest multiple of `period_us`.
    ///
    /// A remainder below half a period is subtracted, otherwise the
    /// missing part is added. Returns the signed correction.
    pub fn align_to_period(&self, period_us: u64) -> i64 {
        let mut state = self.state.lock();
        if !state.running || period_us == 0 {
            return 0;
        }
        self.fold(&mut state);
        let remainder = state.accumulated_us % period_us;
        if remainder < period_us / 2 {
            state.accumulated_us -= remainder;
            -(remainder as i64)
        } else {
            let missing = period_us - remainder;
            state.accumulated_us += missing;
            missing as i64
        }
    }

    /// Sleep until uptime reaches `deadline_us`.
    ///
    /// Waits on `timer` in steps of at most `max_interval_ticks`,
    /// rereading uptime after each one, so corrections made meanwhile
    /// move the wake-up with them. Returns early once `cancel` is set.
    ///
    /// # Errors
    ///
    /// `EventError::WaitInInterruptContext` when called from a callback.
    pub fn sleep_until(
        &self,
        deadline_us: u64,
        timer: &dyn VirtualTimer,
        cancel: &AtomicBool,
    ) -> Result<SleepOutcome, EventError> {
        let wake = EventSource::new("sleep");
        let waiter = EventWaiter::new();
        let _listener = wake.register(&waiter, 1);
        let outcome = loop {
            if cancel.load(Ordering::Acquire) {
                break SleepOutcome::Cancelled;
            }
            if !self.is_running() {
                break SleepOutcome::ClockStopped;
            }
            let now = self.now_us();
            if now >= deadline_us {
                break SleepOutcome::Reached;
            }
            let step = self
                .ticks
                .us_to_ticks(deadline_us - now)
                .clamp(1, self.ticks.max_interval_ticks().max(1));
            let source = Arc::clone(&wake);
            timer.set(step, Box::new(move || source.broadcast(1)));
            if let Err(e) = waiter.wait_any(Some(SLEEP_POLL)) {
                timer.reset();
                return Err(e);
            }
        };
        timer.reset();
        Ok(outcome)
    }

    /// Sleep for `us` microseconds of uptime.
    pub fn sleep_for(
        &self,
        us: u64,
        timer: &dyn VirtualTimer,
        cancel: &AtomicBool,
    ) -> Result<SleepOutcome, EventError> {
        self.sleep_until(self.now_us().saturating_add(us), timer, cancel)
    }

    fn fold(&self, state: &mut ClockState) {
        if !state.running {
            return;
        }
        let now = self.ticks.now();
        let elapsed = now.wrapping_sub(state.last_sample) & self.ticks.counter_mask();
        let (us, residue) = self.split(elapsed, state.residue);
        state.accumulated_us += us;
        state.residue = residue;
        state.last_sample = now;
    }

    /// Whole microseconds in `ticks` plus a carried residue, and the new residue.
    fn split(&self, ticks: Tick, residue: u64) -> (u64, u64) {
        let freq = u64::from(self.ticks.frequency_hz());
        let scaled = u64::from(ticks) * 1_000_000 + residue;
        (scaled / freq, scaled % freq)
    }
}

/// Arm `timer` to accumulate `clock` every `max_interval_ticks`, forever.
pub fn arm_accumulation(clock: &Arc<UptimeClock>, timer: &Arc<dyn VirtualTimer>) {
    let interval = clock.ticks.max_interval_ticks();
    let c = Arc::clone(clock);
    let t = Arc::clone(timer);
    timer.set(
        interval,
        Box::new(move || {
            c.accumulate();
            arm_accumulation(&c, &t);
        }),
    );
}

// ─── UptimeBreakdown ────────────────────────────────────────────────

/// Uptime split into calendar-style units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UptimeBreakdown {
    pub days: u64,
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
    pub milliseconds: u16,
    pub microseconds: u16,
}

impl From<u64> for UptimeBreakdown {
    fn from(us: u64) -> Self {
        Self {
            days: us / MICROSECONDS_PER_DAY,
            hours: (us % MICROSECONDS_PER_DAY / MICROSECONDS_PER_HOUR) as u8,
            minutes: (us % MICROSECONDS_PER_HOUR / MICROSECONDS_PER_MINUTE) as u8,
            seconds: (us % MICROSECONDS_PER_MINUTE / MICROSECONDS_PER_SECOND) as u8,
            milliseconds: (us % MICROSECONDS_PER_SECOND / MICROSECONDS_PER_MILLISECOND) as u16,
            microseconds: (us % MICROSECONDS_PER_MILLISECOND) as u16,
        }
    }
}

impl fmt::Display for UptimeBreakdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} days, {} hours, {} minutes, {} seconds, {} milliseconds, {} microseconds",
            self.days, self.hours, self.minutes, self.seconds, self.milliseconds, self.microseconds
        )
    }
}
