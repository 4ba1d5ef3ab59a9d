//! Simulated time base and virtual timers.
//!
//! Time only moves when [`SimTime::advance_to`] is called, either by a
//! test or by the wall-clock pump thread. Due timers fire in deadline
//! order (ties in arming order), each inside an interrupt scope, with
//! the clock set to the timer's deadline.

use crate::irq;
use crate::platform::{Tick, TickSource, TimerCallback, VirtualTimer};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::debug;

struct PendingTimer {
    timer: u64,
    deadline_us: u64,
    seq: u64,
    callback: TimerCallback,
}

#[derive(Default)]
struct TimeState {
    now_us: u64,
    seq: u64,
    queue: Vec<PendingTimer>,
}

/// Shared microsecond time base with a wrapping tick counter.
pub struct SimTime {
    state: Mutex<TimeState>,
    frequency_hz: u32,
    counter_mask: Tick,
    next_timer: AtomicU64,
}

impl SimTime {
    /// `counter_bits` is clamped to `1..=32`.
    pub fn new(frequency_hz: u32, counter_bits: u32) -> Arc<Self> {
        let bits = counter_bits.clamp(1, 32);
        let counter_mask = if bits == 32 { Tick::MAX } else { (1 << bits) - 1 };
        Arc::new(Self {
            state: Mutex::new(TimeState::default()),
            frequency_hz: frequency_hz.max(1),
            counter_mask,
            next_timer: AtomicU64::new(0),
        })
    }

    /// 1 MHz, 32-bit counter.
    pub fn standard() -> Arc<Self> {
        Self::new(1_000_000, 32)
    }

    pub fn now_us(&self) -> u64 {
        self.state.lock().now_us
    }

    /// Counter value at simulated time `us`.
    pub fn ticks_at(&self, us: u64) -> Tick {
        let ticks = u128::from(us) * u128::from(self.frequency_hz) / 1_000_000;
        (ticks as u64 as Tick) & self.counter_mask
    }

    pub fn advance(&self, us: u64) -> usize {
        let target = self.now_us().saturating_add(us);
        self.advance_to(target)
    }

    /// Move time forward to `target_us`, firing every timer due on the
    /// way. Returns the number of callbacks run. Moving backwards is a
    /// no-op.
    pub fn advance_to(&self, target_us: u64) -> usize {
        let mut fired = 0;
        loop {
            let due = {
                let mut state = self.state.lock();
                let next = state
                    .queue
                    .iter()
                    .enumerate()
                    .filter(|(_, p)| p.deadline_us <= target_us)
                    .min_by_key(|(_, p)| (p.deadline_us, p.seq))
                    .map(|(i, _)| i);
                match next {
                    Some(index) => {
                        let pending = state.queue.swap_remove(index);
                        state.now_us = state.now_us.max(pending.deadline_us);
                        Some(pending.callback)
                    }
                    None => {
                        state.now_us = state.now_us.max(target_us);
                        None
                    }
                }
            };
            match due {
                Some(callback) => {
                    let _irq = irq::enter();
                    callback();
                    fired += 1;
                }
                None => return fired,
            }
        }
    }

    /// Create a virtual timer on this time base.
    pub fn timer(self: &Arc<Self>) -> Arc<SimTimer> {
        Arc::new(SimTimer {
            time: Arc::clone(self),
            id: self.next_timer.fetch_add(1, Ordering::Relaxed),
        })
    }

    /// Tick source running `ppm` parts per million fast (or slow, when
    /// negative) relative to this time base.
    pub fn skewed(self: &Arc<Self>, ppm: i32) -> Arc<SkewedTicks> {
        Arc::new(SkewedTicks {
            time: Arc::clone(self),
            ppm: i64::from(ppm),
        })
    }

    pub fn pending_timers(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Drive this time base from the wall clock until `stop` is set.
    pub fn spawn_realtime_pump(
        self: &Arc<Self>,
        stop: Arc<AtomicBool>,
        step: Duration,
    ) -> std::io::Result<JoinHandle<()>> {
        let time = Arc::clone(self);
        std::thread::Builder::new()
            .name("sim-time".to_string())
            .spawn(move || {
                let origin = Instant::now();
                let base = time.now_us();
                debug!(base_us = base, step_us = step.as_micros() as u64, "time pump started");
                while !stop.load(Ordering::Acquire) {
                    std::thread::sleep(step);
                    let elapsed = origin.elapsed().as_micros() as u64;
                    time.advance_to(base + elapsed);
                }
                debug!(now_us = time.now_us(), "time pump stopped");
            })
    }

    fn arm(&self, timer: u64, delay: Tick, callback: TimerCallback) {
        let delay_us = (u64::from(delay) * 1_000_000).div_ceil(u64::from(self.frequency_hz));
        let mut state = self.state.lock();
        state.queue.retain(|p| p.timer != timer);
        let seq = state.seq;
        state.seq += 1;
        let deadline_us = state.now_us + delay_us;
        state.queue.push(PendingTimer {
            timer,
            deadline_us,
            seq,
            callback,
        });
    }

    fn disarm(&self, timer: u64) {
        self.state.lock().queue.retain(|p| p.timer != timer);
    }

    fn is_pending(&self, timer: u64) -> bool {
        self.state.lock().queue.iter().any(|p| p.timer == timer)
    }
}

impl TickSource for SimTime {
    fn now(&self) -> Tick {
        self.ticks_at(self.now_us())
    }

    fn frequency_hz(&self) -> u32 {
        self.frequency_hz
    }

    fn counter_mask(&self) -> Tick {
        self.counter_mask
    }
}

// ─── SimTimer ───────────────────────────────────────────────────────

/// One-shot timer bound to a [`SimTime`].
pub struct SimTimer {
    time: Arc<SimTime>,
    id: u64,
}

impl VirtualTimer for SimTimer {
    fn set(&self, delay: Tick, callback: TimerCallback) {
        self.time.arm(self.id, delay, callback);
    }

    fn reset(&self) {
        self.time.disarm(self.id);
    }

    fn is_armed(&self) -> bool {
        self.time.is_pending(self.id)
    }
}

// ─── SkewedTicks ────────────────────────────────────────────────────

/// Tick source whose oscillator is off by a fixed ppm.
pub struct SkewedTicks {
    time: Arc<SimTime>,
    ppm: i64,
}

impl TickSource for SkewedTicks {
    fn now(&self) -> Tick {
        let base = i128::from(self.time.now_us());
        let local = base * i128::from(1_000_000 + self.ppm) / 1_000_000;
        self.time.ticks_at(local.max(0) as u64)
    }

    fn frequency_hz(&self) -> u32 {
        self.time.frequency_hz
    }

    fn counter_mask(&self) -> Tick {
        self.time.counter_mask
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    type Log = Arc<Mutex<Vec<(&'static str, u64)>>>;

    fn record(log: &Log, tag: &'static str, time: &Arc<SimTime>) -> TimerCallback {
        let log = Arc::clone(log);
        let time = Arc::clone(time);
        Box::new(move || {
            assert!(irq::in_interrupt());
            log.lock().push((tag, time.now_us()));
        })
    }

    #[test]
    fn timers_fire_in_deadline_order_at_their_deadline() {
        let time = SimTime::standard();
        let log = Log::default();
        let a = time.timer();
        let b = time.timer();
        let c = time.timer();
        a.set(300, record(&log, "a", &time));
        b.set(100, record(&log, "b", &time));
        c.set(100, record(&log, "c", &time));

        assert_eq!(time.advance_to(250), 2);
        assert_eq!(*log.lock(), vec![("b", 100), ("c", 100)]);
        assert_eq!(time.now_us(), 250);
        assert!(a.is_armed());

        assert_eq!(time.advance(50), 1);
        assert_eq!(log.lock().last(), Some(&("a", 300)));
        assert!(!a.is_armed());
    }

    #[test]
    fn setting_an_armed_timer_replaces_it() {
        let time = SimTime::standard();
        let log = Log::default();
        let t = time.timer();
        t.set(100, record(&log, "first", &time));
        t.set(500, record(&log, "second", &time));
        assert_eq!(time.pending_timers(), 1);
        time.advance_to(1_000);
        assert_eq!(*log.lock(), vec![("second", 500)]);
    }

    #[test]
    fn reset_disarms() {
        let time = SimTime::standard();
        let log = Log::default();
        let t = time.timer();
        t.set(10, record(&log, "never", &time));
        t.reset();
        t.reset();
        assert_eq!(time.advance(100), 0);
        assert!(log.lock().is_empty());
    }

    #[test]
    fn callback_may_rearm_its_own_timer() {
        let time = SimTime::standard();
        let count = Arc::new(AtomicUsize::new(0));

        fn periodic(timer: Arc<SimTimer>, count: Arc<AtomicUsize>) {
            let t = Arc::clone(&timer);
            timer.set(
                1_000,
                Box::new(move || {
                    count.fetch_add(1, Ordering::SeqCst);
                    periodic(t, count);
                }),
            );
        }

        periodic(time.timer(), Arc::clone(&count));
        time.advance_to(10_500);
        assert_eq!(count.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn narrow_counter_wraps() {
        let time = SimTime::new(1_000_000, 16);
        assert_eq!(time.counter_mask(), 0xFFFF);
        time.advance_to(0x1_0005);
        assert_eq!(time.now(), 5);
        assert_eq!(time.max_interval_ticks(), 0xFFFD);
    }

    #[test]
    fn slower_tick_rate_scales_timer_delays() {
        let time = SimTime::new(10_000, 32);
        let log = Log::default();
        time.timer().set(5, record(&log, "t", &time));
        time.advance_to(1_000);
        assert_eq!(*log.lock(), vec![("t", 500)]);
        assert_eq!(time.now(), 10);
    }

    #[test]
    fn skewed_source_runs_fast() {
        let time = SimTime::standard();
        let fast = time.skewed(300_000);
        let slow = time.skewed(-1_000);
        time.advance_to(1_000_000);
        assert_eq!(fast.now(), 1_300_000);
        assert_eq!(slow.now(), 999_000);
    }

    #[test]
    fn backwards_advance_is_ignored() {
        let time = SimTime::standard();
        time.advance_to(500);
        time.advance_to(100);
        assert_eq!(time.now_us(), 500);
    }
}
