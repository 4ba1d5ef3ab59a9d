//! Event bus.
//!
//! An [`EventSource`] broadcasts a flag word to every registered
//! [`EventListener`]. Each listener belongs to an [`EventWaiter`] (one per
//! thread) and carries the event bit it raises on that waiter. A broadcast
//! ORs the flags into the listener and marks the bit pending, so nothing
//! is lost if the waiter is busy; the waiter later takes pending bits one
//! at a time, lowest first.
//!
//! Broadcasting is allowed from interrupt context. Waiting is not.

use modos_common::events::{IoEventFlags, OsEventFlags};
use modos_hal::irq;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Per-waiter event bits.
pub type EventMask = u32;

/// Event bit raised by I/O bus listeners.
pub const IO_EVENT_MASK: EventMask = 1 << 0;
/// Event bit raised by OS bus listeners.
pub const OS_EVENT_MASK: EventMask = 1 << 1;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    #[error("attempted to wait for events from interrupt context")]
    WaitInInterruptContext,
}

// ─── EventWaiter ────────────────────────────────────────────────────

/// Pending event bits of one thread.
#[derive(Default)]
pub struct EventWaiter {
    pending: Mutex<EventMask>,
    cond: Condvar,
}

impl EventWaiter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn signal(&self, mask: EventMask) {
        let mut pending = self.pending.lock();
        *pending |= mask;
        self.cond.notify_all();
    }

    /// Block until an event bit is pending and take the lowest one.
    /// `None` timeout waits forever; `Ok(None)` means the timeout expired.
    pub fn wait_any(&self, timeout: Option<Duration>) -> Result<Option<EventMask>, EventError> {
        if irq::check_blocking_call() {
            return Err(EventError::WaitInInterruptContext);
        }
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut pending = self.pending.lock();
        while *pending == 0 {
            match deadline {
                Some(deadline) => {
                    if self.cond.wait_until(&mut pending, deadline).timed_out() {
                        break;
                    }
                }
                None => self.cond.wait(&mut pending),
            }
        }
        Ok(take_lowest(&mut pending))
    }

    /// Take the lowest pending bit without blocking.
    pub fn poll(&self) -> Option<EventMask> {
        take_lowest(&mut self.pending.lock())
    }

    pub fn pending(&self) -> EventMask {
        *self.pending.lock()
    }
}

fn take_lowest(pending: &mut EventMask) -> Option<EventMask> {
    if *pending == 0 {
        return None;
    }
    let lowest = *pending & pending.wrapping_neg();
    *pending &= !lowest;
    Some(lowest)
}

// ─── EventSource / EventListener ────────────────────────────────────

struct ListenerSlot {
    waiter: Arc<EventWaiter>,
    mask: EventMask,
    interest: u32,
    flags: AtomicU32,
}

/// A broadcast channel of 32 flags.
pub struct EventSource {
    name: &'static str,
    listeners: Mutex<Vec<Arc<ListenerSlot>>>,
}

impl EventSource {
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            listeners: Mutex::new(Vec::new()),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Register `waiter` for every flag; broadcasts raise `mask` on it.
    pub fn register(self: &Arc<Self>, waiter: &Arc<EventWaiter>, mask: EventMask) -> EventListener {
        self.register_with_interest(waiter, mask, u32::MAX)
    }

    /// Register `waiter` for the flags in `interest` only.
    pub fn register_with_interest(
        self: &Arc<Self>,
        waiter: &Arc<EventWaiter>,
        mask: EventMask,
        interest: u32,
    ) -> EventListener {
        let slot = Arc::new(ListenerSlot {
            waiter: Arc::clone(waiter),
            mask,
            interest,
            flags: AtomicU32::new(0),
        });
        self.listeners.lock().push(Arc::clone(&slot));
        EventListener {
            source: Arc::clone(self),
            slot,
        }
    }

    /// OR `flags` into every interested listener and wake its waiter.
    pub fn broadcast(&self, flags: u32) {
        let listeners = self.listeners.lock();
        for slot in listeners.iter() {
            let relevant = flags & slot.interest;
            if relevant != 0 {
                slot.flags.fetch_or(relevant, Ordering::AcqRel);
                slot.waiter.signal(slot.mask);
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

/// Registration of one waiter on one source. Unregisters on drop.
pub struct EventListener {
    source: Arc<EventSource>,
    slot: Arc<ListenerSlot>,
}

impl EventListener {
    pub fn mask(&self) -> EventMask {
        self.slot.mask
    }

    /// Flags accumulated since the last call.
    pub fn get_and_clear_flags(&self) -> u32 {
        self.slot.flags.swap(0, Ordering::AcqRel)
    }

    /// Put back flags taken but not consumed.
    pub fn restore_flags(&self, flags: u32) {
        self.slot.flags.fetch_or(flags, Ordering::AcqRel);
    }

    pub fn peek_flags(&self) -> u32 {
        self.slot.flags.load(Ordering::Acquire)
    }
}

impl Drop for EventListener {
    fn drop(&mut self) {
        self.source
            .listeners
            .lock()
            .retain(|slot| !Arc::ptr_eq(slot, &self.slot));
    }
}

// ─── SystemEvent ────────────────────────────────────────────────────

/// A wake-up of the control loop, classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemEvent {
    Io(IoEventFlags),
    Os(OsEventFlags),
    Timeout,
    Unknown(EventMask),
}

/// The control thread's waiter with its I/O and OS bus registrations.
pub struct Listeners {
    pub waiter: Arc<EventWaiter>,
    pub io: EventListener,
    pub os: EventListener,
}

impl Listeners {
    pub fn register(io_events: &Arc<EventSource>, os_events: &Arc<EventSource>) -> Self {
        let waiter = EventWaiter::new();
        let io = io_events.register(&waiter, IO_EVENT_MASK);
        let os = os_events.register(&waiter, OS_EVENT_MASK);
        Self { waiter, io, os }
    }

    /// Wait for the next event and classify it, consuming its flags.
    pub fn next(&self, timeout: Option<Duration>) -> Result<SystemEvent, EventError> {
        Ok(match self.waiter.wait_any(timeout)? {
            Some(mask) => self.classify(mask),
            None => SystemEvent::Timeout,
        })
    }

    pub fn classify(&self, mask: EventMask) -> SystemEvent {
        if mask & self.io.mask() != 0 {
            SystemEvent::Io(IoEventFlags::from_bits_retain(self.io.get_and_clear_flags()))
        } else if mask & self.os.mask() != 0 {
            SystemEvent::Os(OsEventFlags::from_bits_retain(self.os.get_and_clear_flags()))
        } else {
            SystemEvent::Unknown(mask)
        }
    }
}
