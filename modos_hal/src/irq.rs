//! Interrupt-context marker.
//!
//! Platform drivers run every interrupt callback (pad event or virtual
//! timer) inside an [`IrqScope`]. Blocking primitives check
//! [`in_interrupt`] and refuse to block, recording the attempt in a
//! process-wide violation counter.

use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};

thread_local! {
    static DEPTH: Cell<u32> = const { Cell::new(0) };
}

static VIOLATIONS: AtomicUsize = AtomicUsize::new(0);

/// Marks the current thread as executing an interrupt callback until
/// dropped. Scopes nest.
#[must_use = "interrupt context ends when the scope is dropped"]
pub struct IrqScope {
    _not_send: PhantomData<*const ()>,
}

pub fn enter() -> IrqScope {
    DEPTH.with(|d| d.set(d.get() + 1));
    IrqScope {
        _not_send: PhantomData,
    }
}

impl Drop for IrqScope {
    fn drop(&mut self) {
        DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}

/// Whether the calling thread is inside an interrupt callback.
pub fn in_interrupt() -> bool {
    DEPTH.with(|d| d.get() > 0)
}

/// Record an attempt to block from interrupt context.
///
/// Returns `true` (and counts a violation) when called from interrupt
/// context.
pub fn check_blocking_call() -> bool {
    if in_interrupt() {
        VIOLATIONS.fetch_add(1, Ordering::Relaxed);
        true
    } else {
        false
    }
}

/// Number of blocking attempts made from interrupt context so far.
pub fn violation_count() -> usize {
    VIOLATIONS.load(Ordering::Relaxed)
}
