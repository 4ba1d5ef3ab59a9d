//! Simulated pad (edge) interrupt controller.

use crate::drivers::simulation::line::WiredLine;
use crate::irq;
use crate::platform::{HalError, PadCallback, PadEvents};
use modos_common::gpio::{Edge, EdgeMode, PinRef};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

#[derive(Default)]
struct PadSlot {
    callback: Option<PadCallback>,
    mode: EdgeMode,
}

/// Per-module pad controller. Pins are either attached to a shared
/// [`WiredLine`] or fired by hand with [`SimPads::trigger`].
#[derive(Default)]
pub struct SimPads {
    slots: Mutex<HashMap<PinRef, PadSlot>>,
}

impl SimPads {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Route the edges of `line` to `pin`.
    pub fn attach(self: &Arc<Self>, pin: PinRef, line: &WiredLine) {
        self.slots.lock().entry(pin).or_default();
        let pads: Weak<Self> = Arc::downgrade(self);
        line.subscribe(Arc::new(move |edge| {
            if let Some(pads) = pads.upgrade() {
                pads.deliver(pin, Some(edge));
            }
        }));
    }

    /// Fire `pin` as if a matching edge occurred. Returns whether a
    /// callback ran.
    pub fn trigger(&self, pin: PinRef) -> Result<bool, HalError> {
        {
            let slots = self.slots.lock();
            let slot = slots.get(&pin).ok_or(HalError::UnknownPin(pin))?;
            if slot.callback.is_none() {
                return Err(HalError::NoCallback(pin));
            }
        }
        Ok(self.deliver(pin, None))
    }

    /// `edge` of `None` matches any enabled mode.
    fn deliver(&self, pin: PinRef, edge: Option<Edge>) -> bool {
        let callback = {
            let slots = self.slots.lock();
            slots.get(&pin).and_then(|slot| {
                let armed = match edge {
                    Some(edge) => slot.mode.matches(edge),
                    None => slot.mode != EdgeMode::None,
                };
                if armed { slot.callback.clone() } else { None }
            })
        };
        match callback {
            Some(callback) => {
                let _irq = irq::enter();
                callback();
                true
            }
            None => false,
        }
    }
}

impl PadEvents for SimPads {
    fn set_callback(&self, pin: PinRef, callback: Option<PadCallback>) {
        self.slots.lock().entry(pin).or_default().callback = callback;
    }

    fn enable_event(&self, pin: PinRef, mode: EdgeMode) -> Result<(), HalError> {
        let mut slots = self.slots.lock();
        let slot = slots.get_mut(&pin).ok_or(HalError::UnknownPin(pin))?;
        slot.mode = mode;
        Ok(())
    }

    fn disable_event(&self, pin: PinRef) {
        if let Some(slot) = self.slots.lock().get_mut(&pin) {
            slot.mode = EdgeMode::None;
        }
    }

    fn is_event_enabled(&self, pin: PinRef) -> bool {
        self.slots
            .lock()
            .get(&pin)
            .is_some_and(|slot| slot.mode != EdgeMode::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modos_common::gpio::{ActiveLevel, PinLevel};
    use crate::platform::ControlPin;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter(pads: &SimPads, pin: PinRef) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        pads.set_callback(
            pin,
            Some(Arc::new(move || {
                assert!(irq::in_interrupt());
                c.fetch_add(1, Ordering::SeqCst);
            })),
        );
        count
    }

    #[test]
    fn edges_are_filtered_by_mode() {
        let line = WiredLine::new("pd", ActiveLevel::Low);
        let pads = SimPads::new();
        pads.attach(0, &line);
        let hits = counter(&pads, 0);
        let driver = line.attach(false);

        pads.enable_event(0, EdgeMode::Falling).unwrap();
        driver.write(PinLevel::Low);
        driver.write(PinLevel::High);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        pads.enable_event(0, EdgeMode::Both).unwrap();
        driver.write(PinLevel::Low);
        driver.write(PinLevel::High);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn disabled_pad_ignores_edges() {
        let line = WiredLine::new("sync", ActiveLevel::Low);
        let pads = SimPads::new();
        pads.attach(1, &line);
        let hits = counter(&pads, 1);
        pads.enable_event(1, EdgeMode::Both).unwrap();
        assert!(pads.is_event_enabled(1));
        pads.disable_event(1);
        assert!(!pads.is_event_enabled(1));

        line.attach(true);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn trigger_fires_enabled_pad_only() {
        let pads = SimPads::new();
        assert_eq!(pads.trigger(7), Err(HalError::UnknownPin(7)));
        let hits = counter(&pads, 7);
        assert_eq!(pads.trigger(7), Ok(false));
        pads.enable_event(7, EdgeMode::Rising).unwrap();
        assert_eq!(pads.trigger(7), Ok(true));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn enabling_unknown_pin_fails() {
        let pads = SimPads::new();
        assert_eq!(
            pads.enable_event(3, EdgeMode::Both),
            Err(HalError::UnknownPin(3))
        );
    }
}
