//! Wired-AND shared control lines.
//!
//! Each module attached to a [`WiredLine`] owns one [`LineDriver`]. The
//! line reads asserted while at least one driver asserts it, the way an
//! open-drain bus with a pull resistor behaves.
//!
//! Every level change queues one edge. A single thread at a time drains
//! the queue into the subscribed listeners, outside the line lock, so
//! listeners see edges in the order the level changed even with
//! concurrent writers, and a listener may drive the line itself.

use crate::platform::ControlPin;
use modos_common::gpio::{ActiveLevel, Edge, PinLevel};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Receives every physical edge of a line.
pub type EdgeListener = Arc<dyn Fn(Edge) + Send + Sync>;

struct LineState {
    drivers: Vec<bool>,
    listeners: Vec<EdgeListener>,
    pending: VecDeque<Edge>,
    delivering: bool,
}

impl LineState {
    fn asserted(&self) -> bool {
        self.drivers.iter().any(|&d| d)
    }
}

pub struct WiredLine {
    name: String,
    active: ActiveLevel,
    state: Mutex<LineState>,
}

impl WiredLine {
    pub fn new(name: impl Into<String>, active: ActiveLevel) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            active,
            state: Mutex::new(LineState {
                drivers: Vec::new(),
                listeners: Vec::new(),
                pending: VecDeque::new(),
                delivering: false,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attach a new module driver, initially asserting or released.
    pub fn attach(self: &Arc<Self>, asserted: bool) -> Arc<LineDriver> {
        let index = {
            let mut state = self.state.lock();
            state.drivers.push(false);
            state.drivers.len() - 1
        };
        let driver = Arc::new(LineDriver {
            line: Arc::clone(self),
            index,
        });
        if asserted {
            self.drive(index, true);
        }
        driver
    }

    pub fn subscribe(&self, listener: EdgeListener) {
        self.state.lock().listeners.push(listener);
    }

    pub fn is_asserted(&self) -> bool {
        self.state.lock().asserted()
    }

    pub fn level(&self) -> PinLevel {
        self.level_for(self.is_asserted())
    }

    /// Number of drivers currently asserting the line.
    pub fn asserting_drivers(&self) -> usize {
        self.state.lock().drivers.iter().filter(|&&d| d).count()
    }

    fn level_for(&self, asserted: bool) -> PinLevel {
        if asserted {
            self.active.level()
        } else {
            self.active.level().inverted()
        }
    }

    fn drive(&self, index: usize, asserted: bool) {
        {
            let mut state = self.state.lock();
            let before = state.asserted();
            state.drivers[index] = asserted;
            let after = state.asserted();
            if before == after {
                return;
            }
            let edge = Edge::into_level(self.level_for(after));
            state.pending.push_back(edge);
            if state.delivering {
                return;
            }
            state.delivering = true;
        }
        self.deliver();
    }

    /// Drain queued edges. Runs on the thread that queued the first one.
    fn deliver(&self) {
        loop {
            let (edge, listeners) = {
                let mut state = self.state.lock();
                match state.pending.pop_front() {
                    Some(edge) => (edge, state.listeners.clone()),
                    None => {
                        state.delivering = false;
                        return;
                    }
                }
            };
            for listener in listeners {
                listener(edge);
            }
        }
    }
}

/// One module's open-drain output on a [`WiredLine`].
pub struct LineDriver {
    line: Arc<WiredLine>,
    index: usize,
}

impl LineDriver {
    pub fn line(&self) -> &Arc<WiredLine> {
        &self.line
    }

    pub fn is_asserting(&self) -> bool {
        self.line.state.lock().drivers[self.index]
    }
}

impl ControlPin for LineDriver {
    fn read(&self) -> PinLevel {
        self.line.level()
    }

    fn write(&self, level: PinLevel) {
        self.line.drive(self.index, level == self.line.active.level());
    }
}
