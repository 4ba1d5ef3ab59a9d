//! Peripheral set stopped during shutdown.
//!
//! Exactly one peripheral is the status output (typically the
//! programming/serial interface); it keeps running until the boot agent
//! takes over so the module can still report.

use modos_common::board::PeripheralSpec;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

pub trait Peripheral: Send {
    fn name(&self) -> &str;
    fn start(&mut self);
    fn stop(&mut self);
    fn is_running(&self) -> bool;
}

/// Peripheral with no hardware behind it. Its run state is shared so
/// tests can observe it after the set is moved into the control loop.
pub struct HostPeripheral {
    name: String,
    running: Arc<AtomicBool>,
}

impl HostPeripheral {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }
}

impl Peripheral for HostPeripheral {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self) {
        self.running.store(true, Ordering::Release);
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

struct Entry {
    peripheral: Box<dyn Peripheral>,
    status_output: bool,
}

#[derive(Default)]
pub struct PeripheralSet {
    entries: Vec<Entry>,
}

impl PeripheralSet {
    /// One [`HostPeripheral`] per configured entry.
    pub fn from_specs(specs: &[PeripheralSpec]) -> Self {
        let mut set = Self::default();
        for spec in specs {
            set.add(Box::new(HostPeripheral::new(&spec.name)), spec.status_output);
        }
        set
    }

    pub fn add(&mut self, peripheral: Box<dyn Peripheral>, status_output: bool) {
        self.entries.push(Entry {
            peripheral,
            status_output,
        });
    }

    pub fn start_all(&mut self) {
        for entry in &mut self.entries {
            entry.peripheral.start();
            debug!(peripheral = entry.peripheral.name(), "peripheral started");
        }
    }

    /// Stop everything but the status output. Returns the stopped names.
    pub fn stop_all_except_status(&mut self) -> Vec<String> {
        let mut stopped = Vec::new();
        for entry in self.entries.iter_mut().filter(|e| !e.status_output) {
            entry.peripheral.stop();
            stopped.push(entry.peripheral.name().to_string());
        }
        info!(?stopped, "peripherals stopped");
        stopped
    }

    pub fn is_running(&self, name: &str) -> Option<bool> {
        self.entries
            .iter()
            .find(|e| e.peripheral.name() == name)
            .map(|e| e.peripheral.is_running())
    }

    pub fn status_output(&self) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.status_output)
            .map(|e| e.peripheral.name())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
