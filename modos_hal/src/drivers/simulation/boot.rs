//! Recording boot agent.

use modos_common::boot::{BOOT_AGENT_MAGIC, BootAgent, BootAgentInfo, ReleaseKind, Version};
use modos_common::sssp::ShutdownKind;
use parking_lot::Mutex;
use std::sync::Arc;

/// Boot agent that records each hand-off and returns. On hardware a
/// return from any callback is fatal; here it lets tests observe the
/// shutdown sequence to its end.
pub struct SimBootAgent {
    info: BootAgentInfo,
    calls: Mutex<Vec<ShutdownKind>>,
}

impl SimBootAgent {
    pub fn new() -> Arc<Self> {
        Self::with_info(BootAgentInfo::compatible(
            Version {
                major: 1,
                minor: 1,
                patch: 0,
            },
            ReleaseKind::Release,
        ))
    }

    /// Agent whose header fails the magic check.
    pub fn corrupt() -> Arc<Self> {
        let mut info = BootAgentInfo::compatible(Version::default(), ReleaseKind::Unknown);
        info.magic = !BOOT_AGENT_MAGIC;
        Self::with_info(info)
    }

    pub fn with_info(info: BootAgentInfo) -> Arc<Self> {
        Arc::new(Self {
            info,
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Every hand-off so far, in order.
    pub fn calls(&self) -> Vec<ShutdownKind> {
        self.calls.lock().clone()
    }

    fn record(&self, kind: ShutdownKind) {
        self.calls.lock().push(kind);
    }
}

impl BootAgent for SimBootAgent {
    fn info(&self) -> BootAgentInfo {
        self.info
    }

    fn handle_shutdown_request(&self) {
        self.record(ShutdownKind::Passive);
    }

    fn shutdown_hibernate(&self) {
        self.record(ShutdownKind::Hibernate);
    }

    fn shutdown_deepsleep(&self) {
        self.record(ShutdownKind::DeepSleep);
    }

    fn shutdown_transportation(&self) {
        self.record(ShutdownKind::Transportation);
    }

    fn shutdown_restart(&self) {
        self.record(ShutdownKind::Restart);
    }
}
