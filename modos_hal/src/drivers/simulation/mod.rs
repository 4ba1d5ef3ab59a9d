//! Simulation driver.
//!
//! Runs any number of modules on the host. A [`SimNetwork`] owns the
//! shared time base and the shared PD and SYNC lines; every attached
//! module receives its own pad controller, line drivers, timers and boot
//! agent, bundled as a [`Platform`].

mod boot;
mod line;
mod pads;
mod time;

pub use boot::SimBootAgent;
pub use line::{EdgeListener, LineDriver, WiredLine};
pub use pads::SimPads;
pub use time::{SimTime, SimTimer, SkewedTicks};

use crate::platform::{Platform, TickSource};
use modos_common::board::BoardConfig;
use std::sync::Arc;
use tracing::debug;

/// Per-module simulation knobs.
#[derive(Default, Clone)]
pub struct SimModuleOptions {
    /// Oscillator error of this module, in ppm.
    pub drift_ppm: i32,
    /// Boot agent to install; a fresh compatible one when `None`.
    pub boot_agent: Option<Arc<SimBootAgent>>,
}

/// One simulated module: the platform handed to the core plus the
/// simulation-side handles tests poke at.
pub struct SimModule {
    pub platform: Platform,
    pub pads: Arc<SimPads>,
    pub boot_agent: Arc<SimBootAgent>,
    pub pd_driver: Arc<LineDriver>,
    pub sync_driver: Arc<LineDriver>,
}

/// Modules sharing one PD line and one SYNC line.
pub struct SimNetwork {
    time: Arc<SimTime>,
    pd: Arc<WiredLine>,
    sync: Arc<WiredLine>,
}

impl SimNetwork {
    /// Lines take their active levels from `board`.
    pub fn new(time: Arc<SimTime>, board: &BoardConfig) -> Self {
        Self {
            time,
            pd: WiredLine::new("PD", board.pd.active),
            sync: WiredLine::new("SYNC", board.sync.active),
        }
    }

    pub fn time(&self) -> &Arc<SimTime> {
        &self.time
    }

    pub fn pd_line(&self) -> &Arc<WiredLine> {
        &self.pd
    }

    pub fn sync_line(&self) -> &Arc<WiredLine> {
        &self.sync
    }

    pub fn attach_module(&self, board: &BoardConfig) -> SimModule {
        self.attach_module_with(board, SimModuleOptions::default())
    }

    /// Attach a module powered up in stage `Startup2_1`: PD released,
    /// SYNC held asserted.
    pub fn attach_module_with(&self, board: &BoardConfig, options: SimModuleOptions) -> SimModule {
        let pads = SimPads::new();
        pads.attach(board.pd.pin, &self.pd);
        pads.attach(board.sync.pin, &self.sync);

        let pd_driver = self.pd.attach(false);
        let sync_driver = self.sync.attach(true);

        let ticks: Arc<dyn TickSource> = if options.drift_ppm == 0 {
            Arc::clone(&self.time) as Arc<dyn TickSource>
        } else {
            self.time.skewed(options.drift_ppm)
        };
        let boot_agent = options.boot_agent.unwrap_or_else(SimBootAgent::new);

        debug!(
            module = %board.module.name,
            role = %board.role,
            drift_ppm = options.drift_ppm,
            "simulated module attached"
        );

        SimModule {
            platform: Platform {
                ticks,
                pads: Arc::clone(&pads) as _,
                pd: Arc::clone(&pd_driver) as _,
                sync: Arc::clone(&sync_driver) as _,
                uptime_timer: self.time.timer(),
                sync_timer: self.time.timer(),
                boot_agent: Arc::clone(&boot_agent) as _,
            },
            pads,
            boot_agent,
            pd_driver,
            sync_driver,
        }
    }
}
