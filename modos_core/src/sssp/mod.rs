//! Startup/Shutdown Synchronization Protocol.
//!
//! ```text
//! Startup2_1 ──► Startup2_2 ──► Operation ──► Shutdown1_1 ──► Shutdown1_2 ──► Shutdown1_3
//!  (SYNC held)   (SYNC released,  (clock runs)  (PD/SYNC         (participants   (boot agent)
//!                 rendezvous)                    asserted)        stopped)
//! ```
//!
//! - [`startup`]: SYNC release and the rendezvous check.
//! - [`sync`]: master SYNC pulse and follower clock correction.
//! - [`shutdown`]: line assertion, announcement and boot agent hand-off.
//! - [`stage`]: forward-only stage tracking and the shutdown latch.

pub mod shutdown;
pub mod stage;
pub mod startup;
pub mod sync;

pub use shutdown::{
    shutdown_deinit, shutdown_final, shutdown_init, shutdown_peripherals, shutdown_stop,
};
pub use stage::{ShutdownLatch, StageTracker, StageView};
pub use startup::{RendezvousOutcome, begin_startup_sync, startup_sync_check};
pub use sync::{FollowerCorrection, SyncPulse};

use modos_common::sssp::{ShutdownKind, Stage};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SsspError {
    #[error("stage transition {from} -> {to} does not move forward")]
    StageRegression { from: Stage, to: Stage },

    #[error("shutdown already latched as {latched}, refusing {requested}")]
    ShutdownAlreadyLatched {
        latched: ShutdownKind,
        requested: ShutdownKind,
    },

    #[error("no shutdown kind given")]
    NoShutdownKind,
}
