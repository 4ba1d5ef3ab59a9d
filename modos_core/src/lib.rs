//! # ModOS Control Layer
//!
//! Control layer of a module on a modular robot bus. All modules share a
//! power-down line (PD) and a synchronization line (SYNC), both wired-AND
//! and active low. Over these two lines the modules rendezvous at startup,
//! keep their uptime clocks aligned to a common period and agree on how to
//! shut down.
//!
//! ## Control thread
//!
//! One [`control::ControlLoop`] per module owns a [`system::SystemContext`]
//! and walks it through the SSSP stages in [`sssp`]. It blocks only on the
//! event bus ([`event`]), where interrupt handlers ([`interrupts`]) publish
//! I/O flags and shutdown requests arrive as OS flags.
//!
//! ## Around it
//!
//! - [`uptime`] - 64-bit microsecond clock over a wrapping tick counter
//! - [`participants`] - Threads joined during shutdown
//! - [`peripherals`] - Peripherals stopped before the boot agent hand-off
//! - [`shell`] - Line-oriented command shell with `system:shutdown`
//! - [`info`] - System information report
//! - [`rt`] - Memory locking and `SCHED_FIFO` for the control thread

pub mod control;
pub mod error;
pub mod event;
pub mod info;
pub mod interrupts;
pub mod participants;
pub mod peripherals;
pub mod rt;
pub mod shell;
pub mod sssp;
pub mod system;
pub mod uptime;

pub use control::{ControlLoop, ModuleHandle, ModuleHooks, NoHooks};
pub use error::CoreError;
pub use system::SystemContext;
