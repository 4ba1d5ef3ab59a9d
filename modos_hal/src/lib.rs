//! ModOS Hardware Abstraction Layer
//!
//! The control layer is written against the traits in [`platform`]; a
//! board provides one implementation of each and bundles them into a
//! [`platform::Platform`]. [`irq`] tracks whether the current thread is
//! executing an interrupt callback.
//!
//! The only driver shipped here is [`drivers::simulation`], which runs any
//! number of modules on the host with shared wired-AND lines and a
//! deterministic time base.

pub mod drivers;
pub mod irq;
pub mod platform;

pub use platform::{
    ControlPin, HalError, PadCallback, PadEvents, Platform, Tick, TickSource, TimerCallback,
    VirtualTimer,
};
