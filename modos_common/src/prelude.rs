//! Common re-exports.
//!
//! ```rust
//! use modos_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::board::{
    BoardConfig, InterruptChannelSpec, PeripheralSpec, ReactionKind, validate_network,
};
pub use crate::config::{ConfigError, ConfigLoader, LogLevel, SharedConfig};

// ─── SSSP ───────────────────────────────────────────────────────────
pub use crate::sssp::{Role, SSSP_VERSION_MAJOR, SSSP_VERSION_MINOR, ShutdownKind, Stage};

// ─── Events ─────────────────────────────────────────────────────────
pub use crate::events::{IoEventFlags, OsEventFlags, ShellEventFlags};

// ─── GPIO ───────────────────────────────────────────────────────────
pub use crate::gpio::{ControlGpio, Edge, EdgeMode, GpioState, PinLevel, PinRef};

// ─── Boot agent ─────────────────────────────────────────────────────
pub use crate::boot::{BootAgent, BootAgentError, BootAgentInfo};

// ─── Constants ──────────────────────────────────────────────────────
pub use crate::consts::{DEFAULT_SYNC_PERIOD_US, MAX_INTERRUPT_CHANNELS};
