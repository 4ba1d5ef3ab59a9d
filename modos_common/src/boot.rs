//! Boot agent interface.
//!
//! The boot agent is external firmware that owns the final power
//! transition. The core hands control to it exactly once, at the end of
//! the shutdown sequence, through one of five callbacks. On hardware the
//! agent publishes a [`CallbackTable`] at a fixed address; hosts and tests
//! implement [`BootAgent`] directly.

use crate::sssp::{SSSP_VERSION_MAJOR, ShutdownKind};
use core::fmt;
use static_assertions::const_assert_eq;
use thiserror::Error;

/// Header value identifying a valid callback table.
pub const BOOT_AGENT_MAGIC: u32 = 0xB007_A6E7;

// ─── Version information ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(C)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Release maturity reported by the boot agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum ReleaseKind {
    Release = 0,
    ReleaseCandidate = 1,
    Beta = 2,
    Alpha = 3,
    PreAlpha = 4,
    #[default]
    Unknown = 0xFF,
}

impl ReleaseKind {
    pub const fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Release,
            1 => Self::ReleaseCandidate,
            2 => Self::Beta,
            3 => Self::Alpha,
            4 => Self::PreAlpha,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for ReleaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Release => "stable",
            Self::ReleaseCandidate => "release candidate",
            Self::Beta => "beta",
            Self::Alpha => "alpha",
            Self::PreAlpha => "pre-alpha",
            Self::Unknown => "<release type unknown>",
        };
        f.write_str(text)
    }
}

/// Identification header of a boot agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootAgentInfo {
    pub magic: u32,
    pub version: Version,
    pub release: ReleaseKind,
    /// SSSP version implemented by the agent (patch unused).
    pub sssp: Version,
}

impl BootAgentInfo {
    /// Header of an agent matching this core.
    pub const fn compatible(version: Version, release: ReleaseKind) -> Self {
        Self {
            magic: BOOT_AGENT_MAGIC,
            version,
            release,
            sssp: Version {
                major: SSSP_VERSION_MAJOR,
                minor: crate::sssp::SSSP_VERSION_MINOR,
                patch: 0,
            },
        }
    }

    /// Check the header against this core. Problems are reported, never
    /// fatal: the callbacks are still invoked.
    pub fn check(&self) -> Result<(), BootAgentError> {
        if self.magic != BOOT_AGENT_MAGIC {
            return Err(BootAgentError::BadMagic {
                found: self.magic,
                expected: BOOT_AGENT_MAGIC,
            });
        }
        if self.sssp.major != SSSP_VERSION_MAJOR {
            return Err(BootAgentError::IncompatibleSssp {
                agent: self.sssp.major,
                core: SSSP_VERSION_MAJOR,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BootAgentError {
    #[error("boot agent magic mismatch: found {found:#010x}, expected {expected:#010x}")]
    BadMagic { found: u32, expected: u32 },

    #[error("boot agent implements SSSP {agent}.x, core implements SSSP {core}.x")]
    IncompatibleSssp { agent: u8, core: u8 },
}

// ─── BootAgent ──────────────────────────────────────────────────────

/// The five terminal entry points of the boot agent.
///
/// On hardware none of the shutdown callbacks return. An implementation
/// that does return signals a fatal condition to the caller.
pub trait BootAgent: Send + Sync {
    fn info(&self) -> BootAgentInfo;

    /// Passive shutdown: another module initiated it.
    fn handle_shutdown_request(&self);
    fn shutdown_hibernate(&self);
    fn shutdown_deepsleep(&self);
    fn shutdown_transportation(&self);
    fn shutdown_restart(&self);
}

/// Invoke the callback matching `kind`. Returns `false` for
/// `ShutdownKind::None`, which has no callback.
pub fn hand_off(agent: &dyn BootAgent, kind: ShutdownKind) -> bool {
    match kind {
        ShutdownKind::None => return false,
        ShutdownKind::Passive => agent.handle_shutdown_request(),
        ShutdownKind::Hibernate => agent.shutdown_hibernate(),
        ShutdownKind::DeepSleep => agent.shutdown_deepsleep(),
        ShutdownKind::Transportation => agent.shutdown_transportation(),
        ShutdownKind::Restart => agent.shutdown_restart(),
    }
    true
}

// ─── Fixed ABI table ────────────────────────────────────────────────

/// Callback table layout as placed in memory by the boot agent.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct CallbackTable {
    pub magic: u32,
    pub agent_version: Version,
    pub release: u8,
    pub sssp_version: Version,
    pub reserved: u8,
    pub shutdown_hibernate: extern "C" fn(),
    pub shutdown_deepsleep: extern "C" fn(),
    pub shutdown_transportation: extern "C" fn(),
    pub shutdown_restart: extern "C" fn(),
    pub handle_shutdown_request: extern "C" fn(),
}

const_assert_eq!(core::mem::size_of::<Version>(), 3);
const_assert_eq!(core::mem::offset_of!(CallbackTable, shutdown_hibernate) % core::mem::align_of::<usize>(), 0);

impl BootAgent for CallbackTable {
    fn info(&self) -> BootAgentInfo {
        BootAgentInfo {
            magic: self.magic,
            version: self.agent_version,
            release: ReleaseKind::from_u8(self.release),
            sssp: self.sssp_version,
        }
    }

    fn handle_shutdown_request(&self) {
        (self.handle_shutdown_request)()
    }

    fn shutdown_hibernate(&self) {
        (self.shutdown_hibernate)()
    }

    fn shutdown_deepsleep(&self) {
        (self.shutdown_deepsleep)()
    }

    fn shutdown_transportation(&self) {
        (self.shutdown_transportation)()
    }

    fn shutdown_restart(&self) {
        (self.shutdown_restart)()
    }
}
