//! Startup/Shutdown Synchronization Protocol (SSSP) vocabulary.
//!
//! The protocol itself runs in `modos_core::sssp`; this module holds the
//! plain data every participant agrees on: stages, shutdown kinds, module
//! roles and the protocol version.

use core::fmt;
use serde::{Deserialize, Serialize};

/// Implemented SSSP version. A boot agent must match the major number.
pub const SSSP_VERSION_MAJOR: u8 = 1;
pub const SSSP_VERSION_MINOR: u8 = 3;

// ─── Stage ──────────────────────────────────────────────────────────

/// Position of a module in the system lifecycle.
///
/// Stages only ever move forward; the derived ordering follows the
/// lifecycle order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum Stage {
    /// Local initialization, SYNC held asserted.
    #[default]
    Startup2_1 = 0,
    /// SYNC released, waiting for the rendezvous.
    Startup2_2 = 1,
    Operation = 2,
    /// Shutdown decided, lines being asserted.
    Shutdown1_1 = 3,
    /// Shutdown announced, participants stopping.
    Shutdown1_2 = 4,
    /// Control handed to the boot agent.
    Shutdown1_3 = 5,
}

impl Stage {
    pub const fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Startup2_1),
            1 => Some(Self::Startup2_2),
            2 => Some(Self::Operation),
            3 => Some(Self::Shutdown1_1),
            4 => Some(Self::Shutdown1_2),
            5 => Some(Self::Shutdown1_3),
            _ => None,
        }
    }

    pub const fn is_shutdown(self) -> bool {
        matches!(self, Self::Shutdown1_1 | Self::Shutdown1_2 | Self::Shutdown1_3)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Startup2_1 => "STARTUP_2_1",
            Self::Startup2_2 => "STARTUP_2_2",
            Self::Operation => "OPERATION",
            Self::Shutdown1_1 => "SHUTDOWN_1_1",
            Self::Shutdown1_2 => "SHUTDOWN_1_2",
            Self::Shutdown1_3 => "SHUTDOWN_1_3",
        };
        f.write_str(name)
    }
}

// ─── ShutdownKind ───────────────────────────────────────────────────

/// The reason the system goes down. Latched exactly once per boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ShutdownKind {
    #[default]
    None = 0,
    /// Another module initiated the shutdown (observed on PD).
    Passive = 1,
    Hibernate = 2,
    DeepSleep = 3,
    Transportation = 4,
    Restart = 5,
}

impl ShutdownKind {
    pub const fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::None),
            1 => Some(Self::Passive),
            2 => Some(Self::Hibernate),
            3 => Some(Self::DeepSleep),
            4 => Some(Self::Transportation),
            5 => Some(Self::Restart),
            _ => None,
        }
    }

    pub const fn is_none(self) -> bool {
        matches!(self, Self::None)
    }

    /// Whether this module initiates the shutdown and must assert PD.
    pub const fn is_active(self) -> bool {
        !matches!(self, Self::None | Self::Passive)
    }
}

impl fmt::Display for ShutdownKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Passive => "passive",
            Self::Hibernate => "hibernate",
            Self::DeepSleep => "deepsleep",
            Self::Transportation => "transportation",
            Self::Restart => "restart",
        };
        f.write_str(name)
    }
}

// ─── Role ───────────────────────────────────────────────────────────

/// Exactly one module on the bus is the master; it drives the SYNC clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Master,
    #[default]
    Follower,
}

impl Role {
    pub const fn is_master(self) -> bool {
        matches!(self, Self::Master)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Master => f.write_str("master"),
            Self::Follower => f.write_str("follower"),
        }
    }
}
