//! Event flag sets carried on the event buses.
//!
//! - [`IoEventFlags`]: one bit per interrupt channel (`1 << channel`).
//! - [`OsEventFlags`]: shutdown requests and announcements.
//! - [`ShellEventFlags`]: shell lifecycle notifications.

use crate::sssp::ShutdownKind;
use bitflags::bitflags;

bitflags! {
    /// I/O bus flags. Bit `n` is published by interrupt channel `n`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct IoEventFlags: u32 {
        const _ = !0;
    }
}

impl IoEventFlags {
    /// Flag of interrupt channel `index` (0-based, < 32).
    pub const fn channel(index: u8) -> Self {
        Self::from_bits_retain(1u32 << index)
    }
}

bitflags! {
    /// OS bus flags.
    ///
    /// The same flag is used for a shutdown request (raised by a shell
    /// command or application) and for the announcement broadcast in
    /// stage `Shutdown1_1`. `SHUTDOWN` is only ever announced: it marks a
    /// passive shutdown.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
    pub struct OsEventFlags: u32 {
        const SHUTDOWN       = 1 << 0;
        const HIBERNATE      = 1 << 1;
        const DEEPSLEEP      = 1 << 2;
        const TRANSPORTATION = 1 << 3;
        const RESTART        = 1 << 4;
    }
}

impl OsEventFlags {
    /// Shutdown kind named by exactly this flag set, if any.
    pub fn shutdown_kind(self) -> Option<ShutdownKind> {
        if self == Self::SHUTDOWN {
            Some(ShutdownKind::Passive)
        } else if self == Self::HIBERNATE {
            Some(ShutdownKind::Hibernate)
        } else if self == Self::DEEPSLEEP {
            Some(ShutdownKind::DeepSleep)
        } else if self == Self::TRANSPORTATION {
            Some(ShutdownKind::Transportation)
        } else if self == Self::RESTART {
            Some(ShutdownKind::Restart)
        } else {
            None
        }
    }
}

impl ShutdownKind {
    /// OS flag announcing this kind. Empty for `None`.
    pub const fn os_flags(self) -> OsEventFlags {
        match self {
            Self::None => OsEventFlags::empty(),
            Self::Passive => OsEventFlags::SHUTDOWN,
            Self::Hibernate => OsEventFlags::HIBERNATE,
            Self::DeepSleep => OsEventFlags::DEEPSLEEP,
            Self::Transportation => OsEventFlags::TRANSPORTATION,
            Self::Restart => OsEventFlags::RESTART,
        }
    }
}

bitflags! {
    /// Flags broadcast by the shell on its own event source.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ShellEventFlags: u32 {
        const START    = 1 << 0;
        const EXEC     = 1 << 1;
        const DONE     = 1 << 2;
        const EXIT     = 1 << 3;
        const IO_ERROR = 1 << 4;
    }
}
