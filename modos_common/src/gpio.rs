//! Control GPIO descriptors.
//!
//! A [`ControlGpio`] binds a board pin to its electrical meaning: which
//! level counts as *asserted*, which edges raise an interrupt and whether
//! the pin may be driven. The shared PD and SYNC lines are both described
//! this way.

use core::fmt;
use serde::{Deserialize, Serialize};

/// Board pin identifier.
pub type PinRef = u16;

// ─── Electrical level and logical state ─────────────────────────────

/// Physical level of a pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PinLevel {
    Low,
    High,
}

impl PinLevel {
    pub const fn inverted(self) -> Self {
        match self {
            Self::Low => Self::High,
            Self::High => Self::Low,
        }
    }
}

/// Logical state of a control signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpioState {
    Asserted,
    Deasserted,
}

impl GpioState {
    pub const fn is_asserted(self) -> bool {
        matches!(self, Self::Asserted)
    }
}

impl fmt::Display for GpioState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Asserted => f.write_str("asserted"),
            Self::Deasserted => f.write_str("deasserted"),
        }
    }
}

/// Level at which a signal counts as asserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActiveLevel {
    High,
    /// Open-drain lines are pulled up and asserted by pulling low.
    #[default]
    Low,
}

impl ActiveLevel {
    pub const fn level(self) -> PinLevel {
        match self {
            Self::High => PinLevel::High,
            Self::Low => PinLevel::Low,
        }
    }
}

// ─── Edges ──────────────────────────────────────────────────────────

/// A physical transition observed on a pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edge {
    Rising,
    Falling,
}

impl Edge {
    /// Edge produced by a transition into `level`.
    pub const fn into_level(level: PinLevel) -> Self {
        match level {
            PinLevel::High => Self::Rising,
            PinLevel::Low => Self::Falling,
        }
    }
}

/// Which edges raise a pad interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeMode {
    Rising,
    Falling,
    Both,
    #[default]
    None,
}

impl EdgeMode {
    pub const fn matches(self, edge: Edge) -> bool {
        match self {
            Self::Rising => matches!(edge, Edge::Rising),
            Self::Falling => matches!(edge, Edge::Falling),
            Self::Both => true,
            Self::None => false,
        }
    }
}

/// Whether the module may drive the pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Input,
    Output,
    Bidirectional,
}

// ─── ControlGpio ────────────────────────────────────────────────────

/// Descriptor of a control signal pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ControlGpio {
    pub pin: PinRef,
    #[serde(default)]
    pub active: ActiveLevel,
    #[serde(default)]
    pub edge: EdgeMode,
    #[serde(default)]
    pub direction: Direction,
}

impl ControlGpio {
    /// Open-drain, active-low, bidirectional line.
    pub const fn open_drain(pin: PinRef, edge: EdgeMode) -> Self {
        Self {
            pin,
            active: ActiveLevel::Low,
            edge,
            direction: Direction::Bidirectional,
        }
    }

    /// Level to drive for `state`.
    pub const fn level_for(&self, state: GpioState) -> PinLevel {
        match state {
            GpioState::Asserted => self.active.level(),
            GpioState::Deasserted => self.active.level().inverted(),
        }
    }

    /// Logical state read from `level`.
    pub fn state_of(&self, level: PinLevel) -> GpioState {
        if level == self.active.level() {
            GpioState::Asserted
        } else {
            GpioState::Deasserted
        }
    }

    /// Physical edge seen when the signal becomes `state`.
    pub const fn edge_for(&self, state: GpioState) -> Edge {
        Edge::into_level(self.level_for(state))
    }

    pub const fn is_bidirectional(&self) -> bool {
        matches!(self.direction, Direction::Bidirectional)
    }
}
