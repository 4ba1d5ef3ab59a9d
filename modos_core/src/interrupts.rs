//! Interrupt channel table.
//!
//! Channel `n` of the table publishes I/O flag `1 << n`. Each channel has
//! a reaction from a closed set; PD and SYNC channels are ordinary
//! channels with a dedicated reaction so the table stays data.
//!
//! Handlers run in interrupt context: they publish on the I/O bus and,
//! for the follower SYNC channel, correct the uptime clock. They never
//! block or log.

use crate::event::EventSource;
use crate::sssp::FollowerCorrection;
use modos_common::board::{InterruptChannelSpec, ReactionKind};
use modos_common::consts::MAX_INTERRUPT_CHANNELS;
use modos_common::events::IoEventFlags;
use modos_common::gpio::{EdgeMode, PinRef};
use modos_hal::{HalError, PadEvents, irq};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InterruptError {
    #[error("{0} interrupt channels exceed the maximum of {MAX_INTERRUPT_CHANNELS}")]
    TooManyChannels(usize),

    #[error("interrupt channel {index} out of range (table has {count})")]
    ChannelOutOfRange { index: usize, count: usize },

    #[error("interrupt channel {0} called from interrupt context")]
    InterruptContext(usize),

    #[error("interrupt driver not started")]
    NotStarted,

    #[error(transparent)]
    Hal(#[from] HalError),
}

/// One row of the dispatch table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterruptChannelConfig {
    pub name: String,
    pub pin: PinRef,
    pub mode: EdgeMode,
    pub autostart: bool,
    pub reaction: ReactionKind,
    pub arg: u8,
}

impl From<&InterruptChannelSpec> for InterruptChannelConfig {
    fn from(spec: &InterruptChannelSpec) -> Self {
        Self {
            name: spec.name.clone(),
            pin: spec.pin,
            mode: spec.mode,
            autostart: spec.autostart,
            reaction: spec.reaction,
            arg: spec.arg,
        }
    }
}

/// Shared state the handlers publish to.
pub struct IrqEnv {
    pub io_events: Arc<EventSource>,
    /// Present on followers only.
    pub follower: Option<Arc<FollowerCorrection>>,
}

/// Handler bound to one channel.
struct IrqHandle {
    io_events: Arc<EventSource>,
    flags: IoEventFlags,
    correction: Option<Arc<FollowerCorrection>>,
}

impl IrqHandle {
    fn fire(&self) {
        if let Some(correction) = &self.correction {
            correction.on_sync_edge();
        }
        self.io_events.broadcast(self.flags.bits());
    }
}

pub struct InterruptDriver {
    pads: Arc<dyn PadEvents>,
    channels: heapless::Vec<InterruptChannelConfig, MAX_INTERRUPT_CHANNELS>,
    started: bool,
}

impl InterruptDriver {
    /// Copy the table. Nothing is armed yet.
    pub fn init(
        pads: Arc<dyn PadEvents>,
        table: &[InterruptChannelConfig],
    ) -> Result<Self, InterruptError> {
        let mut channels = heapless::Vec::new();
        for channel in table {
            channels
                .push(channel.clone())
                .map_err(|_| InterruptError::TooManyChannels(table.len()))?;
        }
        Ok(Self {
            pads,
            channels,
            started: false,
        })
    }

    /// Install every handler and enable the autostart channels.
    pub fn start(&mut self, env: &IrqEnv) -> Result<(), InterruptError> {
        for (index, channel) in self.channels.iter().enumerate() {
            let handle = IrqHandle {
                io_events: Arc::clone(&env.io_events),
                flags: IoEventFlags::channel(index as u8),
                correction: match channel.reaction {
                    ReactionKind::Sync => env.follower.clone(),
                    ReactionKind::Publish | ReactionKind::PowerDown => None,
                },
            };
            self.pads
                .set_callback(channel.pin, Some(Arc::new(move || handle.fire())));
            if channel.autostart {
                self.pads.enable_event(channel.pin, channel.mode)?;
            }
            debug!(
                channel = index,
                name = %channel.name,
                pin = channel.pin,
                reaction = ?channel.reaction,
                autostart = channel.autostart,
                "interrupt channel installed"
            );
        }
        self.started = true;
        Ok(())
    }

    /// Disable every channel and remove the handlers.
    pub fn stop(&mut self) {
        for channel in &self.channels {
            self.pads.disable_event(channel.pin);
            self.pads.set_callback(channel.pin, None);
        }
        self.started = false;
    }

    pub fn enable(&self, index: usize) -> Result<(), InterruptError> {
        let channel = self.checked(index)?;
        self.pads.enable_event(channel.pin, channel.mode)?;
        Ok(())
    }

    pub fn disable(&self, index: usize) -> Result<(), InterruptError> {
        let channel = self.checked(index)?;
        self.pads.disable_event(channel.pin);
        Ok(())
    }

    pub fn is_enabled(&self, index: usize) -> Result<bool, InterruptError> {
        let channel = self.checked(index)?;
        Ok(self.pads.is_event_enabled(channel.pin))
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// I/O flag of the first channel with `reaction`.
    pub fn flags_for(&self, reaction: ReactionKind) -> Option<IoEventFlags> {
        self.channels
            .iter()
            .position(|c| c.reaction == reaction)
            .map(|i| IoEventFlags::channel(i as u8))
    }

    /// I/O flag of the channel called `name`.
    pub fn flags_of(&self, name: &str) -> Option<IoEventFlags> {
        self.channels
            .iter()
            .position(|c| c.name == name)
            .map(|i| IoEventFlags::channel(i as u8))
    }

    fn checked(&self, index: usize) -> Result<&InterruptChannelConfig, InterruptError> {
        if irq::in_interrupt() {
            return Err(InterruptError::InterruptContext(index));
        }
        if !self.started {
            return Err(InterruptError::NotStarted);
        }
        self.channels
            .get(index)
            .ok_or(InterruptError::ChannelOutOfRange {
                index,
                count: self.channels.len(),
            })
    }
}
