//! Control layer errors.

use crate::event::EventError;
use crate::interrupts::InterruptError;
use crate::shell::ShellError;
use crate::sssp::SsspError;
use modos_common::config::ConfigError;
use modos_common::sssp::ShutdownKind;
use modos_hal::HalError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("event bus: {0}")]
    Event(#[from] EventError),

    #[error("interrupts: {0}")]
    Interrupt(#[from] InterruptError),

    #[error("SSSP: {0}")]
    Sssp(#[from] SsspError),

    #[error("platform: {0}")]
    Hal(#[from] HalError),

    #[error("no interrupt channel with reaction {0}")]
    MissingChannel(&'static str),

    #[error("failed to spawn thread '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("RT setup failed: {0}")]
    RtSetup(String),

    #[error("shell: {0}")]
    Shell(#[from] ShellError),

    /// The boot agent returned from a terminal callback.
    #[error("boot agent returned from {0} shutdown hand-off")]
    HandoffReturned(ShutdownKind),
}
