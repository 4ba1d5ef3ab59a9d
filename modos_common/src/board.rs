//! Board configuration (`board.toml`).
//!
//! Describes one module: its role on the bus, the PD and SYNC control
//! lines, the interrupt channel table and the peripherals the shutdown
//! sequence knows about.
//!
//! ```toml
//! role = "master"
//! sync_period_us = 1000000
//!
//! [shared]
//! service_name = "powermanagement"
//!
//! [module]
//! name = "PowerManagement"
//! version = "1.1"
//!
//! [pd]
//! pin = 0
//! edge = "falling"
//! direction = "bidirectional"
//!
//! [sync]
//! pin = 1
//! edge = "both"
//! direction = "bidirectional"
//!
//! [[interrupts]]
//! name = "sys_pd"
//! pin = 0
//! mode = "falling"
//! autostart = true
//! reaction = "power_down"
//!
//! [[interrupts]]
//! name = "sys_sync"
//! pin = 1
//! mode = "both"
//! autostart = true
//! reaction = "sync"
//!
//! [[peripherals]]
//! name = "progif"
//! status_output = true
//! ```

use crate::config::{ConfigError, ConfigLoader, SharedConfig};
use crate::consts::{
    DEFAULT_SYNC_PERIOD_US, MAX_INTERRUPT_CHANNELS, SYNC_PERIOD_US_MAX, SYNC_PERIOD_US_MIN,
};
use crate::gpio::{ControlGpio, EdgeMode, PinRef};
use crate::sssp::Role;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

// ─── Interrupt table entries ────────────────────────────────────────

/// What an interrupt channel does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionKind {
    /// Publish the channel flag on the I/O bus.
    #[default]
    Publish,
    /// PD line edge: publish the PD flag.
    PowerDown,
    /// SYNC line edge: follower clock correction, then publish.
    Sync,
}

/// One row of the interrupt channel table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterruptChannelSpec {
    pub name: String,
    pub pin: PinRef,
    pub mode: EdgeMode,
    #[serde(default)]
    pub autostart: bool,
    #[serde(default)]
    pub reaction: ReactionKind,
    /// Opaque board-specific argument.
    #[serde(default)]
    pub arg: u8,
}

// ─── Peripherals ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeripheralSpec {
    pub name: String,
    /// Kept running through shutdown to report status.
    #[serde(default)]
    pub status_output: bool,
}

// ─── Module identity and shell ──────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleInfo {
    pub name: String,
    #[serde(default = "default_module_version")]
    pub version: String,
}

fn default_module_version() -> String {
    "1.0".to_string()
}

impl Default for ModuleInfo {
    fn default() -> Self {
        Self {
            name: "SimModule".to_string(),
            version: default_module_version(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_prompt")]
    pub prompt: String,
    /// Print `$ ` alone instead of the prompt text.
    #[serde(default)]
    pub prompt_minimal: bool,
    /// Prefix the prompt with the system uptime.
    #[serde(default)]
    pub prompt_uptime: bool,
    #[serde(default = "default_true")]
    pub match_case: bool,
}

fn default_true() -> bool {
    true
}

fn default_prompt() -> String {
    "modos".to_string()
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            prompt: default_prompt(),
            prompt_minimal: false,
            prompt_uptime: false,
            match_case: true,
        }
    }
}

// ─── BoardConfig ────────────────────────────────────────────────────

/// Complete configuration of one module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardConfig {
    #[serde(default)]
    pub shared: SharedConfig,

    #[serde(default)]
    pub module: ModuleInfo,

    pub role: Role,

    /// SYNC clock period; must be even.
    #[serde(default = "default_sync_period")]
    pub sync_period_us: u64,

    /// Main loop wake-up timeout; 0 waits forever.
    #[serde(default)]
    pub main_loop_timeout_us: u64,

    /// Report events nobody registered for.
    #[serde(default)]
    pub debug: bool,

    pub pd: ControlGpio,
    pub sync: ControlGpio,

    #[serde(default)]
    pub interrupts: Vec<InterruptChannelSpec>,

    #[serde(default)]
    pub peripherals: Vec<PeripheralSpec>,

    #[serde(default)]
    pub shell: ShellConfig,
}

fn default_sync_period() -> u64 {
    DEFAULT_SYNC_PERIOD_US
}

impl Default for BoardConfig {
    /// Two-line reference board: PD on pin 0, SYNC on pin 1, both
    /// open-drain active low, plus a CAN interface and a serial status
    /// output.
    fn default() -> Self {
        Self {
            shared: SharedConfig::default(),
            module: ModuleInfo::default(),
            role: Role::Master,
            sync_period_us: DEFAULT_SYNC_PERIOD_US,
            main_loop_timeout_us: 0,
            debug: false,
            pd: ControlGpio::open_drain(0, EdgeMode::Falling),
            sync: ControlGpio::open_drain(1, EdgeMode::Both),
            interrupts: vec![
                InterruptChannelSpec {
                    name: "sys_pd".to_string(),
                    pin: 0,
                    mode: EdgeMode::Falling,
                    autostart: true,
                    reaction: ReactionKind::PowerDown,
                    arg: 0,
                },
                InterruptChannelSpec {
                    name: "sys_sync".to_string(),
                    pin: 1,
                    mode: EdgeMode::Both,
                    autostart: true,
                    reaction: ReactionKind::Sync,
                    arg: 0,
                },
            ],
            peripherals: vec![
                PeripheralSpec {
                    name: "can".to_string(),
                    status_output: false,
                },
                PeripheralSpec {
                    name: "progif".to_string(),
                    status_output: true,
                },
            ],
            shell: ShellConfig::default(),
        }
    }
}

impl BoardConfig {
    /// Load and validate a board file.
    pub fn load_validated(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Same board with a different role.
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    /// Index of the channel with the given reaction.
    pub fn channel_with(&self, reaction: ReactionKind) -> Option<usize> {
        self.interrupts.iter().position(|c| c.reaction == reaction)
    }

    /// Check everything the control layer relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;

        if self.sync_period_us < SYNC_PERIOD_US_MIN || self.sync_period_us > SYNC_PERIOD_US_MAX {
            return Err(invalid(format!(
                "sync_period_us {} outside [{SYNC_PERIOD_US_MIN}, {SYNC_PERIOD_US_MAX}]",
                self.sync_period_us
            )));
        }
        if self.sync_period_us % 2 != 0 {
            return Err(invalid(format!(
                "sync_period_us {} must be even",
                self.sync_period_us
            )));
        }

        for (name, gpio) in [("pd", &self.pd), ("sync", &self.sync)] {
            if !gpio.is_bidirectional() {
                return Err(invalid(format!("{name} line must be bidirectional")));
            }
        }
        if self.pd.pin == self.sync.pin {
            return Err(invalid("pd and sync share a pin".to_string()));
        }

        self.validate_interrupts()?;
        self.validate_peripherals()
    }

    fn validate_interrupts(&self) -> Result<(), ConfigError> {
        if self.interrupts.len() > MAX_INTERRUPT_CHANNELS {
            return Err(invalid(format!(
                "{} interrupt channels exceed the maximum of {MAX_INTERRUPT_CHANNELS}",
                self.interrupts.len()
            )));
        }

        let mut names = HashSet::new();
        let mut pins = HashSet::new();
        for channel in &self.interrupts {
            if channel.name.is_empty() {
                return Err(invalid("interrupt channel without name".to_string()));
            }
            if !names.insert(channel.name.as_str()) {
                return Err(invalid(format!("duplicate interrupt channel '{}'", channel.name)));
            }
            if !pins.insert(channel.pin) {
                return Err(invalid(format!(
                    "pin {} used by more than one interrupt channel",
                    channel.pin
                )));
            }
        }

        self.validate_reaction(ReactionKind::PowerDown, &self.pd, "pd")?;
        self.validate_reaction(ReactionKind::Sync, &self.sync, "sync")?;

        if let Some(index) = self.channel_with(ReactionKind::Sync) {
            if self.interrupts[index].mode != EdgeMode::Both {
                return Err(invalid("sync channel must trigger on both edges".to_string()));
            }
        }
        Ok(())
    }

    fn validate_reaction(
        &self,
        reaction: ReactionKind,
        gpio: &ControlGpio,
        line: &str,
    ) -> Result<(), ConfigError> {
        let matching: Vec<&InterruptChannelSpec> = self
            .interrupts
            .iter()
            .filter(|c| c.reaction == reaction)
            .collect();
        match matching.as_slice() {
            [channel] if channel.pin == gpio.pin => Ok(()),
            [channel] => Err(invalid(format!(
                "{line} channel '{}' is on pin {}, but the {line} line is pin {}",
                channel.name, channel.pin, gpio.pin
            ))),
            [] => Err(invalid(format!("no interrupt channel for the {line} line"))),
            _ => Err(invalid(format!(
                "{} interrupt channels react to the {line} line",
                matching.len()
            ))),
        }
    }

    fn validate_peripherals(&self) -> Result<(), ConfigError> {
        let mut names = HashSet::new();
        for p in &self.peripherals {
            if !names.insert(p.name.as_str()) {
                return Err(invalid(format!("duplicate peripheral '{}'", p.name)));
            }
        }
        let status = self.peripherals.iter().filter(|p| p.status_output).count();
        if status != 1 {
            return Err(invalid(format!(
                "exactly one status_output peripheral required, found {status}"
            )));
        }
        Ok(())
    }
}

/// Validate a set of boards sharing one PD/SYNC bus.
pub fn validate_network(boards: &[BoardConfig]) -> Result<(), ConfigError> {
    let masters = boards.iter().filter(|b| b.role.is_master()).count();
    if masters != 1 {
        return Err(invalid(format!(
            "exactly one master required on the bus, found {masters}"
        )));
    }
    let period = boards.first().map(|b| b.sync_period_us);
    if boards.iter().any(|b| Some(b.sync_period_us) != period) {
        return Err(invalid("all modules must use the same sync_period_us".to_string()));
    }
    Ok(())
}

fn invalid(msg: String) -> ConfigError {
    ConfigError::ValidationError(msg)
}
