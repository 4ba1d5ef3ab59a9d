//! System information report.

use crate::uptime::UptimeBreakdown;
use modos_common::board::BoardConfig;
use modos_common::boot::BootAgentInfo;
use modos_common::consts::{SYSTEM_INFO_NAME_WIDTH, SYSTEM_INFO_WIDTH};
use modos_common::sssp::{Role, SSSP_VERSION_MAJOR, SSSP_VERSION_MINOR};
use std::fmt;
use std::io::{self, Write};

/// Snapshot printed at start and by `module:info`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemInfo {
    pub module_name: String,
    pub module_version: String,
    pub role: Role,
    pub sync_period_us: u64,
    pub boot_agent: BootAgentInfo,
}

impl SystemInfo {
    pub fn new(config: &BoardConfig, boot_agent: BootAgentInfo) -> Self {
        Self {
            module_name: config.module.name.clone(),
            module_version: config.module.version.clone(),
            role: config.role,
            sync_period_us: config.sync_period_us,
            boot_agent,
        }
    }

    /// Boot agent header passes the magic and SSSP checks.
    pub fn boot_agent_ok(&self) -> bool {
        self.boot_agent.check().is_ok()
    }

    pub fn write_to(&self, out: &mut dyn Write) -> io::Result<()> {
        write!(out, "{self}")
    }
}

fn separator(f: &mut fmt::Formatter<'_>, c: char) -> fmt::Result {
    writeln!(f, "{}", c.to_string().repeat(SYSTEM_INFO_WIDTH))
}

fn line(f: &mut fmt::Formatter<'_>, name: &str, value: fmt::Arguments<'_>) -> fmt::Result {
    writeln!(f, "{name:<width$}{value}", width = SYSTEM_INFO_NAME_WIDTH)
}

impl fmt::Display for SystemInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        separator(f, '=')?;
        line(f, "Module", format_args!("{} (v{})", self.module_name, self.module_version))?;
        line(f, "Role", format_args!("{}", self.role))?;
        line(f, "Architecture", format_args!("{}", std::env::consts::ARCH))?;
        separator(f, '-')?;
        line(
            f,
            "ModOS",
            format_args!(
                "{} (SSSP {SSSP_VERSION_MAJOR}.{SSSP_VERSION_MINOR})",
                env!("CARGO_PKG_VERSION")
            ),
        )?;
        line(
            f,
            "build type",
            format_args!("{}", if cfg!(debug_assertions) { "debug" } else { "release" }),
        )?;
        line(f, "SYNC period", format_args!("{} us", self.sync_period_us))?;
        separator(f, '-')?;
        let agent = &self.boot_agent;
        if agent.magic == modos_common::boot::BOOT_AGENT_MAGIC {
            line(
                f,
                "Boot agent",
                format_args!(
                    "{} {} (SSSP {}.{})",
                    agent.version, agent.release, agent.sssp.major, agent.sssp.minor
                ),
            )?;
            if agent.sssp.major != SSSP_VERSION_MAJOR {
                writeln!(
                    f,
                    "WARNING: boot agent and ModOS implement incompatible SSSP versions!"
                )?;
            }
        } else {
            writeln!(f, "Boot agent incompatible or not available.")?;
        }
        separator(f, '=')
    }
}

/// Uptime block of `module:info`.
pub fn write_uptime(out: &mut dyn Write, uptime_us: u64) -> io::Result<()> {
    let b = UptimeBreakdown::from(uptime_us);
    writeln!(out, "The system is running for")?;
    writeln!(out, "{:>10} days", b.days)?;
    writeln!(out, "{:>10} hours", b.hours)?;
    writeln!(out, "{:>10} minutes", b.minutes)?;
    writeln!(out, "{:>10} seconds", b.seconds)?;
    writeln!(out, "{:>10} milliseconds", b.milliseconds)?;
    writeln!(out, "{:>10} microseconds", b.microseconds)
}
