//! System-wide constants.

/// Default SYNC clock period in microseconds.
pub const DEFAULT_SYNC_PERIOD_US: u64 = 1_000_000;

/// Shortest configurable SYNC period (must allow a half period of 1 µs).
pub const SYNC_PERIOD_US_MIN: u64 = 2;

/// Longest configurable SYNC period.
pub const SYNC_PERIOD_US_MAX: u64 = 3_600_000_000;

/// Interrupt channels per module; bounded by the width of the I/O flag word.
pub const MAX_INTERRUPT_CHANNELS: usize = 32;

/// Default board configuration path.
pub const DEFAULT_BOARD_CONFIG_PATH: &str = "/etc/modos/board.toml";

/// Width of the system information report.
pub const SYSTEM_INFO_WIDTH: usize = 70;

/// Width of the name column in the system information report.
pub const SYSTEM_INFO_NAME_WIDTH: usize = 14;

pub const MICROSECONDS_PER_MILLISECOND: u64 = 1_000;
pub const MICROSECONDS_PER_SECOND: u64 = 1_000_000;
pub const MICROSECONDS_PER_MINUTE: u64 = 60 * MICROSECONDS_PER_SECOND;
pub const MICROSECONDS_PER_HOUR: u64 = 60 * MICROSECONDS_PER_MINUTE;
pub const MICROSECONDS_PER_DAY: u64 = 24 * MICROSECONDS_PER_HOUR;
