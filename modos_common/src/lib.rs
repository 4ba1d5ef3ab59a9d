//! ModOS Common Library
//!
//! Shared vocabulary of the ModOS control layer: SSSP stages and shutdown
//! kinds, event flag sets, control GPIO descriptors, board configuration
//! and the boot agent interface. Nothing in this crate spawns threads or
//! touches hardware.
//!
//! # Module Structure
//!
//! - [`sssp`] - Stages, shutdown kinds, roles, protocol version
//! - [`events`] - I/O, OS and shell event flag sets
//! - [`gpio`] - Control GPIO descriptors and edge modes
//! - [`board`] - Board configuration and validation
//! - [`boot`] - Boot agent trait and callback table
//! - [`config`] - Configuration loading traits and types
//! - [`consts`] - System-wide constants
//! - [`prelude`] - Common re-exports

pub mod board;
pub mod boot;
pub mod config;
pub mod consts;
pub mod events;
pub mod gpio;
pub mod prelude;
pub mod sssp;
