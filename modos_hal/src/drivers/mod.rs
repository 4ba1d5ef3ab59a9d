//! Platform drivers.

pub mod simulation;
