//! Stage tracking and the shutdown latch.

use super::SsspError;
use modos_common::sssp::{ShutdownKind, Stage};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tracing::debug;

/// Owner of the module's stage. Only the control thread advances it.
#[derive(Debug, Default)]
pub struct StageTracker {
    current: Arc<AtomicU8>,
}

impl StageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Stage {
        load(&self.current)
    }

    /// Move to `next`, which must lie strictly ahead. Returns the stage
    /// left behind.
    pub fn advance_to(&mut self, next: Stage) -> Result<Stage, SsspError> {
        let from = self.current();
        if next <= from {
            return Err(SsspError::StageRegression { from, to: next });
        }
        self.current.store(next as u8, Ordering::Release);
        debug!(%from, to = %next, "stage transition");
        Ok(from)
    }

    /// Read-only mirror for interrupt handlers and other threads.
    pub fn view(&self) -> StageView {
        StageView {
            current: Arc::clone(&self.current),
        }
    }
}

/// Shared read-only view of a [`StageTracker`].
#[derive(Debug, Clone)]
pub struct StageView {
    current: Arc<AtomicU8>,
}

impl StageView {
    pub fn get(&self) -> Stage {
        load(&self.current)
    }
}

fn load(cell: &AtomicU8) -> Stage {
    Stage::from_u8(cell.load(Ordering::Acquire)).unwrap_or_default()
}

/// Set-once shutdown kind.
#[derive(Debug, Default)]
pub struct ShutdownLatch {
    kind: ShutdownKind,
}

impl ShutdownLatch {
    pub fn get(&self) -> ShutdownKind {
        self.kind
    }

    pub fn is_latched(&self) -> bool {
        !self.kind.is_none()
    }

    pub fn latch(&mut self, kind: ShutdownKind) -> Result<(), SsspError> {
        if kind.is_none() {
            return Err(SsspError::NoShutdownKind);
        }
        if self.is_latched() {
            return Err(SsspError::ShutdownAlreadyLatched {
                latched: self.kind,
                requested: kind,
            });
        }
        self.kind = kind;
        Ok(())
    }
}
