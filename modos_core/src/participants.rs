//! Shutdown participants.
//!
//! Threads that must be stopped before the boot agent takes over. Each
//! participant gets an OS bus listener, so it sees the shutdown
//! announcement, and a terminate flag set by [`Participants::join_all`].

use crate::error::CoreError;
use crate::event::{EventError, EventListener, EventSource, EventWaiter, OS_EVENT_MASK};
use crate::uptime::{SleepOutcome, UptimeClock};
use modos_common::events::OsEventFlags;
use modos_common::sssp::ShutdownKind;
use modos_hal::VirtualTimer;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What a participant thread receives.
pub struct ParticipantContext {
    name: String,
    waiter: Arc<EventWaiter>,
    os: EventListener,
    terminate: Arc<AtomicBool>,
}

impl ParticipantContext {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn should_terminate(&self) -> bool {
        self.terminate.load(Ordering::Acquire)
    }

    /// Wait up to `timeout` for OS bus flags.
    pub fn wait_os_event(&self, timeout: Duration) -> Result<Option<OsEventFlags>, EventError> {
        Ok(self
            .waiter
            .wait_any(Some(timeout))?
            .map(|_| OsEventFlags::from_bits_retain(self.os.get_and_clear_flags())))
    }

    /// Shutdown kind announced on the OS bus since the last call, if any.
    pub fn poll_shutdown(&self) -> Option<ShutdownKind> {
        self.waiter.poll()?;
        OsEventFlags::from_bits_retain(self.os.get_and_clear_flags()).shutdown_kind()
    }

    pub fn os_listener(&self) -> &EventListener {
        &self.os
    }

    /// Sleep until uptime `deadline_us` on `timer`, ending early when
    /// termination is requested.
    pub fn sleep_until(
        &self,
        clock: &UptimeClock,
        timer: &dyn VirtualTimer,
        deadline_us: u64,
    ) -> Result<SleepOutcome, EventError> {
        clock.sleep_until(deadline_us, timer, &self.terminate)
    }
}

struct Participant {
    name: String,
    terminate: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Registry of running participants.
pub struct Participants {
    os_events: Arc<EventSource>,
    running: Vec<Participant>,
}

impl Participants {
    pub fn new(os_events: Arc<EventSource>) -> Self {
        Self {
            os_events,
            running: Vec::new(),
        }
    }

    /// Start `body` on a named thread.
    pub fn spawn<F>(&mut self, name: &str, body: F) -> Result<(), CoreError>
    where
        F: FnOnce(ParticipantContext) + Send + 'static,
    {
        let waiter = EventWaiter::new();
        let os = self.os_events.register(&waiter, OS_EVENT_MASK);
        let terminate = Arc::new(AtomicBool::new(false));
        let ctx = ParticipantContext {
            name: name.to_string(),
            waiter,
            os,
            terminate: Arc::clone(&terminate),
        };
        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(ctx))
            .map_err(|source| CoreError::Spawn {
                name: name.to_string(),
                source,
            })?;
        debug!(participant = name, "participant started");
        self.running.push(Participant {
            name: name.to_string(),
            terminate,
            handle,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.running.len()
    }

    pub fn is_empty(&self) -> bool {
        self.running.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.running.iter().map(|p| p.name.as_str()).collect()
    }

    /// Request termination of every participant, then join them all.
    /// Returns the number joined; panicked participants are reported.
    pub fn join_all(&mut self) -> usize {
        for p in &self.running {
            p.terminate.store(true, Ordering::Release);
        }
        let mut joined = 0;
        for p in self.running.drain(..) {
            match p.handle.join() {
                Ok(()) => debug!(participant = %p.name, "participant joined"),
                Err(_) => warn!(participant = %p.name, "participant panicked before shutdown"),
            }
            joined += 1;
        }
        info!(joined, "all participants stopped");
        joined
    }
}
