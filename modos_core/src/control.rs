//! Control loop.
//!
//! The single highest-priority thread of a module. It owns the
//! [`SystemContext`] end to end:
//!
//! ```text
//! init ─► startup rendezvous ─► start ─► main loop ─► shutdown ─► boot agent
//!           (retry on anomaly)           (until a kind is chosen)
//! ```
//!
//! Waiting on the event bus is the only place it blocks. Board-specific
//! behaviour plugs in through [`ModuleHooks`].

use crate::error::CoreError;
use crate::event::{EventMask, EventSource, IO_EVENT_MASK, OS_EVENT_MASK, SystemEvent};
use crate::participants::Participants;
use crate::peripherals::PeripheralSet;
use crate::rt::rt_setup;
use crate::shell::{Shell, ShellIo, ShellSettings, config_command, info_command, shutdown_command};
use crate::sssp::{
    RendezvousOutcome, StageView, shutdown_deinit, shutdown_final, shutdown_init,
    shutdown_peripherals, shutdown_stop, startup_sync_check,
};
use crate::system::SystemContext;
use crate::uptime::UptimeClock;
use modos_common::events::IoEventFlags;
use modos_common::gpio::GpioState;
use modos_common::sssp::{ShutdownKind, Stage};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

// ─── Hooks ──────────────────────────────────────────────────────────

/// Board hook points. Every method defaults to doing nothing.
pub trait ModuleHooks: Send {
    /// Before peripherals are started.
    fn init_peripherals(&mut self, _peripherals: &mut PeripheralSet) {}

    /// I/O event other than the rendezvous edge during startup. Return
    /// `true` to consume it silently instead of reporting it.
    fn startup_io_event(&mut self, _flags: IoEventFlags) -> bool {
        false
    }

    /// I/O event during `Operation` that is not a PD request.
    fn main_loop_io_event(&mut self, _flags: IoEventFlags) {}

    /// Every main loop wake-up, before the event is evaluated.
    fn loop_wakeup(&mut self, _event: &SystemEvent) {}

    /// After the core stopped its peripherals.
    fn shutdown_peripherals(&mut self, _kind: ShutdownKind) {}
}

/// Module without board hooks.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl ModuleHooks for NoHooks {}

impl<H: ModuleHooks + ?Sized> ModuleHooks for Box<H> {
    fn init_peripherals(&mut self, peripherals: &mut PeripheralSet) {
        (**self).init_peripherals(peripherals)
    }

    fn startup_io_event(&mut self, flags: IoEventFlags) -> bool {
        (**self).startup_io_event(flags)
    }

    fn main_loop_io_event(&mut self, flags: IoEventFlags) {
        (**self).main_loop_io_event(flags)
    }

    fn loop_wakeup(&mut self, event: &SystemEvent) {
        (**self).loop_wakeup(event)
    }

    fn shutdown_peripherals(&mut self, kind: ShutdownKind) {
        (**self).shutdown_peripherals(kind)
    }
}

// ─── ModuleHandle ───────────────────────────────────────────────────

/// Cloneable view of a running module for other threads.
#[derive(Clone)]
pub struct ModuleHandle {
    name: String,
    stage: StageView,
    clock: Arc<UptimeClock>,
    io_events: Arc<EventSource>,
    os_events: Arc<EventSource>,
}

impl ModuleHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stage(&self) -> Stage {
        self.stage.get()
    }

    pub fn uptime_us(&self) -> u64 {
        self.clock.now_us()
    }

    pub fn clock(&self) -> &Arc<UptimeClock> {
        &self.clock
    }

    pub fn io_events(&self) -> &Arc<EventSource> {
        &self.io_events
    }

    pub fn os_events(&self) -> &Arc<EventSource> {
        &self.os_events
    }

    /// Raise a shutdown request on the OS bus, as `system:shutdown` does.
    pub fn request_shutdown(&self, kind: ShutdownKind) {
        self.os_events.broadcast(kind.os_flags().bits());
    }
}

// ─── ControlLoop ────────────────────────────────────────────────────

pub struct ControlLoop<H: ModuleHooks = NoHooks> {
    ctx: SystemContext,
    hooks: H,
    shell: Option<ShellIo>,
}

impl<H: ModuleHooks> ControlLoop<H> {
    pub fn new(ctx: SystemContext, hooks: H) -> Self {
        Self {
            ctx,
            hooks,
            shell: None,
        }
    }

    /// Run a shell on `io` once the module is operating. Ignored when the
    /// board disables the shell.
    pub fn with_shell(mut self, io: ShellIo) -> Self {
        self.shell = Some(io);
        self
    }

    pub fn handle(&self) -> ModuleHandle {
        ModuleHandle {
            name: self.ctx.config.module.name.clone(),
            stage: self.ctx.stage_view(),
            clock: Arc::clone(&self.ctx.clock),
            io_events: Arc::clone(&self.ctx.io_events),
            os_events: Arc::clone(&self.ctx.os_events),
        }
    }

    pub fn context(&self) -> &SystemContext {
        &self.ctx
    }

    /// Register participants before [`run`](Self::run).
    pub fn participants_mut(&mut self) -> &mut Participants {
        self.ctx.participants_mut()
    }

    /// Drive the module to the boot agent hand-off.
    ///
    /// Never returns `Ok`. On hardware the hand-off does not return
    /// either; when it does, [`CoreError::HandoffReturned`] is the result.
    pub fn run(mut self) -> Result<Infallible, CoreError> {
        if let Err(e) = rt_setup() {
            warn!("{e}; continuing without real-time scheduling");
        }

        self.hooks.init_peripherals(&mut self.ctx.peripherals);
        self.ctx.peripherals.start_all();

        self.startup()?;
        self.start()?;
        let kind = self.main_loop()?;
        Err(self.shutdown(kind))
    }

    fn startup(&mut self) -> Result<(), CoreError> {
        loop {
            match startup_sync_check(&mut self.ctx)? {
                RendezvousOutcome::Completed => return Ok(()),
                RendezvousOutcome::Unexpected(SystemEvent::Io(flags)) => {
                    if !self.hooks.startup_io_event(flags) {
                        report_unexpected(IO_EVENT_MASK, flags.bits());
                    }
                }
                RendezvousOutcome::Unexpected(SystemEvent::Os(flags)) => {
                    report_unexpected(OS_EVENT_MASK, flags.bits());
                }
                RendezvousOutcome::Unexpected(SystemEvent::Unknown(mask)) => {
                    if self.ctx.config.debug {
                        report_unexpected(mask, 0);
                    }
                }
                RendezvousOutcome::Unexpected(SystemEvent::Timeout) => {}
            }
        }
    }

    fn start(&mut self) -> Result<(), CoreError> {
        self.ctx.start();
        let Some(io) = self.shell.take() else {
            return Ok(());
        };
        if !self.ctx.config.shell.enabled {
            debug!("shell disabled by board configuration");
            return Ok(());
        }
        let shell_config = &self.ctx.config.shell;
        let mut shell = Shell::new(shell_config.prompt.clone(), io)
            .with_settings(ShellSettings::from(shell_config))
            .with_uptime(Arc::clone(&self.ctx.clock));
        shell.add_command(
            "system:shutdown",
            shutdown_command(Arc::clone(&self.ctx.os_events)),
        )?;
        shell.add_command(
            "module:info",
            info_command(self.ctx.info(), Arc::clone(&self.ctx.clock)),
        )?;
        shell.add_command(
            "module:config",
            config_command(shell_config.prompt.clone(), shell.settings()),
        )?;
        self.ctx.participants.spawn("shell", move |pctx| {
            shell.run(&pctx);
        })
    }

    fn main_loop(&mut self) -> Result<ShutdownKind, CoreError> {
        let timeout = match self.ctx.config.main_loop_timeout_us {
            0 => None,
            us => Some(Duration::from_micros(us)),
        };
        loop {
            let event = self.ctx.listeners.next(timeout)?;
            self.hooks.loop_wakeup(&event);
            if let Some(kind) = self.evaluate(event) {
                return Ok(kind);
            }
        }
    }

    /// Shutdown kind chosen by `event`, if any.
    fn evaluate(&mut self, event: SystemEvent) -> Option<ShutdownKind> {
        match event {
            SystemEvent::Io(flags) => {
                if flags.intersects(self.ctx.pd_flags)
                    && self.ctx.pd_state() == GpioState::Asserted
                {
                    info!(module = %self.ctx.config.module.name, "PD asserted by a peer");
                    return Some(ShutdownKind::Passive);
                }
                self.hooks.main_loop_io_event(flags);
                None
            }
            SystemEvent::Os(flags) => match flags.shutdown_kind() {
                Some(kind) if kind.is_active() => Some(kind),
                _ => {
                    report_unexpected(OS_EVENT_MASK, flags.bits());
                    None
                }
            },
            SystemEvent::Unknown(mask) => {
                if self.ctx.config.debug {
                    report_unexpected(mask, 0);
                }
                None
            }
            SystemEvent::Timeout => None,
        }
    }

    fn shutdown(mut self, kind: ShutdownKind) -> CoreError {
        if let Err(e) = shutdown_init(&mut self.ctx, kind) {
            return e;
        }
        let joined = shutdown_stop(&mut self.ctx);
        shutdown_deinit(&mut self.ctx);
        let stopped = shutdown_peripherals(&mut self.ctx);
        self.hooks.shutdown_peripherals(kind);
        debug!(joined, ?stopped, "system stopped");
        shutdown_final(&mut self.ctx)
    }
}

fn report_unexpected(mask: EventMask, flags: u32) {
    warn!("unexpected/unknown event received. mask=0x{mask:08X} flags=0x{flags:08X}");
}
