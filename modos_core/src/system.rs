//! System context.
//!
//! Everything the control thread owns for one module: stage and shutdown
//! latch, uptime clock, both event buses with the control thread's
//! listeners, the PD and SYNC pins, the interrupt table, participants and
//! peripherals. Interrupt handlers never see this struct; they hold an
//! [`IrqEnv`] with the I/O bus and, on followers, the clock correction.

use crate::error::CoreError;
use crate::event::{EventSource, Listeners};
use crate::info::SystemInfo;
use crate::interrupts::{InterruptChannelConfig, InterruptDriver, IrqEnv};
use crate::participants::Participants;
use crate::peripherals::PeripheralSet;
use crate::sssp::{FollowerCorrection, ShutdownLatch, StageTracker, StageView, SyncPulse};
use crate::uptime::UptimeClock;
use modos_common::board::{BoardConfig, ReactionKind};
use modos_common::boot::BootAgent;
use modos_common::events::IoEventFlags;
use modos_common::gpio::GpioState;
use modos_common::sssp::{Role, ShutdownKind, Stage};
use modos_hal::{ControlPin, Platform, TickSource, VirtualTimer};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct SystemContext {
    pub(crate) config: BoardConfig,
    pub(crate) stage: StageTracker,
    pub(crate) shutdown: ShutdownLatch,
    pub(crate) clock: Arc<UptimeClock>,
    pub(crate) io_events: Arc<EventSource>,
    pub(crate) os_events: Arc<EventSource>,
    pub(crate) listeners: Listeners,
    pub(crate) pd: Arc<dyn ControlPin>,
    pub(crate) sync: Arc<dyn ControlPin>,
    pub(crate) uptime_timer: Arc<dyn VirtualTimer>,
    pub(crate) sync_pulse: Option<Arc<SyncPulse>>,
    pub(crate) follower: Option<Arc<FollowerCorrection>>,
    pub(crate) interrupts: InterruptDriver,
    pub(crate) participants: Participants,
    pub(crate) peripherals: PeripheralSet,
    pub(crate) boot_agent: Arc<dyn BootAgent>,
    pub(crate) pd_flags: IoEventFlags,
    pub(crate) sync_flags: IoEventFlags,
}

impl SystemContext {
    /// Initialize the module up to stage `Startup2_1`.
    ///
    /// Listeners are registered before the interrupt table starts so no
    /// edge published during init is lost. On return PD is released and
    /// SYNC is held asserted.
    pub fn init(config: BoardConfig, platform: Platform) -> Result<Self, CoreError> {
        config.validate()?;

        let stage = StageTracker::new();
        let ticks: Arc<dyn TickSource> = Arc::clone(&platform.ticks);
        let clock = Arc::new(UptimeClock::new(Arc::clone(&ticks)));
        let io_events = EventSource::new("io");
        let os_events = EventSource::new("os");
        let listeners = Listeners::register(&io_events, &os_events);

        let (sync_pulse, follower) = match config.role {
            Role::Master => (
                Some(SyncPulse::new(
                    config.sync_period_us,
                    config.sync,
                    Arc::clone(&platform.sync),
                    Arc::clone(&clock),
                    Arc::clone(&ticks),
                    Arc::clone(&platform.sync_timer),
                )),
                None,
            ),
            Role::Follower => (
                None,
                Some(Arc::new(FollowerCorrection::new(
                    Arc::clone(&clock),
                    stage.view(),
                    Arc::clone(&platform.sync),
                    config.sync,
                    config.sync_period_us,
                ))),
            ),
        };

        let table: Vec<InterruptChannelConfig> =
            config.interrupts.iter().map(InterruptChannelConfig::from).collect();
        let mut interrupts = InterruptDriver::init(Arc::clone(&platform.pads), &table)?;
        let pd_flags = interrupts
            .flags_for(ReactionKind::PowerDown)
            .ok_or(CoreError::MissingChannel("power_down"))?;
        let sync_flags = interrupts
            .flags_for(ReactionKind::Sync)
            .ok_or(CoreError::MissingChannel("sync"))?;

        platform.pd.write(config.pd.level_for(GpioState::Deasserted));
        platform.sync.write(config.sync.level_for(GpioState::Asserted));

        interrupts.start(&IrqEnv {
            io_events: Arc::clone(&io_events),
            follower: follower.clone(),
        })?;

        if let Err(e) = platform.boot_agent.info().check() {
            warn!(module = %config.module.name, "boot agent: {e}");
        }

        let peripherals = PeripheralSet::from_specs(&config.peripherals);
        let participants = Participants::new(Arc::clone(&os_events));

        debug!(
            module = %config.module.name,
            role = %config.role,
            channels = interrupts.len(),
            pd_flags = format_args!("{:#010x}", pd_flags.bits()),
            sync_flags = format_args!("{:#010x}", sync_flags.bits()),
            "system initialized"
        );

        Ok(Self {
            config,
            stage,
            shutdown: ShutdownLatch::default(),
            clock,
            io_events,
            os_events,
            listeners,
            pd: platform.pd,
            sync: platform.sync,
            uptime_timer: platform.uptime_timer,
            sync_pulse,
            follower,
            interrupts,
            participants,
            peripherals,
            boot_agent: platform.boot_agent,
            pd_flags,
            sync_flags,
        })
    }

    /// Log the system information report. Called once `Operation` is
    /// reached.
    pub fn start(&self) {
        let report = self.info();
        for line in report.to_string().lines() {
            info!("{line}");
        }
    }

    pub fn info(&self) -> SystemInfo {
        SystemInfo::new(&self.config, self.boot_agent.info())
    }

    pub fn config(&self) -> &BoardConfig {
        &self.config
    }

    pub fn role(&self) -> Role {
        self.config.role
    }

    pub fn stage(&self) -> Stage {
        self.stage.current()
    }

    pub fn stage_view(&self) -> StageView {
        self.stage.view()
    }

    pub fn shutdown_kind(&self) -> ShutdownKind {
        self.shutdown.get()
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

    pub fn participants_mut(&mut self) -> &mut Participants {
        &mut self.participants
    }

    pub fn peripherals(&self) -> &PeripheralSet {
        &self.peripherals
    }

    pub fn peripherals_mut(&mut self) -> &mut PeripheralSet {
        &mut self.peripherals
    }

    pub fn interrupts(&self) -> &InterruptDriver {
        &self.interrupts
    }

    pub fn pd_flags(&self) -> IoEventFlags {
        self.pd_flags
    }

    pub fn sync_flags(&self) -> IoEventFlags {
        self.sync_flags
    }

    pub fn pd_state(&self) -> GpioState {
        self.config.pd.state_of(self.pd.read())
    }

    pub fn sync_state(&self) -> GpioState {
        self.config.sync.state_of(self.sync.read())
    }

    pub fn sync_pulse(&self) -> Option<&Arc<SyncPulse>> {
        self.sync_pulse.as_ref()
    }

    pub fn follower(&self) -> Option<&Arc<FollowerCorrection>> {
        self.follower.as_ref()
    }

    pub(crate) fn set_pd(&self, state: GpioState) {
        self.pd.write(self.config.pd.level_for(state));
    }

    pub(crate) fn set_sync(&self, state: GpioState) {
        self.sync.write(self.config.sync.level_for(state));
    }
}
