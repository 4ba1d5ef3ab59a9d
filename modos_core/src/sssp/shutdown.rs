//! Shutdown sequence.
//!
//! Runs strictly in order once a kind is latched; nothing here can be
//! cancelled or repeated:
//!
//! 1. `Shutdown1_1`: master stops the SYNC pulse, an originating module
//!    asserts PD, every module asserts SYNC.
//! 2. The kind is announced on the OS bus; stage becomes `Shutdown1_2`.
//! 3. Participants are stopped and joined.
//! 4. Deinitialization.
//! 5. Peripherals except the status output are stopped.
//! 6. `Shutdown1_3`: the interrupt table is disarmed and the boot agent
//!    takes over.

use crate::error::CoreError;
use crate::system::SystemContext;
use modos_common::boot;
use modos_common::gpio::GpioState;
use modos_common::sssp::{ShutdownKind, Stage};
use tracing::{debug, error, info};

/// Steps 1 and 2: latch `kind`, drive the lines and announce it.
pub fn shutdown_init(ctx: &mut SystemContext, kind: ShutdownKind) -> Result<(), CoreError> {
    ctx.shutdown.latch(kind)?;
    info!(module = %ctx.config.module.name, %kind, "shutdown initiated");

    if let Some(pulse) = &ctx.sync_pulse {
        pulse.stop();
    }
    ctx.stage.advance_to(Stage::Shutdown1_1)?;
    if kind.is_active() {
        ctx.set_pd(GpioState::Asserted);
    }
    ctx.set_sync(GpioState::Asserted);

    ctx.os_events.broadcast(kind.os_flags().bits());
    ctx.stage.advance_to(Stage::Shutdown1_2)?;
    Ok(())
}

/// Step 3: stop every participant. Returns how many were joined.
pub fn shutdown_stop(ctx: &mut SystemContext) -> usize {
    ctx.participants.join_all()
}

/// Step 4. Nothing to release on this platform.
pub fn shutdown_deinit(ctx: &mut SystemContext) {
    debug!(module = %ctx.config.module.name, "system deinitialized");
}

/// Step 5. Returns the names of the stopped peripherals.
pub fn shutdown_peripherals(ctx: &mut SystemContext) -> Vec<String> {
    ctx.peripherals.stop_all_except_status()
}

/// Step 6: disarm all interrupts and hand off to the boot agent.
///
/// A boot agent never returns on hardware, so the returned error is the
/// post-mortem marker of a failed hand-off.
pub fn shutdown_final(ctx: &mut SystemContext) -> CoreError {
    let kind = ctx.shutdown.get();
    ctx.interrupts.stop();
    if let Err(e) = ctx.stage.advance_to(Stage::Shutdown1_3) {
        return e.into();
    }
    info!(module = %ctx.config.module.name, %kind, "handing off to boot agent");
    boot::hand_off(ctx.boot_agent.as_ref(), kind);
    error!(module = %ctx.config.module.name, %kind, "boot agent returned from hand-off");
    CoreError::HandoffReturned(kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sssp::{RendezvousOutcome, SsspError, startup_sync_check};
    use modos_common::board::BoardConfig;
    use modos_common::events::OsEventFlags;
    use modos_common::sssp::Role;
    use modos_hal::drivers::simulation::{SimModule, SimNetwork, SimTime};
    use std::time::Duration;

    fn operating(role: Role) -> (SimNetwork, SimModule, SystemContext) {
        let board = BoardConfig::default().with_role(role);
        let net = SimNetwork::new(SimTime::standard(), &board);
        let module = net.attach_module(&board);
        let mut ctx = SystemContext::init(board, module.platform.clone()).unwrap();
        ctx.peripherals_mut().start_all();
        assert_eq!(startup_sync_check(&mut ctx).unwrap(), RendezvousOutcome::Completed);
        (net, module, ctx)
    }

    #[test]
    fn active_shutdown_asserts_both_lines() {
        let (net, _module, mut ctx) = operating(Role::Master);
        shutdown_init(&mut ctx, ShutdownKind::Hibernate).unwrap();

        assert_eq!(ctx.stage(), Stage::Shutdown1_2);
        assert_eq!(ctx.shutdown_kind(), ShutdownKind::Hibernate);
        assert!(net.pd_line().is_asserted());
        assert!(net.sync_line().is_asserted());
        assert!(ctx.sync_pulse().is_some_and(|p| !p.is_running()));
    }

    #[test]
    fn passive_shutdown_leaves_pd_alone() {
        let (net, _module, mut ctx) = operating(Role::Follower);
        shutdown_init(&mut ctx, ShutdownKind::Passive).unwrap();
        assert!(!net.pd_line().is_asserted());
        assert!(net.sync_line().is_asserted());
    }

    #[test]
    fn announcement_reaches_participants_before_join() {
        let (_net, _module, mut ctx) = operating(Role::Master);
        let (tx, rx) = std::sync::mpsc::channel();
        ctx.participants_mut()
            .spawn("observer", move |pctx| {
                while !pctx.should_terminate() {
                    if let Ok(Some(flags)) = pctx.wait_os_event(Duration::from_millis(5)) {
                        let _ = tx.send(flags);
                    }
                }
            })
            .unwrap();
        shutdown_init(&mut ctx, ShutdownKind::Transportation).unwrap();
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            OsEventFlags::TRANSPORTATION
        );
        assert_eq!(shutdown_stop(&mut ctx), 1);
    }

    #[test]
    fn shutdown_cannot_be_initiated_twice() {
        let (_net, _module, mut ctx) = operating(Role::Master);
        shutdown_init(&mut ctx, ShutdownKind::Restart).unwrap();
        assert!(matches!(
            shutdown_init(&mut ctx, ShutdownKind::Hibernate),
            Err(CoreError::Sssp(SsspError::ShutdownAlreadyLatched { .. }))
        ));
        assert_eq!(ctx.shutdown_kind(), ShutdownKind::Restart);
    }

    #[test]
    fn final_step_hands_off_exactly_once() {
        let (_net, module, mut ctx) = operating(Role::Master);
        shutdown_init(&mut ctx, ShutdownKind::Restart).unwrap();
        shutdown_stop(&mut ctx);
        shutdown_deinit(&mut ctx);
        assert_eq!(shutdown_peripherals(&mut ctx), vec!["can".to_string()]);

        let err = shutdown_final(&mut ctx);
        assert!(matches!(err, CoreError::HandoffReturned(ShutdownKind::Restart)));
        assert_eq!(ctx.stage(), Stage::Shutdown1_3);
        assert!(!ctx.interrupts().is_started());
        assert_eq!(module.boot_agent.calls(), vec![ShutdownKind::Restart]);
        assert_eq!(ctx.peripherals().is_running("can"), Some(false));
        assert_eq!(ctx.peripherals().is_running("progif"), Some(true));
    }
}
