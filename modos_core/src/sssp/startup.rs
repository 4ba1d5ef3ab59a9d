//! Startup rendezvous.
//!
//! Every module holds SYNC asserted through init. Releasing it signals
//! local readiness; the wired-AND line only reads deasserted once the
//! last module let go, so the deasserting edge is the barrier.

use crate::error::CoreError;
use crate::event::{IO_EVENT_MASK, SystemEvent};
use crate::system::SystemContext;
use crate::uptime::arm_accumulation;
use modos_common::gpio::GpioState;
use modos_common::sssp::Stage;
use tracing::{debug, info};

/// Result of one rendezvous check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendezvousOutcome {
    /// All modules released SYNC; the module is in `Operation`.
    Completed,
    /// Some other event woke the control thread. Its flags have been
    /// consumed into the event; the check should be retried.
    Unexpected(SystemEvent),
}

/// Enter `Startup2_2` and release SYNC. Later calls do nothing.
pub fn begin_startup_sync(ctx: &mut SystemContext) -> Result<(), CoreError> {
    if ctx.stage.current() >= Stage::Startup2_2 {
        return Ok(());
    }
    ctx.stage.advance_to(Stage::Startup2_2)?;
    ctx.set_sync(GpioState::Deasserted);
    debug!(module = %ctx.config.module.name, "SYNC released, waiting for peers");
    Ok(())
}

/// Block for the next event and decide whether it completes the
/// rendezvous.
///
/// Success requires an I/O event whose flags are exactly the SYNC
/// channel flag while the line reads deasserted. Then the uptime clock
/// starts at zero, the accumulation timer is armed, the master starts
/// its SYNC pulse and the stage becomes `Operation`. Any other event is
/// handed back with the I/O flags left pending for classification.
pub fn startup_sync_check(ctx: &mut SystemContext) -> Result<RendezvousOutcome, CoreError> {
    begin_startup_sync(ctx)?;

    let mask = ctx.listeners.waiter.wait_any(None)?.unwrap_or(0);
    let flags = ctx.listeners.io.get_and_clear_flags();
    let released = ctx.sync_state() == GpioState::Deasserted;

    if mask & IO_EVENT_MASK != 0 && flags == ctx.sync_flags.bits() && released {
        ctx.clock.start();
        arm_accumulation(&ctx.clock, &ctx.uptime_timer);
        if let Some(pulse) = &ctx.sync_pulse {
            pulse.start();
        }
        ctx.stage.advance_to(Stage::Operation)?;
        info!(
            module = %ctx.config.module.name,
            role = %ctx.config.role,
            "startup rendezvous complete"
        );
        return Ok(RendezvousOutcome::Completed);
    }

    ctx.listeners.io.restore_flags(flags);
    let event = if mask == 0 {
        SystemEvent::Timeout
    } else {
        ctx.listeners.classify(mask)
    };
    Ok(RendezvousOutcome::Unexpected(event))
}
