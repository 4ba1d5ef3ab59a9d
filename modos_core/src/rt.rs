//! Real-time setup of the control thread.
//!
//! With the `rt` feature the control thread locks its memory and runs
//! under `SCHED_FIFO` at the highest priority. Without it every step is a
//! no-op so the simulation runs unprivileged.

use crate::error::CoreError;

#[cfg(feature = "rt")]
fn rt_mlockall() -> Result<(), CoreError> {
    use nix::sys::mman::{MlockallFlags, mlockall};
    mlockall(MlockallFlags::MCL_CURRENT | MlockallFlags::MCL_FUTURE)
        .map_err(|e| CoreError::RtSetup(format!("mlockall failed: {e}")))?;
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_mlockall() -> Result<(), CoreError> {
    Ok(())
}

/// `SCHED_FIFO` at the maximum priority for the calling thread.
#[cfg(feature = "rt")]
fn rt_set_scheduler() -> Result<(), CoreError> {
    let priority = unsafe { libc::sched_get_priority_max(libc::SCHED_FIFO) };
    if priority < 0 {
        let err = std::io::Error::last_os_error();
        return Err(CoreError::RtSetup(format!(
            "sched_get_priority_max(SCHED_FIFO) failed: {err}"
        )));
    }
    let param = libc::sched_param {
        sched_priority: priority,
    };
    let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        return Err(CoreError::RtSetup(format!(
            "sched_setscheduler(SCHED_FIFO, {priority}) failed: {err}"
        )));
    }
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_set_scheduler() -> Result<(), CoreError> {
    Ok(())
}

/// Lock memory, then raise the scheduling class.
pub fn rt_setup() -> Result<(), CoreError> {
    rt_mlockall()?;
    rt_set_scheduler()?;
    Ok(())
}
