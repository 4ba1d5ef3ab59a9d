//! Interrupt/thread separation and lifecycle ordering over a full run.

use super::harness::{Bus, PERIOD_US, board, wait_for};
use modos_common::sssp::{Role, ShutdownKind, Stage};
use modos_hal::irq;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

#[test]
fn interrupt_callbacks_never_block() {
    let before = irq::violation_count();

    let mut bus = Bus::operating(2);
    bus.advance_to(5 * PERIOD_US + PERIOD_US / 4);
    bus.nodes[2].handle.request_shutdown(ShutdownKind::Hibernate);
    for index in 0..bus.nodes.len() {
        bus.join(index);
    }
    bus.advance_to(8 * PERIOD_US);

    assert_eq!(irq::violation_count(), before);
}

#[test]
fn observed_stages_never_go_backwards() {
    let mut bus = Bus::new();
    bus.add(board(Role::Master, "M"));
    let handle = bus.nodes[0].handle.clone();

    let observed = Arc::new(Mutex::new(vec![handle.stage()]));
    let sampler = {
        let observed = Arc::clone(&observed);
        let handle = handle.clone();
        std::thread::spawn(move || {
            loop {
                let stage = handle.stage();
                let mut seen = observed.lock();
                if seen.last() != Some(&stage) {
                    seen.push(stage);
                }
                drop(seen);
                if stage == Stage::Shutdown1_3 {
                    return;
                }
                std::thread::sleep(Duration::from_micros(100));
            }
        })
    };

    bus.start(0);
    bus.wait_stage(0, Stage::Operation);
    bus.advance_to(3 * PERIOD_US);
    handle.request_shutdown(ShutdownKind::Restart);
    bus.join(0);
    sampler.join().unwrap();

    let observed = observed.lock().clone();
    assert!(observed.windows(2).all(|w| w[0] < w[1]), "{observed:?}");
    assert_eq!(observed.first(), Some(&Stage::Startup2_1));
    assert_eq!(observed.last(), Some(&Stage::Shutdown1_3));
}

#[test]
fn latched_kind_wins_over_later_requests() {
    let mut bus = Bus::operating(0);
    let handle = bus.nodes[0].handle.clone();
    handle.request_shutdown(ShutdownKind::Transportation);
    wait_for("shutdown to start", || handle.stage() >= Stage::Shutdown1_1);
    handle.request_shutdown(ShutdownKind::Restart);

    bus.join(0);
    assert_eq!(
        bus.nodes[0].sim.boot_agent.calls(),
        vec![ShutdownKind::Transportation]
    );
}
