//! SYNC pulse and follower clock correction.

use super::harness::{Bus, PERIOD_US, board};
use modos_common::sssp::{Role, Stage};
use modos_core::NoHooks;
use modos_hal::drivers::simulation::{SimModuleOptions, SimTime};

fn master_and_drifting_follower(drift_ppm: i32) -> Bus {
    let mut bus = Bus::new();
    bus.add(board(Role::Master, "M"));
    bus.add_with(
        board(Role::Follower, "F"),
        SimModuleOptions {
            drift_ppm,
            ..Default::default()
        },
        Box::new(NoHooks),
    );
    bus.start_all();
    bus.wait_all(Stage::Operation);
    bus
}

#[test]
fn master_pulse_keeps_absolute_deadlines() {
    let bus = Bus::operating(0);
    for k in 1..=10u64 {
        bus.advance_to(k * PERIOD_US - PERIOD_US / 2 - 1);
        assert!(!bus.net.sync_line().is_asserted(), "period {k}: early assert");
        bus.advance_to(k * PERIOD_US - 1);
        assert!(bus.net.sync_line().is_asserted(), "period {k}: early release");
        bus.advance_to(k * PERIOD_US);
        assert!(!bus.net.sync_line().is_asserted(), "period {k}: late release");
        assert_eq!(bus.nodes[0].handle.uptime_us(), k * PERIOD_US);
    }
}

#[test]
fn fast_follower_is_pulled_back_to_the_grid() {
    let bus = master_and_drifting_follower(300_000);
    let (m, f) = (&bus.nodes[0].handle, &bus.nodes[1].handle);

    bus.advance_to(PERIOD_US - 1);
    let before = f.uptime_us();
    assert!(before > 1_299_000, "follower runs fast: {before}");

    bus.advance_to(PERIOD_US);
    assert_eq!(m.uptime_us(), 1_000_000);
    assert_eq!(f.uptime_us(), 1_000_000);
    assert!(before - f.uptime_us() <= PERIOD_US / 2);
}

#[test]
fn slow_follower_is_pushed_forward_to_the_grid() {
    let bus = master_and_drifting_follower(-200_000);
    let f = &bus.nodes[1].handle;

    bus.advance_to(PERIOD_US - 1);
    assert!(f.uptime_us() < 800_000);

    bus.advance_to(PERIOD_US);
    assert_eq!(f.uptime_us(), 1_000_000);
}

#[test]
fn clocks_agree_on_every_release() {
    let bus = master_and_drifting_follower(150_000);
    let (m, f) = (&bus.nodes[0].handle, &bus.nodes[1].handle);
    let mut last = 0;
    for k in 1..=5u64 {
        bus.advance_to(k * PERIOD_US);
        assert_eq!(m.uptime_us(), k * PERIOD_US);
        assert_eq!(f.uptime_us(), m.uptime_us());
        assert!(m.uptime_us() >= last);
        last = m.uptime_us();
    }
}

#[test]
fn no_correction_before_operation() {
    let mut bus = Bus::new();
    let m = bus.add(board(Role::Master, "M"));
    let f = bus.add_with(
        board(Role::Follower, "F"),
        SimModuleOptions {
            drift_ppm: 300_000,
            ..Default::default()
        },
        Box::new(NoHooks),
    );
    bus.release(f);
    bus.advance_to(400_000);
    assert_eq!(bus.nodes[f].handle.uptime_us(), 0);

    bus.start(m);
    bus.wait_all(Stage::Operation);
    assert_eq!(bus.nodes[f].handle.uptime_us(), 0);
}

#[test]
fn uptime_survives_counter_wrap() {
    // 16-bit counter at 1 MHz laps every 65.5 ms.
    let bus = {
        let mut bus = Bus::with_time(SimTime::new(1_000_000, 16));
        let mut config = board(Role::Master, "M");
        config.sync_period_us = 100_000;
        bus.add(config);
        bus.start_all();
        bus.wait_all(Stage::Operation);
        bus
    };
    let clock = bus.nodes[0].handle.clock();
    for t in [10_000, 70_000, 200_000, 1_000_000, 3_000_123] {
        bus.advance_to(t);
        assert_eq!(clock.now_us(), t);
    }
}
