//! Startup rendezvous over the shared SYNC line.

use super::harness::{Bus, PERIOD_US, board, wait_for};
use modos_common::board::{BoardConfig, InterruptChannelSpec, ReactionKind};
use modos_common::events::IoEventFlags;
use modos_common::gpio::{EdgeMode, GpioState, PinRef};
use modos_common::sssp::{Role, Stage};
use modos_core::ModuleHooks;
use modos_hal::ControlPin;
use modos_hal::drivers::simulation::SimModuleOptions;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

const SENSOR_PIN: PinRef = 7;

fn assert_bus_operating(modules: usize) {
    let bus = Bus::operating(modules - 1);
    assert_eq!(bus.nodes.len(), modules);
    assert!(!bus.net.sync_line().is_asserted());
    for node in &bus.nodes {
        assert_eq!(node.stage(), Stage::Operation);
        assert!(node.handle.clock().is_running());
        assert_eq!(node.handle.uptime_us(), 0);
    }
}

#[test]
fn single_module_rendezvous() {
    assert_bus_operating(1);
}

#[test]
fn two_module_rendezvous() {
    assert_bus_operating(2);
}

#[test]
fn five_module_rendezvous() {
    assert_bus_operating(5);
}

#[test]
fn rendezvous_completes_at_last_release() {
    let mut bus = Bus::new();
    let m = bus.add(board(Role::Master, "M"));
    let f = bus.add(board(Role::Follower, "F"));

    bus.advance_to(50_000);
    bus.release(m);
    assert_eq!(bus.nodes[m].stage(), Stage::Startup2_2);
    assert_eq!(bus.nodes[f].stage(), Stage::Startup2_1);
    assert!(bus.net.sync_line().is_asserted());

    bus.advance_to(80_000);
    bus.start(f);
    bus.wait_all(Stage::Operation);

    // Both clocks were zeroed at 80 ms; time has not moved since.
    for node in &bus.nodes {
        assert_eq!(node.handle.uptime_us(), 0);
    }
    bus.advance_to(80_000 + 1_234);
    for node in &bus.nodes {
        assert_eq!(node.handle.uptime_us(), 1_234);
    }
}

#[test]
fn first_master_toggle_half_a_period_after_rendezvous() {
    let mut bus = Bus::new();
    let m = bus.add(board(Role::Master, "M"));
    let f = bus.add(board(Role::Follower, "F"));
    bus.advance_to(50_000);
    bus.release(m);
    bus.advance_to(80_000);
    bus.start(f);
    bus.wait_all(Stage::Operation);

    bus.advance_to(80_000 + PERIOD_US / 2 - 1);
    assert!(!bus.net.sync_line().is_asserted());
    bus.advance_to(80_000 + PERIOD_US / 2);
    assert!(bus.net.sync_line().is_asserted());
    assert!(bus.nodes[m].holds_sync());
    assert!(!bus.nodes[f].holds_sync());
}

/// Counts early sensor interrupts during startup.
struct SensorHook {
    seen: Arc<AtomicUsize>,
    consume: bool,
}

impl ModuleHooks for SensorHook {
    fn startup_io_event(&mut self, flags: IoEventFlags) -> bool {
        if flags.contains(IoEventFlags::channel(2)) {
            self.seen.fetch_add(1, Ordering::SeqCst);
            return self.consume;
        }
        false
    }
}

fn early_sensor_event_is_survived(consume: bool) {
    let mut config = board(Role::Master, "M");
    config.interrupts.push(InterruptChannelSpec {
        name: "sensor".to_string(),
        pin: SENSOR_PIN,
        mode: EdgeMode::Rising,
        autostart: true,
        reaction: ReactionKind::Publish,
        arg: 0,
    });
    let seen = Arc::new(AtomicUsize::new(0));
    let hooks = SensorHook {
        seen: Arc::clone(&seen),
        consume,
    };

    let mut bus = Bus::new();
    let m = bus.add_with(config, SimModuleOptions::default(), Box::new(hooks));
    // A peer that has not finished its own init yet.
    let peer = bus.net.sync_line().attach(true);
    bus.release(m);

    assert_eq!(bus.nodes[m].sim.pads.trigger(SENSOR_PIN), Ok(true));
    wait_for("sensor hook", || seen.load(Ordering::SeqCst) == 1);
    assert_eq!(bus.nodes[m].stage(), Stage::Startup2_2);

    peer.write(BoardConfig::default().sync.level_for(GpioState::Deasserted));
    bus.wait_stage(m, Stage::Operation);
}

#[test]
fn consumed_sensor_event_does_not_disturb_rendezvous() {
    early_sensor_event_is_survived(true);
}

#[test]
fn reported_sensor_event_does_not_disturb_rendezvous() {
    early_sensor_event_is_survived(false);
}
