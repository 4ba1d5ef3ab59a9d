//! Shutdown sequence across the bus.

use super::harness::{Bus, Capture, board, wait_for};
use modos_common::events::OsEventFlags;
use modos_common::sssp::{Role, ShutdownKind, Stage};
use modos_core::peripherals::{HostPeripheral, PeripheralSet};
use modos_core::event::SystemEvent;
use modos_core::shell::ShellIo;
use modos_core::{CoreError, ModuleHooks};
use modos_hal::drivers::simulation::SimModuleOptions;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn handoff_kind(err: CoreError) -> ShutdownKind {
    match err {
        CoreError::HandoffReturned(kind) => kind,
        other => panic!("expected a returned hand-off, got {other}"),
    }
}

#[test]
fn restart_reaches_participants_before_they_are_joined() {
    let mut bus = Bus::new();
    let m = bus.add(board(Role::Master, "M"));
    let f = bus.add(board(Role::Follower, "F"));

    let seen: Arc<Mutex<Vec<(String, OsEventFlags)>>> = Arc::default();
    for name in ["logger", "telemetry"] {
        let seen = Arc::clone(&seen);
        bus.participants_mut(m)
            .spawn(name, move |ctx| {
                while !ctx.should_terminate() {
                    if let Ok(Some(flags)) = ctx.wait_os_event(Duration::from_millis(5)) {
                        seen.lock().push((ctx.name().to_string(), flags));
                    }
                }
            })
            .unwrap();
    }

    bus.start_all();
    bus.wait_all(Stage::Operation);
    bus.nodes[m].handle.request_shutdown(ShutdownKind::Restart);

    assert_eq!(handoff_kind(bus.join(m)), ShutdownKind::Restart);
    assert_eq!(handoff_kind(bus.join(f)), ShutdownKind::Passive);

    // The request and the announcement may be observed separately.
    let mut seen = seen.lock().clone();
    seen.sort();
    seen.dedup();
    assert_eq!(
        seen,
        vec![
            ("logger".to_string(), OsEventFlags::RESTART),
            ("telemetry".to_string(), OsEventFlags::RESTART),
        ]
    );

    assert_eq!(bus.nodes[m].sim.boot_agent.calls(), vec![ShutdownKind::Restart]);
    assert_eq!(bus.nodes[f].sim.boot_agent.calls(), vec![ShutdownKind::Passive]);
    for node in &bus.nodes {
        assert_eq!(node.stage(), Stage::Shutdown1_3);
    }
    assert!(bus.nodes[m].sim.pd_driver.is_asserting());
    assert!(!bus.nodes[f].sim.pd_driver.is_asserting());
    assert!(bus.net.sync_line().is_asserted());
}

#[test]
fn peer_power_down_is_a_passive_shutdown() {
    let mut bus = Bus::operating(2);
    let _peer = bus.assert_pd_externally();

    for index in 0..bus.nodes.len() {
        assert_eq!(handoff_kind(bus.join(index)), ShutdownKind::Passive);
        let node = &bus.nodes[index];
        assert_eq!(node.sim.boot_agent.calls(), vec![ShutdownKind::Passive]);
        assert!(!node.sim.pd_driver.is_asserting());
        assert!(node.sim.sync_driver.is_asserting());
    }
}

#[test]
fn master_stops_pulsing_after_shutdown() {
    let mut bus = Bus::operating(1);
    bus.advance_to(2_000_000);
    bus.nodes[1].handle.request_shutdown(ShutdownKind::Hibernate);
    assert_eq!(handoff_kind(bus.join(1)), ShutdownKind::Hibernate);
    assert_eq!(handoff_kind(bus.join(0)), ShutdownKind::Passive);

    // SYNC stays asserted through further periods.
    for t in [2_500_000, 3_000_000, 5_000_000] {
        bus.advance_to(t);
        assert!(bus.net.sync_line().is_asserted());
    }
    assert_eq!(bus.nodes[0].handle.uptime_us(), 5_000_000);
}

/// Counts main loop wake-ups.
struct Wakeups(Arc<AtomicUsize>);

impl ModuleHooks for Wakeups {
    fn loop_wakeup(&mut self, _event: &SystemEvent) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn plain_shutdown_flag_does_not_select_a_kind() {
    let wakeups = Arc::new(AtomicUsize::new(0));
    let mut bus = Bus::new();
    let m = bus.add_with(
        board(Role::Master, "M"),
        SimModuleOptions::default(),
        Box::new(Wakeups(Arc::clone(&wakeups))),
    );
    bus.start(m);
    bus.wait_stage(m, Stage::Operation);
    let handle = bus.nodes[m].handle.clone();

    handle.os_events().broadcast(OsEventFlags::SHUTDOWN.bits());
    wait_for("first wake-up", || wakeups.load(Ordering::SeqCst) == 1);
    handle
        .os_events()
        .broadcast((OsEventFlags::HIBERNATE | OsEventFlags::RESTART).bits());
    wait_for("second wake-up", || wakeups.load(Ordering::SeqCst) == 2);
    assert_eq!(handle.stage(), Stage::Operation);

    handle.request_shutdown(ShutdownKind::DeepSleep);
    assert_eq!(handoff_kind(bus.join(m)), ShutdownKind::DeepSleep);
}

/// Adds a board peripheral and records the shutdown kind it saw.
struct BoardPeripherals {
    imu: Option<HostPeripheral>,
    shutdown: Arc<Mutex<Option<ShutdownKind>>>,
}

impl ModuleHooks for BoardPeripherals {
    fn init_peripherals(&mut self, peripherals: &mut PeripheralSet) {
        if let Some(imu) = self.imu.take() {
            peripherals.add(Box::new(imu), false);
        }
    }

    fn shutdown_peripherals(&mut self, kind: ShutdownKind) {
        *self.shutdown.lock() = Some(kind);
    }
}

#[test]
fn board_peripherals_are_stopped_with_the_rest() {
    let imu = HostPeripheral::new("imu");
    let running = imu.running_flag();
    let shutdown = Arc::new(Mutex::new(None));
    let hooks = BoardPeripherals {
        imu: Some(imu),
        shutdown: Arc::clone(&shutdown),
    };

    let mut bus = Bus::new();
    let m = bus.add_with(board(Role::Master, "M"), SimModuleOptions::default(), Box::new(hooks));
    bus.start(m);
    bus.wait_stage(m, Stage::Operation);
    assert!(running.load(Ordering::Acquire));

    bus.nodes[m].handle.request_shutdown(ShutdownKind::Transportation);
    assert_eq!(handoff_kind(bus.join(m)), ShutdownKind::Transportation);
    assert!(!running.load(Ordering::Acquire));
    assert_eq!(*shutdown.lock(), Some(ShutdownKind::Transportation));
}

#[test]
fn shell_command_shuts_the_bus_down() {
    let output = Capture::default();
    let (input, io) = ShellIo::channel(Box::new(output.clone()));

    let mut bus = Bus::new();
    let m = bus.add(board(Role::Master, "M"));
    let f = bus.add(board(Role::Follower, "F"));
    bus.attach_shell(m, io);
    bus.start_all();
    bus.wait_all(Stage::Operation);

    wait_for("shell prompt", || output.text().contains("modos$ "));
    input.send("module:info".to_string()).unwrap();
    wait_for("system info", || output.text().contains("The system is running for"));
    input.send("module:config --shell".to_string()).unwrap();
    wait_for("shell settings", || output.text().contains("text matching: case sensitive"));
    input.send("system:shutdown --deepsleep".to_string()).unwrap();

    assert_eq!(handoff_kind(bus.join(m)), ShutdownKind::DeepSleep);
    assert_eq!(handoff_kind(bus.join(f)), ShutdownKind::Passive);

    let text = output.text();
    assert!(text.contains("M (v1.0)"), "{text}");
    assert!(text.contains("master"), "{text}");
}
