//! Test bus: simulated modules on shared PD/SYNC lines, each with its
//! control loop on a real thread. Time only moves when a test advances it.

use modos_common::board::BoardConfig;
use modos_common::gpio::GpioState;
use modos_common::sssp::{Role, Stage};
use modos_core::participants::Participants;
use modos_core::shell::ShellIo;
use modos_core::{ControlLoop, CoreError, ModuleHandle, ModuleHooks, NoHooks, SystemContext};
use modos_hal::ControlPin;
use modos_hal::drivers::simulation::{
    LineDriver, SimModule, SimModuleOptions, SimNetwork, SimTime,
};
use parking_lot::Mutex;
use std::convert::Infallible;
use std::io::{self, Write};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

pub const WAIT: Duration = Duration::from_secs(5);

pub const PERIOD_US: u64 = 1_000_000;

type ControlResult = Result<Infallible, CoreError>;

pub fn board(role: Role, name: &str) -> BoardConfig {
    let mut board = BoardConfig::default().with_role(role);
    board.module.name = name.to_string();
    board.sync_period_us = PERIOD_US;
    board
}

/// Poll `cond` until it holds or [`WAIT`] elapses.
pub fn wait_for(what: &str, cond: impl Fn() -> bool) {
    let deadline = Instant::now() + WAIT;
    while !cond() {
        if Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}

pub struct Node {
    pub handle: ModuleHandle,
    pub sim: SimModule,
    pending: Option<ControlLoop<Box<dyn ModuleHooks>>>,
    thread: Option<JoinHandle<ControlResult>>,
}

impl Node {
    pub fn stage(&self) -> Stage {
        self.handle.stage()
    }

    pub fn holds_sync(&self) -> bool {
        self.sim.sync_driver.is_asserting()
    }
}

pub struct Bus {
    pub net: SimNetwork,
    pub nodes: Vec<Node>,
}

impl Bus {
    pub fn new() -> Self {
        Self::with_time(SimTime::standard())
    }

    pub fn with_time(time: Arc<SimTime>) -> Self {
        Self {
            net: SimNetwork::new(time, &BoardConfig::default()),
            nodes: Vec::new(),
        }
    }

    /// One master followed by `followers` followers, all started and
    /// operating.
    pub fn operating(followers: usize) -> Self {
        let mut bus = Self::new();
        bus.add(board(Role::Master, "master"));
        for i in 0..followers {
            bus.add(board(Role::Follower, &format!("follower-{i}")));
        }
        bus.start_all();
        bus.wait_all(Stage::Operation);
        bus
    }

    pub fn time(&self) -> &Arc<SimTime> {
        self.net.time()
    }

    pub fn advance_to(&self, us: u64) {
        self.time().advance_to(us);
    }

    pub fn add(&mut self, board: BoardConfig) -> usize {
        self.add_with(board, SimModuleOptions::default(), Box::new(NoHooks))
    }

    /// Attach and initialize a module. It holds SYNC until started.
    pub fn add_with(
        &mut self,
        board: BoardConfig,
        options: SimModuleOptions,
        hooks: Box<dyn ModuleHooks>,
    ) -> usize {
        let sim = self.net.attach_module_with(&board, options);
        let ctx = SystemContext::init(board, sim.platform.clone()).expect("module init");
        let control = ControlLoop::new(ctx, hooks);
        self.nodes.push(Node {
            handle: control.handle(),
            sim,
            pending: Some(control),
            thread: None,
        });
        self.nodes.len() - 1
    }

    pub fn participants_mut(&mut self, index: usize) -> &mut Participants {
        self.nodes[index]
            .pending
            .as_mut()
            .expect("module already started")
            .participants_mut()
    }

    pub fn attach_shell(&mut self, index: usize, io: ShellIo) {
        let node = &mut self.nodes[index];
        let control = node.pending.take().expect("module already started");
        node.pending = Some(control.with_shell(io));
    }

    /// Run the control loop of module `index`; it releases SYNC at once.
    pub fn start(&mut self, index: usize) {
        let node = &mut self.nodes[index];
        let control = node.pending.take().expect("module already started");
        let thread = std::thread::Builder::new()
            .name(format!("control-{}", node.handle.name()))
            .spawn(move || control.run())
            .expect("spawn control thread");
        node.thread = Some(thread);
    }

    pub fn start_all(&mut self) {
        for index in 0..self.nodes.len() {
            self.start(index);
        }
    }

    /// Start module `index` and wait until it let go of SYNC.
    pub fn release(&mut self, index: usize) {
        self.start(index);
        let node = &self.nodes[index];
        wait_for("SYNC release", || !node.holds_sync());
    }

    pub fn wait_stage(&self, index: usize, stage: Stage) {
        let node = &self.nodes[index];
        wait_for(&format!("{} to reach {stage}", node.handle.name()), || {
            node.stage() >= stage
        });
    }

    pub fn wait_all(&self, stage: Stage) {
        for index in 0..self.nodes.len() {
            self.wait_stage(index, stage);
        }
    }

    /// Join the control thread of module `index`, returning its error.
    pub fn join(&mut self, index: usize) -> CoreError {
        let thread = self.nodes[index]
            .thread
            .take()
            .expect("module not started");
        match thread.join().expect("control thread panicked") {
            Ok(never) => match never {},
            Err(e) => e,
        }
    }

    /// Drive the shared PD line from outside any module.
    pub fn assert_pd_externally(&self) -> Arc<LineDriver> {
        let driver = self.net.pd_line().attach(false);
        driver.write(BoardConfig::default().pd.level_for(GpioState::Asserted));
        driver
    }
}

/// Cloneable shell output sink.
#[derive(Clone, Default)]
pub struct Capture(pub Arc<Mutex<Vec<u8>>>);

impl Capture {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
