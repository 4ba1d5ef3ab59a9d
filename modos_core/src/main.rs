//! # ModOS Simulator
//!
//! Runs a bus of simulated modules on the host. Module 0 is the SYNC
//! master and owns the shell on stdin/stdout; every further module is a
//! follower. All modules share one time base, driven from the wall clock.
//!
//! `system:shutdown -r` (or any other kind) takes the whole bus down.
//! Each module ends by handing off to its simulated boot agent, which
//! returns, so the process exits with status 1.

use clap::Parser;
use modos_common::board::{BoardConfig, validate_network};
use modos_common::config::LogLevel;
use modos_common::sssp::Role;
use modos_core::shell::ShellIo;
use modos_core::{ControlLoop, CoreError, NoHooks, SystemContext};
use modos_hal::drivers::simulation::{SimNetwork, SimTime};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

/// ModOS simulator - SSSP control layer on a simulated module bus
#[derive(Parser, Debug)]
#[command(name = "modos_core")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Runs simulated ModOS modules sharing PD and SYNC lines")]
struct Args {
    /// Board configuration TOML. The built-in reference board when omitted.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Number of modules on the bus; module 0 is the master.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
    modules: u16,

    /// Wall clock step of the simulated time base, in milliseconds.
    #[arg(long, default_value_t = 1)]
    pump_step_ms: u64,

    /// Enable verbose logging (DEBUG level), overriding the board log level.
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();

    // Tracing is not up yet; the board file selects its default level.
    let base = match &args.config {
        Some(path) => match BoardConfig::load_validated(path) {
            Ok(board) => board,
            Err(e) => {
                eprintln!("FATAL: {}: {e}", path.display());
                process::exit(1);
            }
        },
        None => BoardConfig::default(),
    };
    setup_tracing(&args, base.shared.log_level);

    info!("ModOS simulator v{} starting...", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &args.config {
        info!("Board config loaded from {:?}", path);
    }

    if let Err(e) = run(&args, base) {
        error!("FATAL: {e}");
        process::exit(1);
    }
}

fn run(args: &Args, base: BoardConfig) -> Result<(), Box<dyn std::error::Error>> {
    let boards: Vec<BoardConfig> = (0..args.modules)
        .map(|i| {
            if i == 0 {
                return base.clone().with_role(Role::Master);
            }
            let mut board = base.clone().with_role(Role::Follower);
            board.module.name = format!("{}-{i}", base.module.name);
            board
        })
        .collect();
    validate_network(&boards)?;

    let time = SimTime::standard();
    let net = SimNetwork::new(Arc::clone(&time), &base);

    // Every module holds SYNC before any control thread releases it.
    let mut contexts = Vec::with_capacity(boards.len());
    for board in boards {
        let module = net.attach_module(&board);
        contexts.push(SystemContext::init(board, module.platform)?);
    }
    info!(
        "{} module(s) initialized, sync_period={}us",
        contexts.len(),
        base.sync_period_us
    );

    let stop = Arc::new(AtomicBool::new(false));
    let pump = time.spawn_realtime_pump(
        Arc::clone(&stop),
        Duration::from_millis(args.pump_step_ms.max(1)),
    )?;

    let mut controls: Vec<JoinHandle<Result<std::convert::Infallible, CoreError>>> = Vec::new();
    for (i, ctx) in contexts.into_iter().enumerate() {
        let mut control = ControlLoop::new(ctx, NoHooks);
        if i == 0 {
            control = control.with_shell(ShellIo::stdio()?);
        }
        let handle = thread::Builder::new()
            .name(format!("control-{i}"))
            .spawn(move || control.run())?;
        controls.push(handle);
    }

    let mut fatal = None;
    for handle in controls {
        match handle.join() {
            Ok(Ok(never)) => match never {},
            Ok(Err(e)) => {
                error!("{e}");
                fatal.get_or_insert(e);
            }
            Err(_) => error!("control thread panicked"),
        }
    }

    stop.store(true, Ordering::Release);
    if pump.join().is_err() {
        error!("time pump panicked");
    }

    match fatal {
        Some(e) => Err(Box::new(e)),
        None => Ok(()),
    }
}

fn setup_tracing(args: &Args, board_level: LogLevel) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::from(board_level)
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}
