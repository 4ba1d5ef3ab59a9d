//! Command shell.
//!
//! A line-based command table running as a shutdown participant. Lines
//! arrive through a channel (stdin in the binary, a test sender in
//! tests); the first word selects the command. The shell publishes its
//! lifecycle on its own event source.
//!
//! The shell leaves its loop when input ends, when termination is
//! requested, when a shutdown announcement appears on the OS bus, or
//! after a command asked to exit (`system:shutdown`).
//!
//! Prompt style and command name matching live in [`ShellSettings`],
//! shared with the `module:config` command so they change at runtime.

use crate::event::EventSource;
use crate::info::{SystemInfo, write_uptime};
use crate::participants::ParticipantContext;
use crate::uptime::{UptimeBreakdown, UptimeClock};
use clap::error::ErrorKind;
use clap::{ArgAction, ArgGroup, CommandFactory, Parser};
use modos_common::board::ShellConfig;
use modos_common::events::ShellEventFlags;
use modos_common::sssp::ShutdownKind;
use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Input poll interval; bounds how late terminate and shutdown are seen.
const INPUT_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("command '{0}' already registered")]
    DuplicateCommand(String),

    #[error("{0}: command not found")]
    UnknownCommand(String),

    #[error("{0}")]
    InvalidArguments(String),

    #[error("shell I/O: {0}")]
    Io(#[from] io::Error),
}

/// What the shell does after a command returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Continue,
    Exit,
}

/// Command callback: output stream and the full argument vector
/// (`argv[0]` is the command name).
pub type ShellCommand =
    Box<dyn FnMut(&mut dyn Write, &[&str]) -> Result<CommandOutcome, ShellError> + Send>;

/// Why the shell loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellExit {
    EndOfInput,
    OutputFailed,
    Terminated,
    ShutdownAnnounced(ShutdownKind),
    CommandExit,
}

/// Line source and output sink of a shell.
pub struct ShellIo {
    pub input: Receiver<String>,
    pub output: Box<dyn Write + Send>,
}

impl ShellIo {
    /// Channel-fed input. Dropping the sender ends the input.
    pub fn channel(output: Box<dyn Write + Send>) -> (Sender<String>, Self) {
        let (tx, input) = mpsc::channel();
        (tx, Self { input, output })
    }

    /// Read lines from stdin on a detached thread, write to stdout.
    pub fn stdio() -> io::Result<Self> {
        let (tx, io) = Self::channel(Box::new(io::stdout()));
        std::thread::Builder::new()
            .name("shell-stdin".to_string())
            .spawn(move || {
                for line in io::stdin().lock().lines() {
                    let Ok(line) = line else { break };
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            })?;
        Ok(io)
    }
}

/// Runtime shell behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShellSettings {
    pub prompt_minimal: bool,
    pub prompt_uptime: bool,
    pub match_case: bool,
}

impl Default for ShellSettings {
    fn default() -> Self {
        Self::from(&ShellConfig::default())
    }
}

impl From<&ShellConfig> for ShellSettings {
    fn from(config: &ShellConfig) -> Self {
        Self {
            prompt_minimal: config.prompt_minimal,
            prompt_uptime: config.prompt_uptime,
            match_case: config.match_case,
        }
    }
}

pub struct Shell {
    prompt: String,
    commands: BTreeMap<String, ShellCommand>,
    events: Arc<EventSource>,
    settings: Arc<Mutex<ShellSettings>>,
    clock: Option<Arc<UptimeClock>>,
    io: ShellIo,
}

impl Shell {
    pub fn new(prompt: impl Into<String>, io: ShellIo) -> Self {
        Self {
            prompt: prompt.into(),
            commands: BTreeMap::new(),
            events: EventSource::new("shell"),
            settings: Arc::new(Mutex::new(ShellSettings::default())),
            clock: None,
            io,
        }
    }

    pub fn with_settings(self, settings: ShellSettings) -> Self {
        *self.settings.lock() = settings;
        self
    }

    /// Clock shown by the uptime prompt; the prompt shows zero without one.
    pub fn with_uptime(mut self, clock: Arc<UptimeClock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Settings handle for `module:config`.
    pub fn settings(&self) -> Arc<Mutex<ShellSettings>> {
        Arc::clone(&self.settings)
    }

    /// Source of [`ShellEventFlags`].
    pub fn events(&self) -> &Arc<EventSource> {
        &self.events
    }

    pub fn add_command(&mut self, name: &str, command: ShellCommand) -> Result<(), ShellError> {
        if self.commands.contains_key(name) {
            return Err(ShellError::DuplicateCommand(name.to_string()));
        }
        self.commands.insert(name.to_string(), command);
        Ok(())
    }

    pub fn remove_command(&mut self, name: &str) -> Result<(), ShellError> {
        self.commands
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| ShellError::UnknownCommand(name.to_string()))
    }

    pub fn command_names(&self) -> Vec<&str> {
        self.commands.keys().map(String::as_str).collect()
    }

    /// Run until one of the exit conditions holds.
    pub fn run(mut self, ctx: &ParticipantContext) -> ShellExit {
        self.events.broadcast(ShellEventFlags::START.bits());
        let exit = self.run_loop(ctx);
        self.events.broadcast(ShellEventFlags::EXIT.bits());
        info!(?exit, "shell exited");
        exit
    }

    fn run_loop(&mut self, ctx: &ParticipantContext) -> ShellExit {
        if self.write_prompt().is_err() {
            self.events.broadcast(ShellEventFlags::IO_ERROR.bits());
            return ShellExit::OutputFailed;
        }
        loop {
            if ctx.should_terminate() {
                return ShellExit::Terminated;
            }
            if let Some(kind) = ctx.poll_shutdown() {
                return ShellExit::ShutdownAnnounced(kind);
            }
            let line = match self.io.input.recv_timeout(INPUT_POLL) {
                Ok(line) => line,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    self.events.broadcast(ShellEventFlags::IO_ERROR.bits());
                    return ShellExit::EndOfInput;
                }
            };
            match self.execute(&line) {
                Ok(CommandOutcome::Exit) => return ShellExit::CommandExit,
                Ok(CommandOutcome::Continue) => {}
                Err(e) => {
                    if writeln!(self.io.output, "{e}").is_err() {
                        self.events.broadcast(ShellEventFlags::IO_ERROR.bits());
                        return ShellExit::OutputFailed;
                    }
                }
            }
            if self.write_prompt().is_err() {
                self.events.broadcast(ShellEventFlags::IO_ERROR.bits());
                return ShellExit::OutputFailed;
            }
        }
    }

    /// Execute one input line. Blank lines do nothing.
    pub fn execute(&mut self, line: &str) -> Result<CommandOutcome, ShellError> {
        let args: Vec<&str> = line.split_whitespace().collect();
        let Some(&name) = args.first() else {
            return Ok(CommandOutcome::Continue);
        };
        let match_case = self.settings.lock().match_case;
        let command = if match_case {
            self.commands.get_mut(name)
        } else {
            self.commands
                .iter_mut()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, command)| command)
        }
        .ok_or_else(|| ShellError::UnknownCommand(name.to_string()))?;
        debug!(command = name, "shell command");
        self.events.broadcast(ShellEventFlags::EXEC.bits());
        let outcome = command(&mut self.io.output, &args);
        self.events.broadcast(ShellEventFlags::DONE.bits());
        outcome
    }

    fn write_prompt(&mut self) -> io::Result<()> {
        let settings = *self.settings.lock();
        if settings.prompt_uptime {
            let b = UptimeBreakdown::from(self.clock.as_ref().map_or(0, |c| c.now_us()));
            write!(
                self.io.output,
                "[{}:{:02}:{:02}:{:02}:{:03}:{:03}] ",
                b.days, b.hours, b.minutes, b.seconds, b.milliseconds, b.microseconds
            )?;
        }
        if settings.prompt_minimal || self.prompt.is_empty() {
            write!(self.io.output, "$ ")?;
        } else {
            write!(self.io.output, "{}$ ", self.prompt)?;
        }
        self.io.output.flush()
    }
}

// ─── System commands ────────────────────────────────────────────────

/// Arguments of `system:shutdown`.
#[derive(Parser, Debug)]
#[command(name = "system:shutdown", disable_help_flag = true, color = clap::ColorChoice::Never)]
#[command(group(
    ArgGroup::new("kind")
        .required(true)
        .args(["hibernate", "deepsleep", "transportation", "restart"])
))]
struct ShutdownArgs {
    /// Shutdown to hibernate mode. Least energy saving, but allows charging via pins.
    #[arg(short = 'h', long)]
    hibernate: bool,

    /// Shutdown to deepsleep mode. Minimum energy consumption while allowing charging via plug.
    #[arg(short = 'd', long)]
    deepsleep: bool,

    /// Shutdown to transportation mode. Minimum energy consumption with all interrupts disabled.
    #[arg(short = 't', long)]
    transportation: bool,

    /// Shutdown and restart the system.
    #[arg(short = 'r', long)]
    restart: bool,

    /// Print this help text.
    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,
}

impl ShutdownArgs {
    fn kind(&self) -> ShutdownKind {
        if self.hibernate {
            ShutdownKind::Hibernate
        } else if self.deepsleep {
            ShutdownKind::DeepSleep
        } else if self.transportation {
            ShutdownKind::Transportation
        } else {
            ShutdownKind::Restart
        }
    }
}

/// `system:shutdown`: raise the shutdown request on the OS bus and end
/// the shell.
pub fn shutdown_command(os_events: Arc<EventSource>) -> ShellCommand {
    Box::new(move |out: &mut dyn Write, args: &[&str]| {
        match ShutdownArgs::try_parse_from(args.iter().copied()) {
            Ok(parsed) => {
                let kind = parsed.kind();
                info!(%kind, "shutdown requested from shell");
                os_events.broadcast(kind.os_flags().bits());
                Ok(CommandOutcome::Exit)
            }
            Err(e) if e.kind() == ErrorKind::DisplayHelp => {
                write!(out, "{}", e.render())?;
                Ok(CommandOutcome::Continue)
            }
            Err(e) => Err(ShellError::InvalidArguments(e.render().to_string())),
        }
    })
}

/// Arguments of `module:config`.
#[derive(Parser, Debug)]
#[command(name = "module:config", disable_help_flag = true, color = clap::ColorChoice::Never)]
struct ConfigArgs {
    /// Set or retrieve shell configuration. OPT VAL pairs:
    /// `prompt text|minimal|uptime|notime`, `match casesensitive|caseinsensitive`.
    #[arg(long, num_args = 0..=2, value_names = ["OPT", "VAL"])]
    shell: Option<Vec<String>>,

    /// Print this help text.
    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,
}

fn apply_setting(settings: &mut ShellSettings, option: &str, value: &str) -> bool {
    match (option, value) {
        ("prompt", "text") => settings.prompt_minimal = false,
        ("prompt", "minimal") => settings.prompt_minimal = true,
        ("prompt", "notime") => settings.prompt_uptime = false,
        ("prompt", "uptime") => settings.prompt_uptime = true,
        ("match", "casesensitive") => settings.match_case = true,
        ("match", "caseinsensitive") => settings.match_case = false,
        _ => return false,
    }
    true
}

fn write_settings(out: &mut dyn Write, prompt: &str, settings: ShellSettings) -> io::Result<()> {
    writeln!(out, "current shell configuration:")?;
    writeln!(out, "  prompt text:   {}", if prompt.is_empty() { "n/a" } else { prompt })?;
    writeln!(
        out,
        "  prompt style:  {}, {}",
        if settings.prompt_minimal { "minimal" } else { "text" },
        if settings.prompt_uptime { "system uptime" } else { "no time" }
    )?;
    writeln!(
        out,
        "  text matching: {}",
        if settings.match_case { "case sensitive" } else { "case insensitive" }
    )
}

/// `module:config --shell [OPT VAL]`: print or change the shell settings.
pub fn config_command(prompt: String, settings: Arc<Mutex<ShellSettings>>) -> ShellCommand {
    Box::new(move |out: &mut dyn Write, args: &[&str]| {
        let parsed = match ConfigArgs::try_parse_from(args.iter().copied()) {
            Ok(parsed) => parsed,
            Err(e) if e.kind() == ErrorKind::DisplayHelp => {
                write!(out, "{}", e.render())?;
                return Ok(CommandOutcome::Continue);
            }
            Err(e) => return Err(ShellError::InvalidArguments(e.render().to_string())),
        };
        match parsed.shell.as_deref() {
            Some([]) => {
                let current = *settings.lock();
                write_settings(out, &prompt, current)?;
                Ok(CommandOutcome::Continue)
            }
            Some([option, value]) if apply_setting(&mut settings.lock(), option, value) => {
                debug!(option = %option, value = %value, "shell setting changed");
                Ok(CommandOutcome::Continue)
            }
            _ => Err(ShellError::InvalidArguments(
                ConfigArgs::command().render_help().to_string(),
            )),
        }
    })
}

/// `module:info`: system report followed by the uptime breakdown.
pub fn info_command(info: SystemInfo, clock: Arc<UptimeClock>) -> ShellCommand {
    Box::new(move |out: &mut dyn Write, _args: &[&str]| {
        info.write_to(out)?;
        write_uptime(out, clock.now_us())?;
        Ok(CommandOutcome::Continue)
    })
}
