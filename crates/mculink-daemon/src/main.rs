//! mculinkd: serial-to-message-queue bridge daemon.
//!
//! Startup order matters and is fixed here:
//!
//! 1. fork into the background (unless `--foreground`), before any
//!    thread exists;
//! 2. initialize logging (the non-blocking writer spawns a thread);
//! 3. block the wake signals, so nothing can be delivered unblocked;
//! 4. publish the pid, open and configure the link, arm the wakeups;
//! 5. run the event loop.
//!
//! Shutdown runs the same list backwards, best effort: restore the line
//! configuration, remove the advertised names. Cleanup failures are
//! logged but never mask the exit status of the error that got us there.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use daemonize::Daemonize;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use mculink_core::constants::{
    DEFAULT_BAUD, DEFAULT_DEVICE, DISCOVERY_SEM_NAME, RX_QUEUE_NAME, TX_QUEUE_NAME,
};
use mculink_core::error::{Error, Result};
use mculink_daemon::signals::{self, SignalWake};
use mculink_daemon::{Dispatcher, SerialBridge, SerialLink};
use mculink_ipc::{DiscoverySemaphore, PosixQueue};

#[derive(Parser)]
#[command(name = "mculinkd")]
#[command(version, about = "Bridges a serial link with POSIX message queues", long_about = None)]
struct Args {
    /// Serial device to bridge
    #[arg(long, default_value = DEFAULT_DEVICE)]
    device: PathBuf,

    /// Line speed (300, 2400, 9600 or 38400)
    #[arg(long, default_value_t = DEFAULT_BAUD)]
    baud: u32,

    /// Stay in the foreground and log to stderr
    #[arg(short, long)]
    foreground: bool,

    /// Directory for the log file (background mode)
    #[arg(long, default_value = "/var/log/mculink")]
    log_dir: PathBuf,

    /// Pid file (background mode)
    #[arg(long, default_value = "/run/mculinkd.pid")]
    pid_file: PathBuf,
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Block the wake signals before any other thread can exist. The
    // mask is per-thread and inherited at spawn; a thread started with
    // it open (the non-blocking log writer, for one) would receive a
    // process-directed SIGUSR1 itself and die with the default
    // disposition, taking the daemon down.
    let wake = match SignalWake::install() {
        Ok(wake) => wake,
        Err(e) => {
            eprintln!("mculinkd: {e}");
            return ExitCode::from(e.exit_code() as u8);
        }
    };

    // Fork before logging: the non-blocking log writer runs on its own
    // thread, and threads do not survive daemonize's fork.
    if !args.foreground {
        if let Err(e) = go_background(&args) {
            eprintln!("mculinkd: {e}");
            return ExitCode::from(e.exit_code() as u8);
        }
    }

    let _log_guard = match init_logging(&args) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("mculinkd: {e}");
            return ExitCode::from(e.exit_code() as u8);
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        device = %args.device.display(),
        baud = args.baud,
        "starting"
    );

    match run(&args, wake) {
        Ok(()) => {
            info!("exited cleanly");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, exit_code = e.exit_code(), "exiting on error");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

fn go_background(args: &Args) -> Result<()> {
    Daemonize::new()
        .pid_file(&args.pid_file)
        .working_directory("/")
        .start()
        .map_err(|e| Error::Daemonize(e.to_string()))
}

/// Foreground: stderr. Background: a non-blocking file writer, whose
/// guard must live for the whole process so buffered lines are flushed.
fn init_logging(args: &Args) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if args.foreground {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
        return Ok(None);
    }

    std::fs::create_dir_all(&args.log_dir)?;
    let appender = tracing_appender::rolling::never(&args.log_dir, "mculinkd.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false))
        .init();
    Ok(Some(guard))
}

fn run(args: &Args, wake: SignalWake) -> Result<()> {
    // The wake signals are blocked by now, so publishing the pid cannot
    // invite a SIGUSR1 we are not ready for.
    let discovery = DiscoverySemaphore::publish(DISCOVERY_SEM_NAME)?;

    let outcome = bridge_session(args, wake);

    remove_published_names();
    drop(discovery);
    outcome
}

/// Everything between "pid published" and "names removed".
fn bridge_session(args: &Args, wake: SignalWake) -> Result<()> {
    let link = SerialLink::open(&args.device, args.baud)?;
    link.claim_io_signal(signals::link_readable_signal())?;

    let bridge = SerialBridge::new(link, signals::OUTBOUND_POSTED_SIGNAL)?;
    let mut dispatcher = Dispatcher::new(wake, bridge);
    let outcome = dispatcher.run();

    // Hand the device back the way it was found, whatever ended the
    // loop. A failure here is reported but cannot be acted on.
    let mut link = dispatcher.into_bridge().into_link();
    if let Err(e) = link.restore() {
        warn!(path = %link.path().display(), error = %e, "could not restore line configuration");
    }
    outcome
}

/// Unlink the advertised IPC names so no stale pid or queue outlives the
/// daemon. Each removal is independent and best effort.
fn remove_published_names() {
    if let Err(e) = DiscoverySemaphore::unlink(DISCOVERY_SEM_NAME) {
        warn!(error = %e, "could not unlink discovery semaphore");
    }
    for name in [TX_QUEUE_NAME, RX_QUEUE_NAME] {
        if let Err(e) = PosixQueue::unlink(name) {
            warn!(queue = name, error = %e, "could not unlink message queue");
        }
    }
}
