//! Serial link manager.
//!
//! Owns the hardware descriptor for the whole daemon lifetime: opens it
//! without becoming its controlling terminal, swaps the line discipline
//! into the bridge's raw-ish mode (no CR translation, no echo, fixed
//! baud), and routes "input available" readiness to this process as a
//! real-time signal. The configuration captured before any mutation is
//! reapplied on [`SerialLink::restore`], and as a fallback on drop, so
//! the device is handed back the way it was found.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use nix::sys::termios::{self, BaudRate, InputFlags, LocalFlags, SetArg, Termios};
use tracing::{debug, info, warn};

use mculink_core::error::{Error, Result};

// Linux-specific fcntl command replacing SIGIO with a chosen signal for
// O_ASYNC readiness delivery. Not bound by the libc crate.
const F_SETSIG: libc::c_int = 10;

/// The open serial descriptor plus its original and modified line
/// configuration.
#[derive(Debug)]
pub struct SerialLink {
    file: File,
    original: Termios,
    path: PathBuf,
    restored: bool,
}

impl SerialLink {
    /// Open and configure the device at `path`.
    ///
    /// The descriptor is opened read/write, non-blocking, and with
    /// `O_NOCTTY` so stray line input can never signal this process
    /// through terminal semantics. The previous termios state is captured
    /// before the modified configuration (ICRNL and ECHO cleared, output
    /// speed fixed to `baud`) is flushed in with `TCSAFLUSH`.
    pub fn open(path: &Path, baud: u32) -> Result<Self> {
        let rate = baud_rate(baud)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY | libc::O_NONBLOCK)
            .open(path)
            .map_err(|source| Error::LinkOpen {
                path: path.display().to_string(),
                source,
            })?;

        let original = termios::tcgetattr(&file)
            .map_err(|e| Error::ConfigRead(io::Error::from_raw_os_error(e as i32)))?;

        let mut modified = original.clone();
        // No carriage-return translation on input, no echo of received
        // characters back down the TX line.
        modified.input_flags.remove(InputFlags::ICRNL);
        modified.local_flags.remove(LocalFlags::ECHO);
        termios::cfsetospeed(&mut modified, rate).map_err(|_| Error::BaudRate(baud))?;

        termios::tcsetattr(&file, SetArg::TCSAFLUSH, &modified)
            .map_err(|e| Error::ConfigWrite(io::Error::from_raw_os_error(e as i32)))?;

        info!(path = %path.display(), baud, "serial link configured");

        Ok(Self {
            file,
            original,
            path: path.to_path_buf(),
            restored: false,
        })
    }

    /// Route descriptor readiness to this process as `signal`.
    ///
    /// Three steps, each with its own failure class: make this process
    /// the owner that receives I/O signals (`F_SETOWN`), replace the
    /// generic SIGIO with the distinguishable real-time signal
    /// (`F_SETSIG`, which also makes the kernel attach the reason code),
    /// then enable `O_ASYNC` delivery alongside non-blocking I/O.
    pub fn claim_io_signal(&self, signal: libc::c_int) -> Result<()> {
        let fd = self.file.as_raw_fd();

        let pid = std::process::id() as libc::c_int;
        if unsafe { libc::fcntl(fd, libc::F_SETOWN, pid) } == -1 {
            return Err(Error::Ownership(io::Error::last_os_error()));
        }

        if unsafe { libc::fcntl(fd, F_SETSIG, signal) } == -1 {
            return Err(Error::SignalSetup(io::Error::last_os_error()));
        }

        let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
        if flags == -1 {
            return Err(Error::AsyncMode(io::Error::last_os_error()));
        }
        let wanted = flags | libc::O_ASYNC | libc::O_NONBLOCK;
        if unsafe { libc::fcntl(fd, libc::F_SETFL, wanted) } == -1 {
            return Err(Error::AsyncMode(io::Error::last_os_error()));
        }

        debug!(path = %self.path.display(), signal, "readiness signalling enabled");
        Ok(())
    }

    /// Reapply the line configuration captured at open.
    ///
    /// Attempted at shutdown on every path; a failure is reported to the
    /// caller but must not prevent process exit.
    pub fn restore(&mut self) -> Result<()> {
        termios::tcsetattr(&self.file, SetArg::TCSAFLUSH, &self.original)
            .map_err(|e| Error::ConfigWrite(io::Error::from_raw_os_error(e as i32)))?;
        self.restored = true;
        info!(path = %self.path.display(), "original line configuration restored");
        Ok(())
    }

    /// Device path this link was opened on.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Read for SerialLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (&self.file).read(buf)
    }
}

impl Write for SerialLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (&self.file).write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        (&self.file).flush()
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        if self.restored {
            return;
        }
        if let Err(e) = termios::tcsetattr(&self.file, SetArg::TCSAFLUSH, &self.original) {
            warn!(
                path = %self.path.display(),
                error = %e,
                "failed to restore line configuration on drop"
            );
        }
    }
}

/// Map a numeric rate onto the termios constant.
///
/// Only the rates the bridge is deployed with are accepted; anything
/// else is a configuration mistake, caught before the device is touched.
fn baud_rate(baud: u32) -> Result<BaudRate> {
    match baud {
        300 => Ok(BaudRate::B300),
        2400 => Ok(BaudRate::B2400),
        9600 => Ok(BaudRate::B9600),
        38400 => Ok(BaudRate::B38400),
        other => Err(Error::BaudRate(other)),
    }
}
