//! Named, bounded POSIX message queues.
//!
//! [`PosixQueue`] is a thin RAII handle over the `mq_*` family. The libc
//! calls are used directly: the pack's usual syscall wrapper does not
//! bind `mq_notify`, and the rest of the family is small enough to keep
//! in one place. Every handle is opened non-blocking, so sends against a
//! full queue and receives against an empty one report immediately
//! instead of suspending the event loop.

use std::ffi::CString;
use std::io;

use tracing::{debug, trace};

use mculink_core::constants::{QUEUE_DEPTH, QUEUE_MESSAGE_BYTES};
use mculink_core::error::{Error, Result};
use mculink_core::types::QueueAttributes;

/// How a queue handle will be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Draining only (the transmit pipeline's view of the TX queue).
    ReadOnly,

    /// Publishing, plus reading for overflow eviction (the receive
    /// pipeline's view of the RX queue).
    ReadWrite,
}

impl AccessMode {
    fn oflag(self) -> libc::c_int {
        let base = match self {
            AccessMode::ReadOnly => libc::O_RDONLY,
            AccessMode::ReadWrite => libc::O_RDWR,
        };
        base | libc::O_NONBLOCK
    }
}

/// Queue operations the pipelines rely on.
///
/// Implemented by [`PosixQueue`] for the real kernel objects and by
/// in-memory fakes in the daemon's tests.
pub trait BridgeQueue {
    /// Well-known name of the queue.
    fn name(&self) -> &str;

    /// Current capacity/occupancy snapshot.
    fn attributes(&self) -> Result<QueueAttributes>;

    /// Enqueue one message.
    ///
    /// # Errors
    ///
    /// [`Error::QueueFull`] when the queue cannot take another message;
    /// [`Error::QueueSend`] for any other failure.
    fn send(&mut self, payload: &[u8], priority: u32) -> Result<()>;

    /// Dequeue one message into `buf`, returning its length, or `None`
    /// when the queue is empty.
    fn receive(&mut self, buf: &mut [u8]) -> Result<Option<usize>>;

    /// Drop the oldest queued message, freeing one slot. Returns whether
    /// a message was actually discarded.
    fn discard_oldest(&mut self) -> Result<bool> {
        let attrs = self.attributes()?;
        let mut scratch = vec![0u8; attrs.message_size as usize];
        Ok(self.receive(&mut scratch)?.is_some())
    }
}

impl<Q: BridgeQueue + ?Sized> BridgeQueue for &mut Q {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn attributes(&self) -> Result<QueueAttributes> {
        (**self).attributes()
    }

    fn send(&mut self, payload: &[u8], priority: u32) -> Result<()> {
        (**self).send(payload, priority)
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<Option<usize>> {
        (**self).receive(buf)
    }
}

/// RAII handle on a named POSIX message queue.
#[derive(Debug)]
pub struct PosixQueue {
    mqd: libc::mqd_t,
    name: String,
}

impl PosixQueue {
    /// Open an existing queue.
    pub fn open(name: &str, mode: AccessMode) -> Result<Self> {
        let c_name = queue_name(name)?;
        let mqd = unsafe { libc::mq_open(c_name.as_ptr(), mode.oflag()) };
        if mqd < 0 {
            return Err(Error::QueueOpen {
                name: name.to_string(),
                source: io::Error::last_os_error(),
            });
        }
        trace!(queue = name, "opened message queue");
        Ok(Self {
            mqd,
            name: name.to_string(),
        })
    }

    /// Create the queue with the bridge's fixed geometry, or open it if a
    /// peer created it first.
    ///
    /// Mode 0666: any local user may exchange frames with the daemon.
    pub fn create(name: &str, mode: AccessMode) -> Result<Self> {
        let c_name = queue_name(name)?;
        let mut attr: libc::mq_attr = unsafe { std::mem::zeroed() };
        attr.mq_maxmsg = QUEUE_DEPTH as libc::c_long;
        attr.mq_msgsize = QUEUE_MESSAGE_BYTES as libc::c_long;

        let oflag = mode.oflag() | libc::O_CREAT;
        let perms: libc::c_uint = 0o666;
        let mqd = unsafe { libc::mq_open(c_name.as_ptr(), oflag, perms, &attr) };
        if mqd < 0 {
            return Err(Error::QueueOpen {
                name: name.to_string(),
                source: io::Error::last_os_error(),
            });
        }
        debug!(queue = name, "created message queue");
        Ok(Self {
            mqd,
            name: name.to_string(),
        })
    }

    /// Open the queue, creating it on first use.
    ///
    /// A missing queue is the normal first-run condition, not an error:
    /// whichever side touches the name first materializes it.
    pub fn open_or_create(name: &str, mode: AccessMode) -> Result<Self> {
        match Self::open(name, mode) {
            Ok(queue) => Ok(queue),
            Err(Error::QueueOpen { ref source, .. })
                if source.raw_os_error() == Some(libc::ENOENT) =>
            {
                Self::create(name, mode)
            }
            Err(e) => Err(e),
        }
    }

    /// Register a one-shot wakeup: the kernel delivers `signal` to this
    /// process when a message arrives while the queue is unwatched.
    ///
    /// The registration is consumed by a single delivery and must be
    /// re-established after every drain cycle.
    pub fn register_wakeup(&self, signal: libc::c_int) -> Result<()> {
        let mut sev: libc::sigevent = unsafe { std::mem::zeroed() };
        sev.sigev_notify = libc::SIGEV_SIGNAL;
        sev.sigev_signo = signal;
        if unsafe { libc::mq_notify(self.mqd, &sev) } == -1 {
            return Err(Error::NotifyRegister(io::Error::last_os_error()));
        }
        trace!(queue = %self.name, signal, "armed queue wakeup");
        Ok(())
    }

    /// Remove the queue name from the system.
    pub fn unlink(name: &str) -> Result<()> {
        let c_name = queue_name(name)?;
        if unsafe { libc::mq_unlink(c_name.as_ptr()) } == -1 {
            return Err(Error::QueueOpen {
                name: name.to_string(),
                source: io::Error::last_os_error(),
            });
        }
        debug!(queue = name, "unlinked message queue");
        Ok(())
    }
}

impl BridgeQueue for PosixQueue {
    fn name(&self) -> &str {
        &self.name
    }

    fn attributes(&self) -> Result<QueueAttributes> {
        let mut attr: libc::mq_attr = unsafe { std::mem::zeroed() };
        if unsafe { libc::mq_getattr(self.mqd, &mut attr) } == -1 {
            return Err(Error::QueueAttributes {
                name: self.name.clone(),
                source: io::Error::last_os_error(),
            });
        }
        Ok(QueueAttributes {
            capacity: attr.mq_maxmsg as i64,
            message_size: attr.mq_msgsize as i64,
            queued: attr.mq_curmsgs as i64,
        })
    }

    fn send(&mut self, payload: &[u8], priority: u32) -> Result<()> {
        let rc = unsafe {
            libc::mq_send(
                self.mqd,
                payload.as_ptr() as *const libc::c_char,
                payload.len(),
                priority,
            )
        };
        if rc == -1 {
            let source = io::Error::last_os_error();
            if source.raw_os_error() == Some(libc::EAGAIN) {
                return Err(Error::QueueFull {
                    name: self.name.clone(),
                });
            }
            return Err(Error::QueueSend {
                name: self.name.clone(),
                source,
            });
        }
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<Option<usize>> {
        let mut priority: libc::c_uint = 0;
        let n = unsafe {
            libc::mq_receive(
                self.mqd,
                buf.as_mut_ptr() as *mut libc::c_char,
                buf.len(),
                &mut priority,
            )
        };
        if n < 0 {
            let source = io::Error::last_os_error();
            if source.raw_os_error() == Some(libc::EAGAIN) {
                return Ok(None);
            }
            return Err(Error::QueueReceive {
                name: self.name.clone(),
                source,
            });
        }
        Ok(Some(n as usize))
    }
}

impl Drop for PosixQueue {
    fn drop(&mut self) {
        if unsafe { libc::mq_close(self.mqd) } == -1 {
            debug!(
                queue = %self.name,
                error = %io::Error::last_os_error(),
                "failed to close message queue handle"
            );
        }
    }
}

fn queue_name(name: &str) -> Result<CString> {
    if !name.starts_with('/') {
        return Err(Error::QueueOpen {
            name: name.to_string(),
            source: io::Error::new(
                io::ErrorKind::InvalidInput,
                "queue name must start with '/'",
            ),
        });
    }
    CString::new(name).map_err(|_| Error::QueueOpen {
        name: name.to_string(),
        source: io::Error::new(io::ErrorKind::InvalidInput, "queue name contains NUL"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_relative_names() {
        let err = PosixQueue::open("no-slash", AccessMode::ReadOnly).unwrap_err();
        assert!(matches!(err, Error::QueueOpen { .. }));
    }

    #[test]
    fn access_modes_are_nonblocking() {
        assert_ne!(AccessMode::ReadOnly.oflag() & libc::O_NONBLOCK, 0);
        assert_ne!(AccessMode::ReadWrite.oflag() & libc::O_NONBLOCK, 0);
    }
}
