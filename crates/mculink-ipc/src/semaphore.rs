//! Discovery semaphore.
//!
//! The daemon has no socket and no control file; the one thing a peer
//! needs is its pid, to aim the "outbound message posted" signal at the
//! right process. A named semaphore created with its initial value set to
//! the pid publishes exactly that. The value is written once at startup
//! and never touched again, so concurrent readers always see the same
//! number.

use std::ffi::CString;
use std::io;

use tracing::{debug, info};

use mculink_core::error::{Error, Result};

/// Handle on the named semaphore advertising the daemon's pid.
#[derive(Debug)]
pub struct DiscoverySemaphore {
    sem: *mut libc::sem_t,
    name: String,
}

// The handle is only ever used from the single event-loop thread, but the
// raw pointer would otherwise poison auto traits for structs holding it.
unsafe impl Send for DiscoverySemaphore {}

impl DiscoverySemaphore {
    /// Create (or re-open) the semaphore with this process's pid as its
    /// value.
    ///
    /// Mode 0666 so any local user can read it. Failure is fatal for the
    /// daemon: without the published pid no peer can ever wake it.
    pub fn publish(name: &str) -> Result<Self> {
        let c_name = sem_name(name)?;
        let perms: libc::c_uint = 0o666;
        let pid = std::process::id();
        let sem = unsafe { libc::sem_open(c_name.as_ptr(), libc::O_CREAT, perms, pid) };
        if sem == libc::SEM_FAILED {
            return Err(Error::DiscoveryInit {
                name: name.to_string(),
                source: io::Error::last_os_error(),
            });
        }
        info!(semaphore = name, pid, "published daemon pid");
        Ok(Self {
            sem,
            name: name.to_string(),
        })
    }

    /// Current value, i.e. the pid a peer would read.
    pub fn value(&self) -> Result<i32> {
        let mut value: libc::c_int = 0;
        if unsafe { libc::sem_getvalue(self.sem, &mut value) } == -1 {
            return Err(Error::DiscoveryInit {
                name: self.name.clone(),
                source: io::Error::last_os_error(),
            });
        }
        Ok(value)
    }

    /// Remove the semaphore name from the system.
    ///
    /// Done at shutdown so a stale pid is never advertised.
    pub fn unlink(name: &str) -> Result<()> {
        let c_name = sem_name(name)?;
        if unsafe { libc::sem_unlink(c_name.as_ptr()) } == -1 {
            return Err(Error::DiscoveryInit {
                name: name.to_string(),
                source: io::Error::last_os_error(),
            });
        }
        debug!(semaphore = name, "unlinked discovery semaphore");
        Ok(())
    }
}

impl Drop for DiscoverySemaphore {
    fn drop(&mut self) {
        if unsafe { libc::sem_close(self.sem) } == -1 {
            debug!(
                semaphore = %self.name,
                error = %io::Error::last_os_error(),
                "failed to close discovery semaphore"
            );
        }
    }
}

fn sem_name(name: &str) -> Result<CString> {
    if !name.starts_with('/') {
        return Err(Error::DiscoveryInit {
            name: name.to_string(),
            source: io::Error::new(
                io::ErrorKind::InvalidInput,
                "semaphore name must start with '/'",
            ),
        });
    }
    CString::new(name).map_err(|_| Error::DiscoveryInit {
        name: name.to_string(),
        source: io::Error::new(io::ErrorKind::InvalidInput, "semaphore name contains NUL"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_relative_names() {
        let err = DiscoverySemaphore::publish("no-slash").unwrap_err();
        assert!(matches!(err, Error::DiscoveryInit { .. }));
    }
}
