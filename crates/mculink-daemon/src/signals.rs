//! Notification bridge.
//!
//! Converts the two kernel event sources into [`WakeReason`] values:
//!
//! - `SIGRTMIN+1`, requested via `F_SETSIG` on the link descriptor,
//!   queued whenever the serial link becomes readable. Real-time
//!   delivery carries a reason code; only `POLL_IN` means input.
//! - `SIGUSR1`, delivered by the single-shot `mq_notify` registration
//!   when a producer enqueues an outbound message, or sent directly by a
//!   peer that read the daemon's pid from the discovery semaphore.
//!
//! There are no async signal handlers and no handler-set flags. All four
//! signals of interest (the two above plus SIGTERM/SIGINT for orderly
//! shutdown) are blocked for the life of the process and accepted
//! synchronously with `sigwaitinfo`, which hands back the pending signal
//! together with its reason code on the event loop's own stack. While a
//! pipeline runs the signals simply stay queued; nothing can re-enter.

use std::io;
use std::mem;
use std::ptr;

use tracing::{debug, trace};

use mculink_core::error::{Error, Result};
use mculink_core::types::WakeReason;

use crate::dispatcher::WakeSource;

/// Real-time signal announcing "link is readable".
///
/// Not a constant: `SIGRTMIN` is resolved at runtime on Linux.
pub fn link_readable_signal() -> libc::c_int {
    libc::SIGRTMIN() + 1
}

/// Ordinary signal announcing "an outbound message was enqueued".
pub const OUTBOUND_POSTED_SIGNAL: libc::c_int = libc::SIGUSR1;

// `si_code` values the kernel attaches to an F_SETSIG-routed readiness
// signal (asm-generic/siginfo.h). The libc crate only binds the poll(2)
// bitmask flavors of these names.
const POLL_IN: libc::c_int = 1;
const POLL_OUT: libc::c_int = 2;
const POLL_HUP: libc::c_int = 6;

/// Blocks the wake signals and hands them out as [`WakeReason`]s.
pub struct SignalWake {
    set: libc::sigset_t,
}

impl SignalWake {
    /// Block the wake signals on this thread.
    ///
    /// Must run before the link's readiness signalling or the queue
    /// notification is armed, so no delivery can slip through unblocked
    /// and kill the process with a default disposition.
    pub fn install() -> Result<Self> {
        let signals = [
            link_readable_signal(),
            OUTBOUND_POSTED_SIGNAL,
            libc::SIGTERM,
            libc::SIGINT,
        ];

        unsafe {
            let mut set: libc::sigset_t = mem::zeroed();
            if libc::sigemptyset(&mut set) == -1 {
                return Err(Error::SignalSetup(io::Error::last_os_error()));
            }
            for sig in signals {
                if libc::sigaddset(&mut set, sig) == -1 {
                    return Err(Error::SignalSetup(io::Error::last_os_error()));
                }
            }
            if libc::sigprocmask(libc::SIG_BLOCK, &set, ptr::null_mut()) == -1 {
                return Err(Error::SignalSetup(io::Error::last_os_error()));
            }
            debug!(?signals, "wake signals blocked for synchronous delivery");
            Ok(Self { set })
        }
    }
}

impl WakeSource for SignalWake {
    fn wait(&mut self) -> Result<WakeReason> {
        loop {
            let mut info: libc::siginfo_t = unsafe { mem::zeroed() };
            let sig = unsafe { libc::sigwaitinfo(&self.set, &mut info) };
            if sig == -1 {
                let err = io::Error::last_os_error();
                if err.raw_os_error() == Some(libc::EINTR) {
                    continue;
                }
                return Err(Error::SignalWait(err));
            }

            match map_signal(sig, info.si_code) {
                Some(reason) => return Ok(reason),
                None => {
                    trace!(signal = sig, si_code = info.si_code, "signal is not a wake");
                    continue;
                }
            }
        }
    }
}

/// Translate an accepted signal into a wake reason.
///
/// The real-time readiness signal carries the poll reason in its
/// `si_code`; anything other than "input available" (output-possible,
/// hangup) is not a receive wake-up and is dropped.
fn map_signal(sig: libc::c_int, si_code: libc::c_int) -> Option<WakeReason> {
    if sig == link_readable_signal() {
        return (si_code == POLL_IN).then_some(WakeReason::LinkReadable);
    }
    match sig {
        OUTBOUND_POSTED_SIGNAL => Some(WakeReason::OutboundPosted),
        libc::SIGTERM | libc::SIGINT => Some(WakeReason::Shutdown),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_readable_signal_is_a_real_time_signal() {
        let sig = link_readable_signal();
        assert!(sig >= libc::SIGRTMIN());
        assert!(sig <= libc::SIGRTMAX());
        assert_ne!(sig, OUTBOUND_POSTED_SIGNAL);
    }

    #[test]
    fn self_raised_signals_map_to_wake_reasons() {
        let mut wake = SignalWake::install().unwrap();

        // raise() targets the calling thread, where install() blocked
        // the signals, so sigwaitinfo below is guaranteed delivery.
        unsafe {
            libc::raise(OUTBOUND_POSTED_SIGNAL);
        }
        assert_eq!(wake.wait().unwrap(), WakeReason::OutboundPosted);

        unsafe {
            libc::raise(libc::SIGTERM);
        }
        assert_eq!(wake.wait().unwrap(), WakeReason::Shutdown);
    }

    #[test]
    fn rt_signal_maps_only_on_input_available() {
        let rt = link_readable_signal();
        assert_eq!(map_signal(rt, POLL_IN), Some(WakeReason::LinkReadable));
        // Output-possible, hangup, or a user-queued copy of the signal
        // must not trigger a receive cycle.
        assert_eq!(map_signal(rt, POLL_OUT), None);
        assert_eq!(map_signal(rt, POLL_HUP), None);
        assert_eq!(map_signal(rt, libc::SI_QUEUE), None);
    }

    #[test]
    fn readiness_reason_codes_match_the_siginfo_abi() {
        // Pinned to asm-generic/siginfo.h; a wrong value here would make
        // every readable wake-up look like a non-input event.
        assert_eq!(POLL_IN, 1);
        assert_eq!(POLL_OUT, 2);
        assert_eq!(POLL_HUP, 6);
    }

    #[test]
    fn threads_spawned_after_install_inherit_the_blocked_mask() {
        let _wake = SignalWake::install().unwrap();

        // The logging worker and any other late-spawned thread must not
        // be able to receive a process-directed wake signal.
        let inherited = std::thread::spawn(|| unsafe {
            let mut set: libc::sigset_t = mem::zeroed();
            libc::pthread_sigmask(libc::SIG_BLOCK, ptr::null(), &mut set);
            libc::sigismember(&set, OUTBOUND_POSTED_SIGNAL) == 1
                && libc::sigismember(&set, link_readable_signal()) == 1
                && libc::sigismember(&set, libc::SIGTERM) == 1
        })
        .join()
        .unwrap();
        assert!(inherited);
    }

    #[test]
    fn shutdown_and_outbound_signals_map_regardless_of_code() {
        assert_eq!(
            map_signal(OUTBOUND_POSTED_SIGNAL, libc::SI_QUEUE),
            Some(WakeReason::OutboundPosted)
        );
        assert_eq!(
            map_signal(libc::SIGTERM, libc::SI_USER),
            Some(WakeReason::Shutdown)
        );
        assert_eq!(
            map_signal(libc::SIGINT, libc::SI_USER),
            Some(WakeReason::Shutdown)
        );
        assert_eq!(map_signal(libc::SIGHUP, libc::SI_USER), None);
    }
}
