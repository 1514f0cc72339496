//! Event loop.
//!
//! One steady state: suspended in [`WakeSource::wait`]. On wake, run the
//! matching pipeline with the wake signals still blocked, then suspend
//! again. Receive failures are logged and survived. A transmit drain
//! runs to exhaustion and is always followed by re-arming the outbound
//! wakeup; since the queue notification is single-shot, skipping the
//! re-arm on any path (the error exit included) would silently deafen
//! the daemon to every later enqueue, so a re-arm failure is fatal.

use tracing::{debug, error, info, warn};

use mculink_core::error::Result;
use mculink_core::types::{ReceiveOutcome, TransmitOutcome, WakeReason};

/// Source of wake-ups. Production: blocked signals accepted
/// synchronously ([`crate::SignalWake`]); tests: a scripted sequence.
pub trait WakeSource {
    /// Suspend until a wake reason is available.
    fn wait(&mut self) -> Result<WakeReason>;
}

/// The two pipelines plus the wakeup re-arm, as seen by the loop.
pub trait BridgePipelines {
    /// One receive cycle: drain the link, publish to the RX queue.
    fn receive_cycle(&mut self) -> Result<ReceiveOutcome>;

    /// One transmit iteration: move at most one message to the link.
    fn transmit_cycle(&mut self) -> Result<TransmitOutcome>;

    /// Re-register the single-shot "outbound posted" notification.
    fn rearm_outbound_wakeup(&mut self) -> Result<()>;
}

/// Drives the pipelines from the wake source.
#[derive(Debug)]
pub struct Dispatcher<W, B> {
    wake: W,
    bridge: B,
}

impl<W: WakeSource, B: BridgePipelines> Dispatcher<W, B> {
    pub fn new(wake: W, bridge: B) -> Self {
        Self { wake, bridge }
    }

    /// Loop until shutdown is requested or an unrecoverable error occurs.
    ///
    /// The only errors that escape are from the wake source itself and
    /// from a failed re-arm; pipeline errors are contained here.
    pub fn run(&mut self) -> Result<()> {
        info!("initialization complete, waiting for messages");
        loop {
            match self.wake.wait()? {
                WakeReason::LinkReadable => self.receive_once(),
                WakeReason::OutboundPosted => self.drain_outbound()?,
                WakeReason::Shutdown => {
                    info!("shutdown requested");
                    return Ok(());
                }
            }
        }
    }

    /// Give back the bridge for shutdown cleanup.
    pub fn into_bridge(self) -> B {
        self.bridge
    }

    fn receive_once(&mut self) {
        match self.bridge.receive_cycle() {
            Ok(ReceiveOutcome::Idle) => debug!("receive cycle found no data"),
            Ok(ReceiveOutcome::Published { bytes }) => {
                debug!(bytes, "receive cycle published one message");
            }
            // Abandon the cycle; the loop goes back to suspension.
            Err(e) => warn!(error = %e, "receive pipeline failed"),
        }
    }

    /// Drain the TX queue to exhaustion, then re-arm the wakeup.
    ///
    /// "Queue empty" is the nominal end of a drain. A hard error also
    /// ends it and is logged, but only the re-arm decides whether the
    /// daemon can keep running.
    fn drain_outbound(&mut self) -> Result<()> {
        let mut sent = 0usize;
        loop {
            match self.bridge.transmit_cycle() {
                Ok(TransmitOutcome::Sent { bytes }) => {
                    sent += 1;
                    debug!(bytes, "transmitted outbound message");
                }
                Ok(TransmitOutcome::Empty) => break,
                Err(e) => {
                    warn!(error = %e, sent, "transmit drain ended on error");
                    break;
                }
            }
        }
        debug!(sent, "transmit drain complete");

        // Re-arm on every exit path. Without it the next enqueue never
        // wakes the loop, so failure here means the process must exit.
        self.bridge.rearm_outbound_wakeup().inspect_err(|e| {
            error!(error = %e, "failed to re-arm outbound wakeup");
        })
    }
}
