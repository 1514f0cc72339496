//! Wires the concrete pieces into the [`BridgePipelines`] the dispatcher
//! drives: the serial link on one side, the two named queues on the
//! other, and the single-shot wakeup registration in between.

use tracing::{debug, warn};

use mculink_core::codec::HexHeaderCodec;
use mculink_core::constants::{RX_QUEUE_NAME, TX_QUEUE_NAME};
use mculink_core::error::Result;
use mculink_core::types::{ReceiveOutcome, TransmitOutcome};
use mculink_ipc::{AccessMode, PosixQueue};

use crate::dispatcher::BridgePipelines;
use crate::link::SerialLink;
use crate::{rx, tx};

/// The daemon's half of the bridge.
///
/// Holds the serial link for the whole run, plus one long-lived read
/// handle on the TX queue. That handle exists for `mq_notify`: the
/// registration is tied to a descriptor, so it must outlive the drain
/// cycles it wakes. The pipelines themselves open their own scoped
/// handles per cycle and close them on every exit path.
pub struct SerialBridge {
    link: SerialLink,
    codec: HexHeaderCodec,
    notify_queue: PosixQueue,
    wake_signal: libc::c_int,
}

impl SerialBridge {
    /// Materialize both queues and arm the first outbound wakeup.
    ///
    /// Creating the queues up front means a peer can enqueue before the
    /// first drain; the initial registration covers messages posted
    /// between daemon start and the first suspension.
    pub fn new(link: SerialLink, wake_signal: libc::c_int) -> Result<Self> {
        // Ensure the RX queue exists before the first readable window;
        // the handle itself is per-cycle.
        drop(PosixQueue::open_or_create(
            RX_QUEUE_NAME,
            AccessMode::ReadWrite,
        )?);

        let notify_queue = PosixQueue::open_or_create(TX_QUEUE_NAME, AccessMode::ReadOnly)?;
        notify_queue.register_wakeup(wake_signal)?;
        debug!(
            tx = TX_QUEUE_NAME,
            rx = RX_QUEUE_NAME,
            "bridge queues ready, outbound wakeup armed"
        );

        Ok(Self {
            link,
            codec: HexHeaderCodec,
            notify_queue,
            wake_signal,
        })
    }

    /// Hand the link back for shutdown restoration.
    pub fn into_link(self) -> SerialLink {
        self.link
    }
}

impl BridgePipelines for SerialBridge {
    fn receive_cycle(&mut self) -> Result<ReceiveOutcome> {
        rx::run(&mut self.link, || {
            PosixQueue::open_or_create(RX_QUEUE_NAME, AccessMode::ReadWrite)
        })
    }

    fn transmit_cycle(&mut self) -> Result<TransmitOutcome> {
        tx::run(&mut self.link, &self.codec, || {
            PosixQueue::open_or_create(TX_QUEUE_NAME, AccessMode::ReadOnly)
        })
    }

    fn rearm_outbound_wakeup(&mut self) -> Result<()> {
        self.notify_queue
            .register_wakeup(self.wake_signal)
            .inspect_err(|e| {
                warn!(queue = TX_QUEUE_NAME, error = %e, "wakeup registration failed");
            })
    }
}
