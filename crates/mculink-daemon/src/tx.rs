//! Transmit pipeline: TX queue -> serial link.
//!
//! One call moves at most one message. The dispatcher keeps calling
//! until [`TransmitOutcome::Empty`], which is the nominal end of a drain
//! and not an error; any hard error also ends the drain. The wire byte
//! count is derived from the codec's declared payload length, never from
//! the raw message size: `2 * L` expanded payload bytes plus the header
//! and one terminator.

use std::io::Write;

use tracing::{debug, trace};

use mculink_core::codec::{PacketCodec, wire_length};
use mculink_core::error::{Error, Result};
use mculink_core::types::TransmitOutcome;
use mculink_ipc::BridgeQueue;

/// Run one transmit iteration.
///
/// Opens a scoped queue handle (closed on every exit path), sizes the
/// receive buffer from the queue's own attributes, takes one message,
/// and writes its wire bytes to the link.
pub fn run<L, Q, C, F>(link: &mut L, codec: &C, open_queue: F) -> Result<TransmitOutcome>
where
    L: Write,
    Q: BridgeQueue,
    C: PacketCodec + ?Sized,
    F: FnOnce() -> Result<Q>,
{
    let mut queue = open_queue()?;

    let attrs = queue.attributes()?;
    let mut buf = vec![0u8; attrs.message_size as usize];

    let Some(len) = queue.receive(&mut buf)? else {
        trace!(queue = queue.name(), "TX queue empty");
        return Ok(TransmitOutcome::Empty);
    };
    let frame = &buf[..len];

    // Nothing is written on a decode failure.
    let declared = codec.declared_length(frame)?;
    let count = wire_length(declared);
    if count > frame.len() {
        return Err(Error::Decode(format!(
            "declared length {declared} needs {count} wire bytes but the frame has {}",
            frame.len()
        )));
    }

    let written = link.write(&frame[..count]).map_err(Error::LinkWrite)?;
    if written == 0 {
        return Err(Error::ZeroByteWrite);
    }

    debug!(
        queue = queue.name(),
        declared,
        wire = count,
        written,
        "transmitted one message"
    );
    Ok(TransmitOutcome::Sent { bytes: written })
}
