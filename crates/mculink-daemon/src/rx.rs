//! Receive pipeline: serial link -> RX queue.
//!
//! One cycle drains whatever the link has buffered into a bounded
//! accumulator, then publishes the whole batch as a single queue message
//! so consumers see one message per readable window. If the queue is
//! full, exactly one oldest message is discarded and the publish retried
//! exactly once; a second failure drops the batch (at-most-once
//! delivery, no durability).

use std::io::Read;

use tracing::{debug, trace, warn};

use mculink_core::constants::{MAX_READ_BYTES, RX_ACCUMULATOR_BYTES};
use mculink_core::error::{Error, Result};
use mculink_core::types::ReceiveOutcome;
use mculink_ipc::BridgeQueue;

/// Run one receive cycle.
///
/// The queue handle is only materialized when there is something to
/// publish, lives for the duration of the publish attempt, and is closed
/// on every exit path when it drops.
pub fn run<R, Q, F>(link: &mut R, open_queue: F) -> Result<ReceiveOutcome>
where
    R: Read,
    Q: BridgeQueue,
    F: FnOnce() -> Result<Q>,
{
    let batch = drain(link);
    if batch.is_empty() {
        trace!("readable wake-up with no data");
        return Ok(ReceiveOutcome::Idle);
    }

    let mut queue = open_queue()?;
    publish(&mut queue, &batch)?;
    debug!(bytes = batch.len(), queue = queue.name(), "published receive batch");
    Ok(ReceiveOutcome::Published { bytes: batch.len() })
}

/// Drain the link until it reports no more data.
///
/// Reads up to [`MAX_READ_BYTES`] at a time into the accumulator. A zero
/// byte read and a read error both end the drain; for control flow they
/// are the same thing, only the accumulated byte count differs. The
/// accumulator never grows past [`RX_ACCUMULATOR_BYTES`]; a device
/// flooding more than that in one window has the remainder picked up by
/// the next readiness wake-up.
pub fn drain<R: Read>(link: &mut R) -> Vec<u8> {
    let mut batch = Vec::with_capacity(RX_ACCUMULATOR_BYTES);
    let mut chunk = [0u8; MAX_READ_BYTES];

    loop {
        let remaining = RX_ACCUMULATOR_BYTES - batch.len();
        if remaining == 0 {
            break;
        }
        let want = remaining.min(MAX_READ_BYTES);
        match link.read(&mut chunk[..want]) {
            Ok(0) => break,
            Ok(n) => batch.extend_from_slice(&chunk[..n]),
            Err(e) => {
                // WouldBlock is the normal end of a drain on a
                // non-blocking descriptor; anything else also ends it.
                if e.kind() != std::io::ErrorKind::WouldBlock {
                    trace!(error = %e, "link read ended drain");
                }
                break;
            }
        }
    }

    batch
}

/// Publish one batch, with the single-eviction recovery policy.
///
/// On a full queue: discard one oldest message, retry once. The retry's
/// failure, whatever its cause, is reported as [`Error::PublishFailed`]
/// and the batch is gone. A first failure that is not "queue full"
/// propagates as is.
pub fn publish(queue: &mut dyn BridgeQueue, batch: &[u8]) -> Result<()> {
    match queue.send(batch, 0) {
        Ok(()) => Ok(()),
        Err(first) if first.is_queue_full() => {
            warn!(queue = queue.name(), "RX queue full, discarding oldest message");
            queue.discard_oldest()?;
            queue.send(batch, 0).map_err(|_| Error::PublishFailed {
                name: queue.name().to_string(),
            })
        }
        Err(other) => Err(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io::{self, Cursor};

    use mculink_core::types::QueueAttributes;

    /// Reader that hands out scripted chunks, then WouldBlock forever.
    struct ChunkReader {
        chunks: VecDeque<Vec<u8>>,
    }

    impl ChunkReader {
        fn new(chunks: &[&[u8]]) -> Self {
            Self {
                chunks: chunks.iter().map(|c| c.to_vec()).collect(),
            }
        }
    }

    impl Read for ChunkReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.chunks.pop_front() {
                Some(chunk) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    if n < chunk.len() {
                        let rest = chunk[n..].to_vec();
                        self.chunks.push_front(rest);
                    }
                    Ok(n)
                }
                None => Err(io::ErrorKind::WouldBlock.into()),
            }
        }
    }

    /// In-memory queue with the same full/empty semantics as the kernel
    /// object, plus a switch to make every send fail.
    pub(crate) struct FakeQueue {
        pub messages: VecDeque<Vec<u8>>,
        pub capacity: usize,
        pub jammed: bool,
    }

    impl FakeQueue {
        pub fn with_capacity(capacity: usize) -> Self {
            Self {
                messages: VecDeque::new(),
                capacity,
                jammed: false,
            }
        }
    }

    impl BridgeQueue for FakeQueue {
        fn name(&self) -> &str {
            "/fake"
        }

        fn attributes(&self) -> Result<QueueAttributes> {
            Ok(QueueAttributes {
                capacity: self.capacity as i64,
                message_size: 1024,
                queued: self.messages.len() as i64,
            })
        }

        fn send(&mut self, payload: &[u8], _priority: u32) -> Result<()> {
            if self.jammed || self.messages.len() >= self.capacity {
                return Err(Error::QueueFull {
                    name: self.name().to_string(),
                });
            }
            self.messages.push_back(payload.to_vec());
            Ok(())
        }

        fn receive(&mut self, buf: &mut [u8]) -> Result<Option<usize>> {
            match self.messages.pop_front() {
                Some(msg) => {
                    buf[..msg.len()].copy_from_slice(&msg);
                    Ok(Some(msg.len()))
                }
                None => Ok(None),
            }
        }
    }

    #[test]
    fn drain_accumulates_one_window_in_order() {
        let mut link = ChunkReader::new(&[b"AB", b"12", b"\n"]);
        assert_eq!(drain(&mut link), b"AB12\n");
    }

    #[test]
    fn drain_stops_at_accumulator_bound() {
        let big = vec![0x55u8; 4096];
        let mut link = Cursor::new(big);
        let batch = drain(&mut link);
        assert_eq!(batch.len(), RX_ACCUMULATOR_BYTES);
        assert!(batch.iter().all(|&b| b == 0x55));
    }

    #[test]
    fn drain_treats_eof_and_would_block_alike() {
        // Cursor yields Ok(0) at the end, ChunkReader yields WouldBlock;
        // both must terminate with the same accumulated bytes.
        let mut eof = Cursor::new(b"xyz".to_vec());
        let mut blocking = ChunkReader::new(&[b"xyz"]);
        assert_eq!(drain(&mut eof), drain(&mut blocking));
    }

    #[test]
    fn empty_window_is_idle_and_never_opens_the_queue() {
        let mut link = ChunkReader::new(&[]);
        let outcome = run::<_, FakeQueue, _>(&mut link, || {
            panic!("queue must not be opened for an empty drain")
        });
        assert_eq!(outcome.unwrap(), ReceiveOutcome::Idle);
    }

    #[test]
    fn one_window_becomes_one_message() {
        let mut link = ChunkReader::new(&[b"AB12\n"]);
        let outcome = run(&mut link, || Ok(FakeQueue::with_capacity(8))).unwrap();
        assert_eq!(outcome, ReceiveOutcome::Published { bytes: 5 });
    }

    #[test]
    fn full_queue_evicts_exactly_one_and_retries_once() {
        let mut queue = FakeQueue::with_capacity(3);
        for i in 0..3 {
            queue.send(format!("old-{i}").as_bytes(), 0).unwrap();
        }

        publish(&mut queue, b"new").unwrap();

        assert_eq!(queue.messages.len(), 3);
        assert_eq!(queue.messages[0], b"old-1");
        assert_eq!(queue.messages[2], b"new");
    }

    #[test]
    fn second_failure_is_publish_failed_and_count_does_not_increase() {
        let mut queue = FakeQueue::with_capacity(3);
        for i in 0..3 {
            queue.send(format!("old-{i}").as_bytes(), 0).unwrap();
        }
        queue.jammed = true;

        let err = publish(&mut queue, b"new").unwrap_err();
        assert!(matches!(err, Error::PublishFailed { .. }));
        // One eviction happened, the retry failed, nothing was added.
        assert_eq!(queue.messages.len(), 2);
        assert!(queue.messages.iter().all(|m| m != b"new"));
    }
}
