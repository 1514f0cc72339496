//! Wake reasons, pipeline outcomes, and queue attribute snapshots.

/// Why the event loop woke up.
///
/// Replaces the original pair of handler-set flags: the notification
/// bridge converts each kernel event into exactly one of these values,
/// consumed synchronously by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
    /// The serial link has input available.
    LinkReadable,

    /// A producer enqueued a message on the outbound queue.
    OutboundPosted,

    /// Orderly termination was requested.
    Shutdown,
}

/// Result of one receive cycle (serial link -> RX queue).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// The link had no data after all; nothing was published.
    Idle,

    /// One message of `bytes` drained bytes was published.
    Published { bytes: usize },
}

/// Result of one transmit iteration (TX queue -> serial link).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmitOutcome {
    /// One message was decoded and written; `bytes` went to the link.
    Sent { bytes: usize },

    /// The queue had no message. Ends the dispatcher's drain loop; not an
    /// error.
    Empty,
}

/// Capacity/occupancy snapshot of a named queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueAttributes {
    /// Maximum number of messages the queue can hold.
    pub capacity: i64,

    /// Maximum size of a single message, in bytes.
    pub message_size: i64,

    /// Messages currently queued.
    pub queued: i64,
}

impl QueueAttributes {
    /// Whether the queue cannot accept another message right now.
    pub fn is_full(&self) -> bool {
        self.queued >= self.capacity
    }
}
