//! Fixed configuration for the serial bridge.
//!
//! The IPC names are part of the daemon's external interface: peer
//! processes open the queues and the discovery semaphore by these names.
//! Changing them breaks every client on the host, so they are constants
//! rather than flags.

// ============================================================================
// Well-known IPC names
// ============================================================================

/// Name of the outbound queue (application -> daemon -> serial link).
pub const TX_QUEUE_NAME: &str = "/mculink-tx";

/// Name of the inbound queue (serial link -> daemon -> application).
pub const RX_QUEUE_NAME: &str = "/mculink-rx";

/// Name of the discovery semaphore.
///
/// Its value is the daemon's pid for the whole of its lifetime; a peer
/// reads it to know which process to signal after enqueueing a message.
pub const DISCOVERY_SEM_NAME: &str = "/mculink-daemon";

// ============================================================================
// Queue geometry
// ============================================================================

/// Messages either queue can hold before a send reports "full".
pub const QUEUE_DEPTH: i64 = 10;

/// Maximum size of a single queue message, in bytes.
///
/// Must be at least [`RX_ACCUMULATOR_BYTES`] so a full receive cycle fits
/// in one message.
pub const QUEUE_MESSAGE_BYTES: i64 = 1024;

// ============================================================================
// Serial link
// ============================================================================

/// Default serial device path.
pub const DEFAULT_DEVICE: &str = "/dev/ttyUSB0";

/// Default line speed. Must be one of the supported rates.
pub const DEFAULT_BAUD: u32 = 9600;

/// Line speeds the link manager accepts.
pub const SUPPORTED_BAUD_RATES: [u32; 4] = [300, 2400, 9600, 38400];

/// Bytes requested per non-blocking read while draining the link.
pub const MAX_READ_BYTES: usize = 255;

/// Upper bound on bytes accumulated in one receive cycle.
pub const RX_ACCUMULATOR_BYTES: usize = 1020;

// ============================================================================
// Frame geometry
// ============================================================================

/// Width of the length header at the front of an outbound frame.
pub const FRAME_HEADER_BYTES: usize = 4;

/// Trailing terminator accounted for in the wire byte count.
pub const FRAME_TERMINATOR_BYTES: usize = 1;

/// Largest declared payload length whose wire form still fits in one
/// queue message: `2 * L + header + terminator <= QUEUE_MESSAGE_BYTES`.
pub const MAX_DECLARED_LENGTH: usize =
    (QUEUE_MESSAGE_BYTES as usize - FRAME_HEADER_BYTES - FRAME_TERMINATOR_BYTES) / 2;
