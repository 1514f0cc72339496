//! POSIX IPC layer for the mculink serial bridge.
//!
//! Two primitives connect the daemon to its peers on the host:
//!
//! - A pair of named, bounded message queues ([`PosixQueue`]): peers push
//!   outbound frames onto the TX queue, the daemon publishes drained
//!   serial data onto the RX queue. Message boundaries are preserved by
//!   the queue itself.
//! - A named discovery semaphore ([`DiscoverySemaphore`]) whose value is
//!   the daemon's pid, so a peer that has just enqueued a frame knows
//!   which process to signal.
//!
//! The pipelines in the daemon crate consume queues through the
//! [`BridgeQueue`] trait, which lets tests substitute in-memory fakes for
//! the kernel-backed handles.
//!
//! All handles release their kernel object on drop; `unlink` removes the
//! name itself and is the daemon's shutdown responsibility.

pub mod queue;
pub mod semaphore;

pub use queue::{AccessMode, BridgeQueue, PosixQueue};
pub use semaphore::DiscoverySemaphore;
