//! Shared types for the mculink serial bridge daemon.
//!
//! This crate holds everything the daemon and its IPC layer agree on:
//! the fixed IPC names and buffer bounds ([`constants`]), the error
//! taxonomy with per-class exit codes ([`error`]), the wake-reason and
//! pipeline-outcome enums ([`types`]), and the packet-codec boundary
//! ([`codec`]) through which outbound queue messages declare their
//! payload length.

pub mod codec;
pub mod constants;
pub mod error;
pub mod types;

pub use codec::{HexHeaderCodec, PacketCodec, wire_length};
pub use error::{Error, Result};
pub use types::{QueueAttributes, ReceiveOutcome, TransmitOutcome, WakeReason};

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
