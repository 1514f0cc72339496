//! mculink daemon: bridges a microcontroller serial link with a pair of
//! named POSIX message queues.
//!
//! The process spends nearly all of its life suspended, waiting for one
//! of two kernel notifications, then runs exactly one bounded unit of
//! work and suspends again:
//!
//! ```text
//!            hardware                      peer processes
//!               │                                │
//!         SIGRTMIN+1 (POLL_IN)         mq_notify → SIGUSR1
//!               │                                │
//!               └──────► SignalWake ◄────────────┘
//!                            │ WakeReason
//!                            ▼
//!                       Dispatcher
//!                      ╱          ╲
//!             receive cycle    transmit drain + re-arm
//!                  │                    │
//!         serial ──► RX queue   TX queue ──► serial
//! ```
//!
//! Everything runs on one thread. The wake signals stay blocked while a
//! pipeline executes, so a second notification can never re-enter
//! pipeline code; it is consumed on the next suspension instead.

pub mod bridge;
pub mod dispatcher;
pub mod link;
pub mod rx;
pub mod signals;
pub mod tx;

pub use bridge::SerialBridge;
pub use dispatcher::{BridgePipelines, Dispatcher, WakeSource};
pub use link::SerialLink;
pub use signals::SignalWake;
