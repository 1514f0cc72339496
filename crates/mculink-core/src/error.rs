//! Error taxonomy for the serial bridge.
//!
//! Setup-class errors (link configuration, IPC creation, signal plumbing)
//! are fatal: the daemon logs them, runs best-effort cleanup, and exits
//! with a status distinct per failure class. Pipeline-class errors are
//! recovered locally: the current cycle is abandoned and the event loop
//! returns to suspension.

use thiserror::Error;

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // Serial link setup
    #[error("failed to open serial device {path}: {source}")]
    LinkOpen {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to read line configuration: {0}")]
    ConfigRead(std::io::Error),

    #[error("unsupported baud rate: {0}")]
    BaudRate(u32),

    #[error("failed to apply line configuration: {0}")]
    ConfigWrite(std::io::Error),

    #[error("failed to claim descriptor ownership: {0}")]
    Ownership(std::io::Error),

    #[error("failed to enable asynchronous I/O mode: {0}")]
    AsyncMode(std::io::Error),

    // IPC lifecycle
    #[error("failed to create discovery semaphore {name}: {source}")]
    DiscoveryInit {
        name: String,
        source: std::io::Error,
    },

    #[error("failed to open message queue {name}: {source}")]
    QueueOpen {
        name: String,
        source: std::io::Error,
    },

    #[error("failed to query attributes of queue {name}: {source}")]
    QueueAttributes {
        name: String,
        source: std::io::Error,
    },

    #[error("message queue {name} is full")]
    QueueFull { name: String },

    #[error("failed to publish to queue {name} after clearing space")]
    PublishFailed { name: String },

    #[error("failed to receive from queue {name}: {source}")]
    QueueReceive {
        name: String,
        source: std::io::Error,
    },

    #[error("failed to send to queue {name}: {source}")]
    QueueSend {
        name: String,
        source: std::io::Error,
    },

    #[error("failed to register outbound wakeup notification: {0}")]
    NotifyRegister(std::io::Error),

    // Signal plumbing
    #[error("failed to configure signal delivery: {0}")]
    SignalSetup(std::io::Error),

    #[error("failed waiting for notification: {0}")]
    SignalWait(std::io::Error),

    // Transmit pipeline
    #[error("invalid frame header: {0}")]
    Decode(String),

    #[error("wrote zero bytes to the serial link")]
    ZeroByteWrite,

    #[error("failed to write to the serial link: {0}")]
    LinkWrite(std::io::Error),

    // Process lifecycle
    #[error("failed to daemonize: {0}")]
    Daemonize(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Process exit status for this error.
    ///
    /// Setup failures get a distinct code per class so an init system can
    /// tell a bad device path from a missing mqueue facility. Everything
    /// else collapses to 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::LinkOpen { .. } => 10,
            Error::ConfigRead(_) => 11,
            Error::BaudRate(_) => 12,
            Error::ConfigWrite(_) => 13,
            Error::Ownership(_) => 14,
            Error::AsyncMode(_) => 15,
            Error::DiscoveryInit { .. } => 20,
            Error::QueueOpen { .. } => 21,
            Error::NotifyRegister(_) => 22,
            Error::SignalSetup(_) => 23,
            Error::SignalWait(_) => 24,
            Error::Daemonize(_) => 25,
            _ => 1,
        }
    }

    /// Whether publishing this message failed because the queue was full.
    pub fn is_queue_full(&self) -> bool {
        matches!(self, Error::QueueFull { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_classes_have_distinct_exit_codes() {
        let errors = [
            Error::LinkOpen {
                path: "/dev/null".into(),
                source: std::io::Error::from_raw_os_error(libc_enoent()),
            },
            Error::ConfigRead(std::io::Error::from_raw_os_error(libc_enoent())),
            Error::BaudRate(1200),
            Error::ConfigWrite(std::io::Error::from_raw_os_error(libc_enoent())),
            Error::Ownership(std::io::Error::from_raw_os_error(libc_enoent())),
            Error::AsyncMode(std::io::Error::from_raw_os_error(libc_enoent())),
            Error::DiscoveryInit {
                name: "/sem".into(),
                source: std::io::Error::from_raw_os_error(libc_enoent()),
            },
            Error::QueueOpen {
                name: "/q".into(),
                source: std::io::Error::from_raw_os_error(libc_enoent()),
            },
            Error::NotifyRegister(std::io::Error::from_raw_os_error(libc_enoent())),
            Error::SignalSetup(std::io::Error::from_raw_os_error(libc_enoent())),
        ];

        let mut codes: Vec<i32> = errors.iter().map(Error::exit_code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn pipeline_errors_share_the_generic_code() {
        assert_eq!(Error::ZeroByteWrite.exit_code(), 1);
        assert_eq!(
            Error::PublishFailed { name: "/q".into() }.exit_code(),
            1
        );
    }

    #[test]
    fn queue_full_is_detectable() {
        assert!(Error::QueueFull { name: "/q".into() }.is_queue_full());
        assert!(!Error::ZeroByteWrite.is_queue_full());
    }

    fn libc_enoent() -> i32 {
        2
    }
}
