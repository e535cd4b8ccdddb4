//! Error types for atem-io
//!
//! # Error Recovery Strategies
//!
//! Different error types require different recovery approaches:
//!
//! ## Transport Errors
//!
//! - **`Io`**: Socket error while opening, reading, or writing the UDP
//!   endpoint. Open failures are retried internally (3 s delay) up to the
//!   configured attempt limit; mid-session failures close the session and
//!   emit a `Closed` event, after which the application may reconnect.
//!
//! ## Protocol Errors (Log and Continue)
//!
//! Malformed datagrams and malformed command records never surface here.
//! The session layer drops them with a debug log and keeps the connection
//! alive: a datagram shorter than its header, a record whose declared
//! length disagrees with the remaining payload, or a bus/keyer/aux index
//! outside the topology-derived bounds all degrade to a dropped record,
//! never a closed session.
//!
//! ## API Misuse
//!
//! - **`NotConnected`**: A control command was issued before the handshake
//!   completed. The command is dropped; callers that care can wait for the
//!   `Connected` event first.
//!
//! ## Fatal Errors (Require Restart)
//!
//! - **`ThreadPanic`**: A worker thread panicked. The client must be
//!   recreated.
//! - **`MutexPoisoned`**: The shared state mutex was poisoned by a
//!   panicking thread. Recreate the client.
//!
//! ## Configuration Errors (Fix and Restart)
//!
//! - **`Config`**: Configuration file or options are invalid.

use thiserror::Error;

/// Errors that can occur in atem-io
///
/// See module-level documentation for recovery strategies.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Thread panic")]
    ThreadPanic,

    #[error("Mutex poisoned")]
    MutexPoisoned,
}

pub type Result<T> = std::result::Result<T, Error>;
