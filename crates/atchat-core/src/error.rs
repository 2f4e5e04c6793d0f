//! Error types for atchat.
//!
//! All fallible operations across the library return [`Result<T>`], which
//! uses [`Error`] as the error type. Transport-layer, framing-layer, and
//! engine-layer failures are all captured here.
//!
//! Note that a modem answering a command with `ERROR` or `+CME ERROR: 30`
//! is *not* an [`Error`]: failed final responses are delivered as ordinary
//! response values so callers can inspect the failure class and code.

/// The error type for all atchat operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (serial port, TCP socket).
    #[error("transport error: {0}")]
    Transport(String),

    /// A framing-level error that prevented further progress on the wire.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Timed out waiting for a final response from the modem.
    ///
    /// This typically indicates the modem is powered off, stuck in a data
    /// session, or the serial settings are wrong.
    #[error("timeout waiting for response")]
    Timeout,

    /// An invalid parameter was passed to the engine.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The engine task is not running (never started or shut down).
    #[error("not connected")]
    NotConnected,

    /// The connection to the modem was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// The command was cancelled before a final response was delivered.
    ///
    /// Delivered both for explicit cancel calls and for in-flight
    /// commands abandoned by a suspend.
    #[error("command cancelled")]
    Cancelled,

    /// The engine is suspended and cannot accept this operation.
    #[error("engine suspended")]
    Suspended,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;
