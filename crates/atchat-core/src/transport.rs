//! Transport trait for modem communication.
//!
//! The [`Transport`] trait abstracts over the physical link to a modem.
//! Implementations exist for serial ports (USB modems, UART-attached
//! baseband processors), TCP sockets (ser2net, networked modems), and mock
//! transports for testing.
//!
//! The chat engine in `atchat-engine` operates on a `Transport` rather than
//! directly on a serial port, enabling both real hardware control and
//! deterministic unit testing with `MockTransport` from the
//! `atchat-test-harness` crate. Suspend/resume hands the boxed transport
//! back and forth across this seam, so that a PPP stack can take over the
//! very same link the chat engine was using.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Asynchronous byte-level transport to a modem.
///
/// Implementations handle buffering and error mapping at the physical
/// layer. Line framing, final-response classification, and command
/// sequencing are handled by the chat engine that consumes this trait.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send raw bytes to the modem.
    ///
    /// Implementations should block until all bytes have been written to
    /// the underlying transport (serial TX buffer, TCP socket, etc.).
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive bytes from the modem into the provided buffer.
    ///
    /// Returns the number of bytes actually read. Will wait up to `timeout`
    /// for data to arrive; returns [`Error::Timeout`](crate::error::Error::Timeout)
    /// if no data is received within the deadline, and
    /// [`Error::ConnectionLost`](crate::error::Error::ConnectionLost) when
    /// the peer has gone away.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Close the transport connection.
    ///
    /// After calling `close()`, subsequent `send()` and `receive()` calls
    /// should return [`Error::NotConnected`](crate::error::Error::NotConnected).
    async fn close(&mut self) -> Result<()>;

    /// Check whether the transport is currently connected.
    fn is_connected(&self) -> bool;
}
