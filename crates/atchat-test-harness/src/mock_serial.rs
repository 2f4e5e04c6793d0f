//! Mock transport for deterministic testing of the chat engine.
//!
//! [`MockTransport`] implements the [`Transport`] trait with pre-loaded
//! request/response pairs, so command framing, response routing and
//! notification dispatch can be tested without a modem on a serial port.
//!
//! Because the engine takes ownership of its transport, the mock's state
//! lives behind a shared handle: an [`Injector`] obtained before the
//! move can push unsolicited bytes (`+CREG: 1,5` and friends) and
//! inspect the write log while the engine is running.
//!
//! # Example
//!
//! ```
//! use atchat_test_harness::MockTransport;
//!
//! let mut mock = MockTransport::new();
//! // When the engine writes this command, these bytes become readable.
//! mock.expect(b"AT+CREG?\r", b"\r\n+CREG: 0,1\r\n\r\nOK\r\n");
//! let injector = mock.injector();
//! // ... move `mock` into the engine, keep `injector` ...
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use atchat_core::{Error, Result, Transport};

/// A pre-loaded request/response pair for the mock transport.
#[derive(Debug, Clone)]
struct Expectation {
    /// The exact bytes we expect to be written.
    request: Vec<u8>,
    /// The bytes made readable once the matching request arrives.
    response: Vec<u8>,
}

#[derive(Debug)]
struct Inner {
    /// Ordered queue of expected request/response pairs.
    expectations: VecDeque<Expectation>,
    /// Bytes readable by `receive`, in arrival order: scripted responses
    /// and injected unsolicited data share this queue.
    rx_queue: VecDeque<u8>,
    /// Upper bound on bytes returned per `receive` call, for partial-read
    /// simulation.
    chunk: Option<usize>,
    /// Whether the transport is "connected".
    connected: bool,
    /// Log of all bytes written through this transport, one entry per
    /// `send` call.
    sent_log: Vec<Vec<u8>>,
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(|e| e.into_inner())
}

/// A mock [`Transport`] for testing the engine without hardware.
///
/// Expectations are consumed in order. When `send` is called, the data
/// is logged and matched against the next expectation; its response
/// bytes then become readable. A `send` with no expectation left, or
/// with mismatching bytes, fails — which doubles as the write-error
/// trigger for disconnect tests.
#[derive(Debug)]
pub struct MockTransport {
    inner: Arc<Mutex<Inner>>,
}

impl MockTransport {
    /// Create a new mock transport in the connected state.
    pub fn new() -> Self {
        MockTransport {
            inner: Arc::new(Mutex::new(Inner {
                expectations: VecDeque::new(),
                rx_queue: VecDeque::new(),
                chunk: None,
                connected: true,
                sent_log: Vec::new(),
            })),
        }
    }

    /// Add an expected request/response pair.
    ///
    /// When `send` is called with data matching `request`, `response`
    /// becomes readable. Pass an empty response for commands whose reply
    /// will be injected later (or never arrives, for timeout tests).
    pub fn expect(&mut self, request: &[u8], response: &[u8]) {
        lock(&self.inner).expectations.push_back(Expectation {
            request: request.to_vec(),
            response: response.to_vec(),
        });
    }

    /// Cap the number of bytes a single `receive` call returns,
    /// simulating a slow byte-at-a-time serial line.
    pub fn set_chunk_size(&mut self, chunk: usize) {
        lock(&self.inner).chunk = Some(chunk);
    }

    /// A clonable handle to this transport's state, usable after the
    /// transport itself has moved into the engine.
    pub fn injector(&self) -> Injector {
        Injector {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

/// Test-side handle to a [`MockTransport`] that has moved into the
/// engine: inject unsolicited bytes, inspect writes, force disconnects.
#[derive(Debug, Clone)]
pub struct Injector {
    inner: Arc<Mutex<Inner>>,
}

impl Injector {
    /// Make `bytes` readable, after anything already queued.
    pub fn push(&self, bytes: &[u8]) {
        lock(&self.inner).rx_queue.extend(bytes.iter().copied());
    }

    /// Snapshot of everything written so far, one entry per `send` call.
    pub fn sent_log(&self) -> Vec<Vec<u8>> {
        lock(&self.inner).sent_log.clone()
    }

    /// Number of expectations not yet consumed.
    pub fn remaining_expectations(&self) -> usize {
        lock(&self.inner).expectations.len()
    }

    /// Flip the connected state. While disconnected, `send` and
    /// `receive` fail with [`Error::NotConnected`].
    pub fn set_connected(&self, connected: bool) {
        lock(&self.inner).connected = connected;
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let mut inner = lock(&self.inner);

        if !inner.connected {
            return Err(Error::NotConnected);
        }

        inner.sent_log.push(data.to_vec());

        match inner.expectations.pop_front() {
            Some(expectation) => {
                if data != expectation.request.as_slice() {
                    return Err(Error::Protocol(format!(
                        "unexpected write: expected {:02X?}, got {:02X?}",
                        expectation.request, data
                    )));
                }
                inner.rx_queue.extend(expectation.response.iter().copied());
                Ok(())
            }
            None => Err(Error::Protocol(
                "no more expectations in mock transport".into(),
            )),
        }
    }

    async fn receive(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
        let mut inner = lock(&self.inner);

        if !inner.connected {
            return Err(Error::NotConnected);
        }

        if inner.rx_queue.is_empty() {
            return Err(Error::Timeout);
        }

        let limit = inner
            .chunk
            .unwrap_or(usize::MAX)
            .min(buf.len())
            .min(inner.rx_queue.len());
        let taken: Vec<u8> = inner.rx_queue.drain(..limit).collect();
        buf[..limit].copy_from_slice(&taken);
        Ok(limit)
    }

    async fn close(&mut self) -> Result<()> {
        let mut inner = lock(&self.inner);
        inner.connected = false;
        inner.rx_queue.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        lock(&self.inner).connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn basic_send_receive() {
        let mut mock = MockTransport::new();
        mock.expect(b"AT\r", b"\r\nOK\r\n");

        mock.send(b"AT\r").await.unwrap();

        let mut buf = [0u8; 64];
        let n = mock.receive(&mut buf, Duration::from_millis(100)).await.unwrap();
        assert_eq!(&buf[..n], b"\r\nOK\r\n");
    }

    #[tokio::test]
    async fn tracks_sent_data() {
        let mut mock = MockTransport::new();
        mock.expect(b"ATE0\r", b"");
        mock.expect(b"ATZ\r", b"");
        let injector = mock.injector();

        mock.send(b"ATE0\r").await.unwrap();
        mock.send(b"ATZ\r").await.unwrap();

        let log = injector.sent_log();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0], b"ATE0\r");
        assert_eq!(log[1], b"ATZ\r");
    }

    #[tokio::test]
    async fn wrong_data_errors() {
        let mut mock = MockTransport::new();
        mock.expect(b"AT\r", b"\r\nOK\r\n");

        let result = mock.send(b"ATE0\r").await;
        assert!(matches!(result.unwrap_err(), Error::Protocol(_)));
    }

    #[tokio::test]
    async fn exhausted_expectations_error() {
        let mut mock = MockTransport::new();

        let result = mock.send(b"AT\r").await;
        assert!(matches!(result.unwrap_err(), Error::Protocol(_)));
    }

    #[tokio::test]
    async fn receive_without_data_times_out() {
        let mut mock = MockTransport::new();
        let mut buf = [0u8; 64];

        let result = mock.receive(&mut buf, Duration::from_millis(10)).await;
        assert!(matches!(result.unwrap_err(), Error::Timeout));
    }

    #[tokio::test]
    async fn injected_bytes_are_readable() {
        let mut mock = MockTransport::new();
        let injector = mock.injector();

        injector.push(b"\r\n+CREG: 1,5\r\n");

        let mut buf = [0u8; 64];
        let n = mock.receive(&mut buf, Duration::from_millis(10)).await.unwrap();
        assert_eq!(&buf[..n], b"\r\n+CREG: 1,5\r\n");
    }

    #[tokio::test]
    async fn injected_bytes_follow_scripted_response() {
        let mut mock = MockTransport::new();
        mock.expect(b"AT\r", b"\r\nOK\r\n");
        let injector = mock.injector();

        mock.send(b"AT\r").await.unwrap();
        injector.push(b"\r\nRING\r\n");

        let mut buf = [0u8; 64];
        let n = mock.receive(&mut buf, Duration::from_millis(10)).await.unwrap();
        assert_eq!(&buf[..n], b"\r\nOK\r\n\r\nRING\r\n");
    }

    #[tokio::test]
    async fn chunk_size_limits_reads() {
        let mut mock = MockTransport::new();
        mock.set_chunk_size(3);
        let injector = mock.injector();
        injector.push(b"\r\nOK\r\n");

        let mut buf = [0u8; 64];
        let n = mock.receive(&mut buf, Duration::from_millis(10)).await.unwrap();
        assert_eq!(n, 3);
        assert_eq!(&buf[..n], b"\r\nO");

        let n = mock.receive(&mut buf, Duration::from_millis(10)).await.unwrap();
        assert_eq!(n, 3);
        assert_eq!(&buf[..n], b"K\r\n");
    }

    #[tokio::test]
    async fn disconnect_fails_operations() {
        let mut mock = MockTransport::new();
        let injector = mock.injector();
        injector.set_connected(false);

        assert!(!mock.is_connected());
        assert!(matches!(
            mock.send(b"AT\r").await.unwrap_err(),
            Error::NotConnected
        ));

        let mut buf = [0u8; 8];
        assert!(matches!(
            mock.receive(&mut buf, Duration::from_millis(10)).await.unwrap_err(),
            Error::NotConnected
        ));
    }

    #[tokio::test]
    async fn close_clears_pending_data() {
        let mut mock = MockTransport::new();
        let injector = mock.injector();
        injector.push(b"\r\nOK\r\n");

        mock.close().await.unwrap();
        assert!(!mock.is_connected());

        injector.set_connected(true);
        let mut buf = [0u8; 8];
        assert!(matches!(
            mock.receive(&mut buf, Duration::from_millis(10)).await.unwrap_err(),
            Error::Timeout
        ));
    }

    #[tokio::test]
    async fn remaining_expectations_counts_down() {
        let mut mock = MockTransport::new();
        mock.expect(b"AT\r", b"");
        mock.expect(b"ATE0\r", b"");
        let injector = mock.injector();
        assert_eq!(injector.remaining_expectations(), 2);

        mock.send(b"AT\r").await.unwrap();
        assert_eq!(injector.remaining_expectations(), 1);
    }
}
