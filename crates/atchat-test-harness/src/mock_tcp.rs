//! Mock TCP modem for network-transport testing.
//!
//! [`MockModemServer`] is a lightweight TCP listener pre-loaded with
//! scripted command/response exchanges, for testing the chat engine over
//! a `TcpTransport` (rfcomm bridges, `socat`-style modem multiplexers)
//! without real hardware.
//!
//! Unlike the in-process [`MockTransport`](crate::MockTransport), this
//! exercises the real network stack, so it also covers transport-level
//! behavior such as half-close detection.
//!
//! # Example
//!
//! ```
//! use atchat_test_harness::MockModemServer;
//!
//! # async fn example() -> atchat_core::Result<()> {
//! let mut server = MockModemServer::new().await?;
//!
//! // When the client sends "AT\r", reply with a framed OK.
//! server.expect(b"AT\r", b"\r\nOK\r\n");
//!
//! let addr = server.addr().to_string();
//! server.start();
//! // ... connect a TcpTransport to `addr` and run commands ...
//! server.wait().await.unwrap();
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use atchat_core::{Error, Result};

/// A pre-loaded request/response pair for the mock modem.
#[derive(Debug, Clone)]
struct Exchange {
    /// The exact bytes we expect the client to send.
    request: Vec<u8>,
    /// The bytes to send back when the matching request is received.
    response: Vec<u8>,
}

/// Handle for pushing unsolicited bytes through a running
/// [`MockModemServer`].
///
/// Pushed data is written to the client as soon as the server is between
/// reads, so `RING` or `+CMT:` indications can be injected at any point
/// relative to the scripted exchanges.
///
/// All notifier clones must be dropped before
/// [`wait`](MockModemServer::wait) resolves: the server keeps the
/// connection open for further pushes as long as a handle is alive.
#[derive(Debug, Clone)]
pub struct ServerNotifier {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl ServerNotifier {
    /// Queue `bytes` for delivery to the connected client.
    ///
    /// Silently dropped if the server task has already exited.
    pub fn push(&self, bytes: &[u8]) {
        let _ = self.tx.send(bytes.to_vec());
    }
}

/// A mock AT modem behind a TCP socket.
///
/// The server listens on a random localhost port from construction
/// onward, so a client can connect as soon as [`start`] spawns the
/// accept task. It serves a single connection, consuming exchanges in
/// order: for each expected request it reads exactly that many bytes
/// from the client, verifies them, and writes back the scripted
/// response. Unsolicited data queued through a [`ServerNotifier`] is
/// interleaved between reads.
///
/// A mismatched or truncated request ends the task with an error, which
/// [`wait`] surfaces.
///
/// [`start`]: MockModemServer::start
/// [`wait`]: MockModemServer::wait
pub struct MockModemServer {
    /// Held from construction so the port is bound before `start`.
    listener: Option<TcpListener>,
    /// The address the server is listening on (e.g. "127.0.0.1:54321").
    addr: String,
    /// Ordered queue of scripted exchanges.
    exchanges: VecDeque<Exchange>,
    notify_tx: mpsc::UnboundedSender<Vec<u8>>,
    notify_rx: Option<mpsc::UnboundedReceiver<Vec<u8>>>,
    /// Handle to the server task once started.
    server_handle: Option<JoinHandle<std::result::Result<(), String>>>,
}

impl MockModemServer {
    /// Create a new mock modem listening on a random localhost port.
    ///
    /// The server does not accept connections until
    /// [`start`](MockModemServer::start) is called, allowing exchanges
    /// to be loaded first.
    pub async fn new() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| Error::Transport(format!("failed to bind mock modem server: {}", e)))?;
        let addr = listener.local_addr().map_err(Error::Io)?.to_string();
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();

        Ok(Self {
            listener: Some(listener),
            addr,
            exchanges: VecDeque::new(),
            notify_tx,
            notify_rx: Some(notify_rx),
            server_handle: None,
        })
    }

    /// Add a scripted request/response exchange.
    ///
    /// Exchanges are consumed in order. When the connected client sends
    /// bytes matching `request`, the server replies with `response`.
    pub fn expect(&mut self, request: &[u8], response: &[u8]) {
        self.exchanges.push_back(Exchange {
            request: request.to_vec(),
            response: response.to_vec(),
        });
    }

    /// The address the server is listening on.
    ///
    /// Use this to connect a `TcpTransport` to the mock modem.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// A handle for injecting unsolicited data into the connection.
    pub fn notifier(&self) -> ServerNotifier {
        ServerNotifier {
            tx: self.notify_tx.clone(),
        }
    }

    /// Start the server task: accept a single client connection and
    /// process all exchanges, relaying pushed notifications in between.
    ///
    /// The listening socket is already bound, so clients may connect
    /// immediately after this returns. Call
    /// [`wait`](MockModemServer::wait) to join the task and check that
    /// every exchange was consumed.
    pub fn start(&mut self) {
        let listener = match self.listener.take() {
            Some(listener) => listener,
            // Double start: leave the original task running.
            None => return,
        };
        let mut notify_rx = match self.notify_rx.take() {
            Some(rx) => rx,
            None => return,
        };
        let exchanges: Vec<Exchange> = self.exchanges.drain(..).collect();

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener
                .accept()
                .await
                .map_err(|e| format!("failed to accept connection: {}", e))?;

            for (i, exchange) in exchanges.iter().enumerate() {
                read_exact_exchange(&mut stream, &mut notify_rx, exchange, i).await?;

                stream
                    .write_all(&exchange.response)
                    .await
                    .map_err(|e| format!("exchange {}: write error: {}", i, e))?;
                stream
                    .flush()
                    .await
                    .map_err(|e| format!("exchange {}: flush error: {}", i, e))?;
            }

            // Script exhausted: keep relaying pushes until every notifier
            // handle is gone, then close the connection.
            while let Some(bytes) = notify_rx.recv().await {
                stream
                    .write_all(&bytes)
                    .await
                    .map_err(|e| format!("notify write error: {}", e))?;
                stream
                    .flush()
                    .await
                    .map_err(|e| format!("notify flush error: {}", e))?;
            }

            Ok(())
        });

        self.server_handle = Some(handle);
    }

    /// Wait for the server task to complete and surface any script
    /// mismatch.
    ///
    /// Call this after the client has finished its interactions. The
    /// server's own notifier handle is dropped here; any
    /// [`ServerNotifier`] clones held by the test must be dropped first
    /// or the task (and this call) will not finish.
    pub async fn wait(self) -> std::result::Result<(), String> {
        let MockModemServer {
            server_handle,
            notify_tx,
            listener,
            ..
        } = self;
        drop(notify_tx);
        drop(listener);

        if let Some(handle) = server_handle {
            handle
                .await
                .map_err(|e| format!("server task panicked: {}", e))?
        } else {
            Ok(())
        }
    }
}

/// Read exactly `exchange.request.len()` bytes from the client, writing
/// out any queued notifications while waiting, and verify the content.
async fn read_exact_exchange(
    stream: &mut TcpStream,
    notify_rx: &mut mpsc::UnboundedReceiver<Vec<u8>>,
    exchange: &Exchange,
    index: usize,
) -> std::result::Result<(), String> {
    let want = exchange.request.len();
    let mut buf = vec![0u8; want];
    let mut total_read = 0;

    while total_read < want {
        tokio::select! {
            read = stream.read(&mut buf[total_read..]) => {
                let n = read.map_err(|e| format!("exchange {}: read error: {}", index, e))?;
                if n == 0 {
                    return Err(format!(
                        "exchange {}: client disconnected after {} bytes (expected {})",
                        index, total_read, want
                    ));
                }
                total_read += n;
            }
            Some(bytes) = notify_rx.recv() => {
                stream
                    .write_all(&bytes)
                    .await
                    .map_err(|e| format!("notify write error: {}", e))?;
                stream
                    .flush()
                    .await
                    .map_err(|e| format!("notify flush error: {}", e))?;
            }
        }
    }

    if buf != exchange.request {
        return Err(format!(
            "exchange {}: request mismatch: expected {:02X?}, got {:02X?}",
            index, exchange.request, buf
        ));
    }

    Ok(())
}
