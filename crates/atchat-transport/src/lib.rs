//! Transport implementations for atchat.
//!
//! This crate provides concrete implementations of the
//! [`Transport`](atchat_core::Transport) trait from `atchat-core` for the
//! ways modems are actually attached:
//!
//! - [`SerialTransport`]: USB virtual COM ports and RS-232 serial connections
//! - [`TcpTransport`]: TCP connections for ser2net bridges, GSM gateways,
//!   and networked modem emulators
//!
//! # Example
//!
//! ```no_run
//! use atchat_transport::SerialTransport;
//! use atchat_core::transport::Transport;
//! use std::time::Duration;
//!
//! # async fn example() -> atchat_core::Result<()> {
//! // Open the modem's AT command port
//! let mut transport = SerialTransport::open("/dev/ttyUSB2", 115_200).await?;
//!
//! // Probe the modem
//! transport.send(b"AT\r").await?;
//!
//! // Receive response
//! let mut buf = [0u8; 256];
//! let n = transport.receive(&mut buf, Duration::from_secs(1)).await?;
//! # Ok(())
//! # }
//! ```

pub mod serial;
pub mod tcp;

pub use serial::{DataBits, FlowControl, Parity, SerialConfig, SerialTransport, StopBits};
pub use tcp::TcpTransport;
