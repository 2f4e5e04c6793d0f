//! # atchat -- Async AT Command Chat for Cellular Modems
//!
//! `atchat` is an asynchronous Rust library for driving AT-command modems:
//! framing response lines out of the byte stream, matching final responses
//! (`OK`, `ERROR`, `+CME ERROR: 30`, ...), queueing commands one at a time,
//! dispatching unsolicited notifications (`+CREG:`, `+CMT:`, ...), and
//! handing the raw transport over to a PPP stack and back. It is designed
//! for connection managers, SMS daemons, and embedded supervisors where a
//! single serial channel multiplexes commands and network-initiated events.
//!
//! ## Quick Start
//!
//! Add `atchat` to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! atchat = "0.1"
//! tokio = { version = "1", features = ["full"] }
//! ```
//!
//! Connect to a modem and read its signal quality:
//!
//! ```no_run
//! use atchat::{AtCommand, ChatBuilder};
//! use atchat::serial::SerialTransport;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let transport = SerialTransport::open("/dev/ttyUSB2", 115_200).await?;
//!     let chat = ChatBuilder::new().build_with_transport(Box::new(transport));
//!
//!     let response = chat.send(AtCommand::new("AT+CSQ").prefix("+CSQ:")).await?;
//!     if let Some(mut fields) = response.reader("+CSQ:") {
//!         println!("RSSI: {:?}", fields.number());
//!     }
//!
//!     chat.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! The library is organized as a workspace of focused crates:
//!
//! | Crate                 | Purpose                                          |
//! |-----------------------|--------------------------------------------------|
//! | `atchat-core`         | [`Transport`] trait, [`Error`], events, AT types |
//! | `atchat-engine`       | Tokenizer, response aggregation, command queue, notification registry |
//! | `atchat-transport`    | Serial and TCP transport implementations         |
//! | `atchat-test-harness` | Scripted mock transports for tests               |
//! | **`atchat`**          | This facade crate -- re-exports everything       |
//!
//! The engine works against `dyn Transport`, so application code never
//! cares whether the modem hangs off a USB port, a ser2net bridge, or a
//! test script.
//!
//! ## Feature Flags
//!
//! | Feature  | Enables                                  | Default |
//! |----------|------------------------------------------|---------|
//! | `serial` | [`serial`] module ([`SerialTransport`](serial::SerialTransport)) | yes |
//! | `tcp`    | [`tcp`] module ([`TcpTransport`](tcp::TcpTransport)) | yes |
//! | `mock`   | [`mock`] module (scripted test transports) | no     |
//!
//! ## The Chat Handle
//!
//! [`AtChat`] is a cheap cloneable handle to the engine task:
//!
//! - **Commands**: [`send`](AtChat::send), [`submit`](AtChat::submit),
//!   [`send_listing`](AtChat::send_listing), [`cancel`](AtChat::cancel)
//! - **Notifications**: [`register_notification`](AtChat::register_notification),
//!   [`register_pdu_notification`](AtChat::register_pdu_notification)
//! - **Lifecycle**: [`suspend`](AtChat::suspend), [`resume`](AtChat::resume),
//!   [`shutdown`](AtChat::shutdown), [`subscribe`](AtChat::subscribe)
//!
//! Commands are written strictly one at a time: the engine never puts a
//! second command on the wire before the first one's final response (or
//! timeout). A failed final response is **not** an `Err` -- it is an `Ok`
//! [`AtResponse`] with `success() == false`; `Err` means the exchange
//! itself broke down.
//!
//! ## Unsolicited Notifications
//!
//! Modems volunteer lines at any time (`RING`, `+CREG: 1`, `+CMT: ...`).
//! Register a prefix to receive them; the longest matching prefix wins:
//!
//! ```no_run
//! use atchat::AtChat;
//! # async fn example(chat: &AtChat) -> atchat::Result<()> {
//! let mut creg = chat.register_notification("+CREG:", true).await?;
//! while let Some(notification) = creg.next().await {
//!     println!("network registration: {}", notification.line);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## PPP Handover
//!
//! After `ATD*99#` answers `CONNECT`, the line carries PPP, not AT.
//! [`suspend`](AtChat::suspend) hands the transport out (the engine stops
//! touching the wire); [`resume`](AtChat::resume) takes it back when the
//! data session ends.

pub use atchat_core::*;

pub use atchat_engine::{
    AtChat, AtCommand, AtResponse, ChatBuilder, FieldReader, GsmV1Syntax, Listing, Notification,
    Notifications, PermissiveSyntax, SubmittedCommand, Syntax, SyntaxHint, SyntaxResult,
    TerminatorTable,
};

/// Serial port transport.
///
/// Provides [`SerialTransport`](serial::SerialTransport) and
/// [`SerialConfig`](serial::SerialConfig) for modems attached via USB
/// virtual COM ports or RS-232, with DTR/RTS asserted at open the way
/// modems expect.
#[cfg(feature = "serial")]
pub mod serial {
    pub use atchat_transport::serial::*;
}

/// TCP transport.
///
/// Provides [`TcpTransport`](tcp::TcpTransport) for modems reached over
/// the network: ser2net bridges, GSM gateways, and emulators.
#[cfg(feature = "tcp")]
pub mod tcp {
    pub use atchat_transport::tcp::*;
}

/// Scripted mock transports for testing modem-facing code without a
/// modem.
///
/// Provides [`MockTransport`](mock::MockTransport) (in-process scripted
/// exchanges plus unsolicited injection) and
/// [`MockModemServer`](mock::MockModemServer) (the same behind a real
/// TCP socket).
#[cfg(feature = "mock")]
pub mod mock {
    pub use atchat_test_harness::*;
}
