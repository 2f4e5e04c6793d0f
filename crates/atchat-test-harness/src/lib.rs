//! atchat-test-harness: Mock transports and a scripted modem server for
//! testing atchat without hardware.
//!
//! This crate provides [`MockTransport`] for deterministic in-process
//! testing of the chat engine, with an [`Injector`] handle for driving
//! unsolicited data and inspecting writes while the engine owns the
//! transport, and [`MockModemServer`] for exercising the engine over a
//! real TCP connection.

pub mod mock_serial;
pub mod mock_tcp;

pub use mock_serial::{Injector, MockTransport};
pub use mock_tcp::{MockModemServer, ServerNotifier};
