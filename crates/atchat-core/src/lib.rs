//! atchat-core: Core traits, types, and error definitions for atchat.
//!
//! This crate defines the transport-agnostic abstractions the chat engine
//! and both transports are built on. Modem drivers can depend on these
//! types without pulling in the engine or any concrete transport.
//!
//! # Key types
//!
//! - [`Transport`] -- byte-level communication channel to the modem
//! - [`FinalKind`] / [`FinalResponse`] -- final response classification
//! - [`ChatEvent`] -- engine lifecycle notifications
//! - [`Error`] / [`Result`] -- error handling

pub mod error;
pub mod events;
pub mod transport;
pub mod types;

// Re-export key types at crate root for ergonomic `use atchat_core::*`.
pub use error::{Error, Result};
pub use events::ChatEvent;
pub use transport::Transport;
pub use types::*;
