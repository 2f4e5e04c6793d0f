//! AT command chat engine for atchat.
//!
//! This crate implements the asynchronous request/response layer that sits
//! between a raw byte transport and code that speaks 3GPP 27.007 AT
//! commands. It provides:
//!
//! - **Tokenizer** ([`syntax`]) -- split the incoming byte stream into
//!   response lines, `"> "` prompts, and raw PDU payloads, with a strict
//!   27.007 dialect and a permissive one for modems with sloppy framing.
//! - **Response model** ([`response`]) -- the final-response terminator
//!   table, aggregated [`AtResponse`] values, and a [`FieldReader`] for
//!   picking apart `+PREFIX: a,b,"c"` payload lines.
//! - **Command builders** ([`command`]) -- [`AtCommand`] with response
//!   prefix filters, PDU expectations, and per-command timeouts.
//! - **Engine** ([`chat`]) -- a single spawned IO task owning the
//!   transport: strict FIFO command queue with one command on the wire at
//!   a time, unsolicited notification registry, wakeup handling, and
//!   suspend/resume for handing the transport to a PPP stack.
//! - **Builder** ([`builder`]) -- fluent [`ChatBuilder`] assembling all of
//!   the above.
//!
//! # Why the tokenizer is hint-driven
//!
//! AT framing is not self-describing: an SMS payload after `+CMT:` is raw
//! bytes until CRLF, a multiline response may continue without fresh
//! framing, and some commands answer with a bare-CRLF prompt. The engine
//! therefore feeds context back into the tokenizer ([`SyntaxHint`]) as it
//! routes each unit, instead of the tokenizer guessing.
//!
//! # Example
//!
//! ```
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> atchat_core::Result<()> {
//! use atchat_engine::{AtCommand, ChatBuilder};
//! use atchat_test_harness::MockTransport;
//!
//! let mut modem = MockTransport::new();
//! modem.expect(b"AT+CSQ\r", b"\r\n+CSQ: 23,99\r\n\r\nOK\r\n");
//!
//! let chat = ChatBuilder::new().build_with_transport(Box::new(modem));
//!
//! let response = chat.send(AtCommand::new("AT+CSQ").prefix("+CSQ:")).await?;
//! let mut fields = response.reader("+CSQ:").unwrap();
//! assert_eq!(fields.number(), Some(23));
//! # chat.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod chat;
pub mod command;
pub mod response;
pub mod syntax;

// Re-export the primary types for ergonomic `use atchat_engine::*`.
pub use builder::ChatBuilder;
pub use chat::{AtChat, Listing, Notifications, SubmittedCommand};
pub use command::AtCommand;
pub use response::{AtResponse, FieldReader, Notification, TerminatorTable};
pub use syntax::{GsmV1Syntax, PermissiveSyntax, Syntax, SyntaxHint, SyntaxResult};
