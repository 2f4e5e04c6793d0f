//! ChatBuilder -- fluent builder for constructing [`AtChat`] engines.
//!
//! Separates configuration from construction so that callers can pick a
//! tokenizer dialect, adjust the terminator table, and set timeout and
//! wakeup policy before the engine task starts.
//!
//! # Example
//!
//! ```
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> atchat_core::Result<()> {
//! use atchat_engine::{AtCommand, ChatBuilder};
//! use atchat_test_harness::MockTransport;
//! use std::time::Duration;
//!
//! let mut modem = MockTransport::new();
//! modem.expect(b"ATE0\r", b"\r\nOK\r\n");
//!
//! let chat = ChatBuilder::new()
//!     .command_timeout(Duration::from_secs(2))
//!     .build_with_transport(Box::new(modem));
//!
//! assert!(chat.send(AtCommand::new("ATE0")).await?.success());
//! # chat.shutdown().await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use atchat_core::transport::Transport;
use atchat_core::FinalKind;

use crate::chat::{spawn_engine, AtChat, EngineConfig, WakeupConfig};
use crate::response::TerminatorTable;
use crate::syntax::{GsmV1Syntax, Syntax};

/// Timeout applied to commands without a per-command override.
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Capacity of the broadcast event channel. Lifecycle events are rare,
/// so a small buffer is plenty.
const DEFAULT_EVENT_CAPACITY: usize = 16;

/// Fluent builder for [`AtChat`].
///
/// Every knob has a sensible default (strict 27.007 tokenizer, standard
/// terminator table, 5 second command timeout, no wakeup), so the
/// simplest usage is:
///
/// ```ignore
/// let chat = ChatBuilder::new().build_with_transport(Box::new(transport));
/// ```
pub struct ChatBuilder {
    syntax: Box<dyn Syntax>,
    terminators: TerminatorTable,
    command_timeout: Duration,
    wakeup: Option<WakeupConfig>,
    wire_debug: bool,
    event_capacity: usize,
}

impl ChatBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        ChatBuilder {
            syntax: Box::new(GsmV1Syntax::new()),
            terminators: TerminatorTable::new(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            wakeup: None,
            wire_debug: false,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Replace the tokenizer dialect (default:
    /// [`GsmV1Syntax`](crate::syntax::GsmV1Syntax)). Pass
    /// [`PermissiveSyntax`](crate::syntax::PermissiveSyntax) for modems
    /// with sloppy framing.
    pub fn syntax(mut self, syntax: Box<dyn Syntax>) -> Self {
        self.syntax = syntax;
        self
    }

    /// Set the timeout for waiting for a final response to a single
    /// command (default: 5s). Individual commands can override this via
    /// [`AtCommand::timeout`](crate::command::AtCommand::timeout).
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Append a custom final-response marker, checked after the standard
    /// table. `prefix` selects prefix matching instead of whole-line
    /// equality; `success` is the verdict a match produces.
    pub fn add_terminator(mut self, marker: impl Into<String>, prefix: bool, success: bool) -> Self {
        self.terminators.add(marker, prefix, success);
        self
    }

    /// Remove a standard entry from the terminator table, so the line is
    /// treated as content instead (e.g. `NO CARRIER` while a voice call
    /// is ringing).
    pub fn blacklist_terminator(mut self, kind: FinalKind) -> Self {
        self.terminators.blacklist(kind);
        self
    }

    /// Configure a wakeup command for modems that sleep between
    /// exchanges. When the wire has been quiet for longer than
    /// `inactivity`, `text` is written verbatim ahead of the next
    /// command and its response (or silence past `response_timeout`) is
    /// swallowed.
    pub fn wakeup(
        mut self,
        text: impl Into<String>,
        response_timeout: Duration,
        inactivity: Duration,
    ) -> Self {
        self.wakeup = Some(WakeupConfig {
            text: text.into(),
            response_timeout,
            inactivity,
        });
        self
    }

    /// Start with wire debug logging on (default: off). Can be toggled
    /// later via [`AtChat::set_wire_debug`].
    pub fn wire_debug(mut self, enabled: bool) -> Self {
        self.wire_debug = enabled;
        self
    }

    /// Set the capacity of the [`subscribe`](AtChat::subscribe) event
    /// channel (default: 16).
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Spawn the engine task on the provided transport and return the
    /// handle. Must be called from within a tokio runtime.
    ///
    /// This is the single entry point: production code passes a
    /// [`Transport`] from `atchat-transport`, tests pass a
    /// `MockTransport` from `atchat-test-harness`.
    pub fn build_with_transport(self, transport: Box<dyn Transport>) -> AtChat {
        spawn_engine(
            transport,
            self.syntax,
            self.terminators,
            EngineConfig {
                command_timeout: self.command_timeout,
                wakeup: self.wakeup,
                wire_debug: self.wire_debug,
                event_capacity: self.event_capacity,
            },
        )
    }
}

impl Default for ChatBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::AtCommand;
    use crate::syntax::PermissiveSyntax;
    use atchat_test_harness::MockTransport;

    #[tokio::test]
    async fn builder_defaults() {
        let mut mock = MockTransport::new();
        mock.expect(b"AT\r", b"\r\nOK\r\n");

        let chat = ChatBuilder::new().build_with_transport(Box::new(mock));
        let response = chat.send(AtCommand::new("AT")).await.unwrap();
        assert!(response.success());
        chat.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn builder_fluent_chain() {
        let mut mock = MockTransport::new();
        mock.expect(b"AT\r", b"\r\nOK\r\n");
        mock.expect(b"ATI\r", b"\r\nTinyModem 900\r\n\r\nOK\r\n");

        let chat = ChatBuilder::new()
            .command_timeout(Duration::from_millis(500))
            .add_terminator("COMMAND NOT SUPPORT", false, false)
            .blacklist_terminator(FinalKind::Connect)
            .wakeup("AT\r", Duration::from_millis(100), Duration::from_secs(30))
            .wire_debug(true)
            .event_capacity(4)
            .build_with_transport(Box::new(mock));

        let response = chat.send(AtCommand::new("ATI")).await.unwrap();
        assert!(response.success());
        assert_eq!(response.lines, ["TinyModem 900"]);
    }

    #[tokio::test]
    async fn builder_permissive_syntax() {
        // Bare-CR framing that the strict dialect would sit on.
        let mut mock = MockTransport::new();
        mock.expect(b"AT+CSQ\r", b"+CSQ: 18,99\rOK\r");

        let chat = ChatBuilder::new()
            .syntax(Box::new(PermissiveSyntax::new()))
            .build_with_transport(Box::new(mock));

        let response = chat
            .send(AtCommand::new("AT+CSQ").prefix("+CSQ:"))
            .await
            .unwrap();
        assert!(response.success());
        assert_eq!(response.lines, ["+CSQ: 18,99"]);
    }
}
