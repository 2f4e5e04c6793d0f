//! Asynchronous chat engine event types.
//!
//! Events are emitted by the chat engine through a `tokio::sync::broadcast`
//! channel when the engine's relationship to the transport changes. Modem
//! drivers subscribe to these to tear down call state on a dead link or to
//! gate traffic around a PPP handover.

/// An event emitted by the chat engine when its transport state changes.
///
/// Events are delivered on a best-effort basis through a bounded broadcast
/// channel; slow consumers may miss events under load. Per-line unsolicited
/// notifications are *not* events: those go to registered notification
/// receivers, which are lossless and prefix-matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// The transport failed or reached end-of-file; the engine has stopped.
    ///
    /// Emitted at most once per engine. All queued and future submissions
    /// fail after this.
    Disconnected,

    /// The engine was suspended and the transport handed to another owner.
    Suspended,

    /// The engine was resumed with a transport and is dispatching again.
    Resumed,
}
