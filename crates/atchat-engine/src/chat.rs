//! The chat engine: command queue, response routing, notification
//! dispatch, and transport ownership.
//!
//! One spawned IO task per modem channel owns the transport, the
//! tokenizer, the command queue, and the notification registry. Callers
//! hold an [`AtChat`] handle (cheaply cloneable) and talk to the task
//! over two mpsc channels: a control channel for cancellation, registry
//! changes, suspend/resume, and shutdown, and a submission channel for
//! commands. Responses and notifications come back over per-request
//! oneshot and unbounded channels, so callers never run inside the IO
//! task and never observe partial lines.
//!
//! Commands are written strictly one at a time: the next queued command
//! goes on the wire only after the current one has completed with a
//! final response, a timeout, or a write error. Multi-segment commands
//! (`+CMGS` message bodies) are continued each time the modem issues a
//! `> ` prompt.

use std::collections::VecDeque;
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use atchat_core::{
    ChatEvent, CommandId, Error, FinalResponse, NotifyId, Result, Transport,
};

use crate::command::{next_segment, AtCommand};
use crate::response::{AtResponse, Notification, TerminatorTable};
use crate::syntax::{strip_framing, Syntax, SyntaxHint, SyntaxResult};

/// Read buffer handed to the transport on each poll.
const READ_CHUNK: usize = 256;

/// How long a single transport receive may wait before the loop gets a
/// chance to service control and submission requests again.
const RECEIVE_TIMEOUT: Duration = Duration::from_millis(100);

/// Pause between polls when the transport has nothing for us, so a
/// transport whose receive returns immediately cannot spin the loop.
const IDLE_DELAY: Duration = Duration::from_millis(10);

/// A unit that grows past this without completing is dropped and the
/// tokenizer reset, on the assumption that framing was lost.
const MAX_UNIT: usize = 8192;

/// Capacity of the control and submission channels into the IO task.
const CHANNEL_CAPACITY: usize = 32;

/// Control requests serviced by the IO task ahead of submissions.
enum Control {
    /// Add a notification registration.
    Register {
        prefix: String,
        pdu: bool,
        persistent: bool,
        reply: oneshot::Sender<Result<(NotifyId, mpsc::UnboundedReceiver<Notification>)>>,
    },
    /// Remove one registration.
    Unregister {
        id: NotifyId,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Remove every registration.
    UnregisterAll { reply: oneshot::Sender<()> },
    /// Cancel one command, queued or in flight.
    Cancel {
        id: CommandId,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Cancel the in-flight command and drain the queue.
    CancelAll { reply: oneshot::Sender<()> },
    /// Toggle trace-level logging of raw wire traffic.
    SetWireDebug { on: bool, reply: oneshot::Sender<()> },
    /// Hand the transport out and stop all IO until resume.
    Suspend {
        reply: oneshot::Sender<Result<Box<dyn Transport>>>,
    },
    /// Reinstall a transport after a suspend.
    Resume {
        transport: Box<dyn Transport>,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Stop the task and return the transport to the caller.
    Shutdown {
        reply: oneshot::Sender<Box<dyn Transport>>,
    },
}

/// One command submission travelling from the handle to the IO task.
struct Submission {
    id: CommandId,
    command: AtCommand,
    reply: oneshot::Sender<Result<AtResponse>>,
    /// For listing submissions, intermediate lines stream here instead
    /// of accumulating in the response.
    listing: Option<mpsc::UnboundedSender<Notification>>,
}

/// Where the next raw payload unit belongs once a `Pdu` hint is armed.
enum PduBinding {
    /// The in-flight command's most recent intermediate line.
    Command,
    /// A pdu notification registration, chosen when its header matched.
    Notify { id: NotifyId, line: String },
}

/// The command currently owning the wire.
struct InFlight {
    id: CommandId,
    command: AtCommand,
    wire: Vec<u8>,
    /// Bytes of `wire` already written; prompts advance this.
    written: usize,
    deadline: Instant,
    /// Taken by cancel, leaving the command to drain without a waiter.
    reply: Option<oneshot::Sender<Result<AtResponse>>>,
    listing: Option<mpsc::UnboundedSender<Notification>>,
    /// Listing line awaiting its payload before both are streamed out.
    pending_listing_line: Option<String>,
    lines: Vec<String>,
    pdu: Option<String>,
    /// Internal wakeup probe: no waiter, response swallowed.
    wakeup: bool,
}

/// One live notification registration.
struct NotifyEntry {
    id: NotifyId,
    prefix: String,
    pdu: bool,
    persistent: bool,
    tx: mpsc::UnboundedSender<Notification>,
}

/// Engine options assembled by the builder.
pub(crate) struct EngineConfig {
    pub(crate) command_timeout: Duration,
    pub(crate) wakeup: Option<WakeupConfig>,
    pub(crate) wire_debug: bool,
    pub(crate) event_capacity: usize,
}

/// Wakeup command settings for modems that sleep between exchanges.
#[derive(Clone)]
pub(crate) struct WakeupConfig {
    /// Written to the wire verbatim, no terminator appended.
    pub(crate) text: String,
    pub(crate) response_timeout: Duration,
    pub(crate) inactivity: Duration,
}

/// Placeholder transport held while the real one is suspended out or
/// after shutdown. Every IO operation fails with `NotConnected`.
struct DetachedTransport;

#[async_trait]
impl Transport for DetachedTransport {
    async fn send(&mut self, _data: &[u8]) -> Result<()> {
        Err(Error::NotConnected)
    }

    async fn receive(&mut self, _buf: &mut [u8], _timeout: Duration) -> Result<usize> {
        Err(Error::NotConnected)
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_connected(&self) -> bool {
        false
    }
}

/// Spawn the IO task and return the caller-facing handle.
pub(crate) fn spawn_engine(
    transport: Box<dyn Transport>,
    syntax: Box<dyn Syntax>,
    terminators: TerminatorTable,
    config: EngineConfig,
) -> AtChat {
    let (ctl_tx, ctl_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (sub_tx, sub_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (event_tx, _) = broadcast::channel(config.event_capacity);
    let cancel = CancellationToken::new();

    let engine = Engine {
        transport,
        syntax,
        terminators,
        command_timeout: config.command_timeout,
        wakeup: config.wakeup,
        wire_debug: config.wire_debug,
        event_tx: event_tx.clone(),
        queue: VecDeque::new(),
        in_flight: None,
        registry: Vec::new(),
        unit_buf: BytesMut::new(),
        pdu_binding: None,
        suspended: false,
        alive: true,
        last_write: None,
        next_notify_id: 1,
    };

    tokio::spawn(io_loop(engine, ctl_rx, sub_rx, cancel.clone()));

    AtChat {
        ctl_tx,
        sub_tx,
        event_tx,
        next_command_id: Arc::new(AtomicU64::new(1)),
        cancel,
    }
}

/// Handle to a running chat engine.
///
/// Cloning is cheap; clones share the same engine and the same command
/// id sequence. All methods fail with [`Error::NotConnected`] once the
/// engine task is gone (shutdown, or every handle dropped). Dropping the
/// last handle stops the task without returning the transport.
///
/// ```
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> atchat_core::Result<()> {
/// use atchat_engine::{AtCommand, ChatBuilder};
/// use atchat_test_harness::MockTransport;
///
/// let mut modem = MockTransport::new();
/// modem.expect(b"AT+CGMR\r", b"\r\nRevision 1.0\r\n\r\nOK\r\n");
///
/// let chat = ChatBuilder::new().build_with_transport(Box::new(modem));
/// let response = chat.send(AtCommand::new("AT+CGMR")).await?;
/// assert!(response.success());
/// assert_eq!(response.lines, ["Revision 1.0"]);
/// # chat.shutdown().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct AtChat {
    ctl_tx: mpsc::Sender<Control>,
    sub_tx: mpsc::Sender<Submission>,
    event_tx: broadcast::Sender<ChatEvent>,
    next_command_id: Arc<AtomicU64>,
    cancel: CancellationToken,
}

impl AtChat {
    /// Submit a command and wait for its response.
    ///
    /// A failed final (`ERROR`, `+CME ERROR: 30`, ...) is an `Ok`
    /// response with `success() == false`; `Err` means the exchange
    /// itself broke down (timeout, cancellation, transport failure).
    pub async fn send(&self, command: AtCommand) -> Result<AtResponse> {
        self.submit(command).await?.wait().await
    }

    /// Submit a command without waiting.
    ///
    /// The returned [`SubmittedCommand`] carries the [`CommandId`] (for
    /// [`cancel`](AtChat::cancel)) and resolves to the response.
    pub async fn submit(&self, command: AtCommand) -> Result<SubmittedCommand> {
        let (sub, handle) = self.make_submission(command, None);
        self.sub_tx
            .send(sub)
            .await
            .map_err(|_| Error::NotConnected)?;
        Ok(handle)
    }

    /// Submit a command whose intermediate lines stream to the returned
    /// [`Listing`] as they arrive instead of accumulating.
    ///
    /// Useful for large `+CMGL`-style listings. With
    /// [`expect_pdu`](AtCommand::expect_pdu), each streamed entry
    /// carries its payload. The awaited response has an empty `lines`.
    pub async fn send_listing(&self, command: AtCommand) -> Result<(Listing, SubmittedCommand)> {
        let (line_tx, line_rx) = mpsc::unbounded_channel();
        let (sub, handle) = self.make_submission(command, Some(line_tx));
        self.sub_tx
            .send(sub)
            .await
            .map_err(|_| Error::NotConnected)?;
        Ok((Listing { rx: line_rx }, handle))
    }

    fn make_submission(
        &self,
        command: AtCommand,
        listing: Option<mpsc::UnboundedSender<Notification>>,
    ) -> (Submission, SubmittedCommand) {
        let id = CommandId::from_raw(self.next_command_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = oneshot::channel();
        let sub = Submission {
            id,
            command,
            reply: tx,
            listing,
        };
        (sub, SubmittedCommand { id, rx })
    }

    /// Cancel one command.
    ///
    /// A queued command is removed; an in-flight command is detached
    /// (its waiter fails immediately, but the engine still drains its
    /// response before dispatching the next command, since the written
    /// bytes cannot be retracted). Unknown ids are
    /// [`Error::InvalidParameter`].
    pub async fn cancel(&self, id: CommandId) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.ctl_tx
            .send(Control::Cancel { id, reply: tx })
            .await
            .map_err(|_| Error::NotConnected)?;
        rx.await.map_err(|_| Error::NotConnected)?
    }

    /// Cancel the in-flight command and every queued command.
    pub async fn cancel_all(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.ctl_tx
            .send(Control::CancelAll { reply: tx })
            .await
            .map_err(|_| Error::NotConnected)?;
        rx.await.map_err(|_| Error::NotConnected)
    }

    /// Register for unsolicited lines starting with `prefix`.
    ///
    /// The registration with the longest matching prefix receives each
    /// line; ties go to the earliest registration. With
    /// `persistent == false` the registration is removed after its first
    /// delivery and the receiver then yields `None`.
    pub async fn register_notification(
        &self,
        prefix: impl Into<String>,
        persistent: bool,
    ) -> Result<Notifications> {
        self.register(prefix.into(), false, persistent).await
    }

    /// Like [`register_notification`](AtChat::register_notification),
    /// for notifications whose matched line is followed by a raw payload
    /// line (`+CMT:` style); the payload is delivered in
    /// [`Notification::pdu`].
    pub async fn register_pdu_notification(
        &self,
        prefix: impl Into<String>,
        persistent: bool,
    ) -> Result<Notifications> {
        self.register(prefix.into(), true, persistent).await
    }

    async fn register(&self, prefix: String, pdu: bool, persistent: bool) -> Result<Notifications> {
        let (tx, rx) = oneshot::channel();
        self.ctl_tx
            .send(Control::Register {
                prefix,
                pdu,
                persistent,
                reply: tx,
            })
            .await
            .map_err(|_| Error::NotConnected)?;
        let (id, rx) = rx.await.map_err(|_| Error::NotConnected)??;
        Ok(Notifications { id, rx })
    }

    /// Remove one registration. The receiver yields `None` afterwards.
    pub async fn unregister_notification(&self, id: NotifyId) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.ctl_tx
            .send(Control::Unregister { id, reply: tx })
            .await
            .map_err(|_| Error::NotConnected)?;
        rx.await.map_err(|_| Error::NotConnected)?
    }

    /// Remove every notification registration.
    pub async fn unregister_all(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.ctl_tx
            .send(Control::UnregisterAll { reply: tx })
            .await
            .map_err(|_| Error::NotConnected)?;
        rx.await.map_err(|_| Error::NotConnected)
    }

    /// Toggle trace-level logging of every chunk read and written.
    pub async fn set_wire_debug(&self, on: bool) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.ctl_tx
            .send(Control::SetWireDebug { on, reply: tx })
            .await
            .map_err(|_| Error::NotConnected)?;
        rx.await.map_err(|_| Error::NotConnected)
    }

    /// Stop all IO and hand the transport to the caller, e.g. for a PPP
    /// session on the same link.
    ///
    /// The in-flight command fails with [`Error::Cancelled`]; queued
    /// commands stay queued for [`resume`](AtChat::resume). Partial
    /// receive state is discarded, so bytes seen before the suspend are
    /// never reinterpreted afterwards. Suspending twice fails with
    /// [`Error::Suspended`].
    pub async fn suspend(&self) -> Result<Box<dyn Transport>> {
        let (tx, rx) = oneshot::channel();
        self.ctl_tx
            .send(Control::Suspend { reply: tx })
            .await
            .map_err(|_| Error::NotConnected)?;
        rx.await.map_err(|_| Error::NotConnected)?
    }

    /// Reinstall a transport after [`suspend`](AtChat::suspend) and
    /// restart dispatch with the queue intact.
    ///
    /// Fails with [`Error::InvalidParameter`] if the engine is not
    /// suspended; the passed transport is dropped in that case.
    pub async fn resume(&self, transport: Box<dyn Transport>) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.ctl_tx
            .send(Control::Resume {
                transport,
                reply: tx,
            })
            .await
            .map_err(|_| Error::NotConnected)?;
        rx.await.map_err(|_| Error::NotConnected)?
    }

    /// Stop the engine task and recover the transport.
    ///
    /// Queued and in-flight commands fail with [`Error::Cancelled`].
    /// If the engine was suspended, the returned transport is the inert
    /// placeholder; the real one was already handed out.
    pub async fn shutdown(&self) -> Result<Box<dyn Transport>> {
        let (tx, rx) = oneshot::channel();
        self.ctl_tx
            .send(Control::Shutdown { reply: tx })
            .await
            .map_err(|_| Error::NotConnected)?;
        rx.await.map_err(|_| Error::NotConnected)
    }

    /// Subscribe to engine lifecycle events.
    ///
    /// Best-effort: a slow subscriber sees
    /// [`broadcast::error::RecvError::Lagged`] instead of old events.
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.event_tx.subscribe()
    }
}

impl Drop for AtChat {
    fn drop(&mut self) {
        // Channel closure stops the task once the last clone is gone;
        // the token lets anyone waiting inside the loop exit promptly.
        if self.ctl_tx.is_closed() {
            self.cancel.cancel();
        }
    }
}

/// A command accepted into the queue.
pub struct SubmittedCommand {
    id: CommandId,
    rx: oneshot::Receiver<Result<AtResponse>>,
}

impl SubmittedCommand {
    /// The id of this command, usable with [`AtChat::cancel`].
    pub fn id(&self) -> CommandId {
        self.id
    }

    /// Wait for the command to complete.
    pub async fn wait(self) -> Result<AtResponse> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(Error::NotConnected),
        }
    }
}

/// Receiver side of a notification registration.
pub struct Notifications {
    id: NotifyId,
    rx: mpsc::UnboundedReceiver<Notification>,
}

impl Notifications {
    /// The registration id, usable with
    /// [`AtChat::unregister_notification`].
    pub fn id(&self) -> NotifyId {
        self.id
    }

    /// The next notification, or `None` once the registration is gone
    /// (unregistered, one-shot consumed, or engine stopped).
    pub async fn next(&mut self) -> Option<Notification> {
        self.rx.recv().await
    }
}

/// Streamed intermediate lines of a listing submission.
pub struct Listing {
    rx: mpsc::UnboundedReceiver<Notification>,
}

impl Listing {
    /// The next entry, or `None` once the command has completed.
    pub async fn next(&mut self) -> Option<Notification> {
        self.rx.recv().await
    }
}

/// Normalize a transport failure on the write path.
fn write_error(e: Error) -> Error {
    match e {
        Error::Transport(_) => e,
        other => Error::Transport(other.to_string()),
    }
}

/// Sleep until the in-flight deadline, or forever when idle.
async fn deadline_sleep(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// The IO task: services control requests, submissions, the in-flight
/// deadline, and transport reads, in that priority order.
async fn io_loop(
    mut engine: Engine,
    mut ctl_rx: mpsc::Receiver<Control>,
    mut sub_rx: mpsc::Receiver<Submission>,
    cancel: CancellationToken,
) {
    debug!("chat engine started");
    let mut read_buf = [0u8; READ_CHUNK];

    loop {
        let deadline = engine.in_flight.as_ref().map(|inf| inf.deadline);

        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("chat engine cancelled");
                return;
            }

            ctl = ctl_rx.recv() => match ctl {
                Some(Control::Register { prefix, pdu, persistent, reply }) => {
                    let _ = reply.send(engine.register(prefix, pdu, persistent));
                }
                Some(Control::Unregister { id, reply }) => {
                    let _ = reply.send(engine.unregister(id));
                }
                Some(Control::UnregisterAll { reply }) => {
                    engine.registry.clear();
                    let _ = reply.send(());
                }
                Some(Control::Cancel { id, reply }) => {
                    let _ = reply.send(engine.cancel_one(id));
                }
                Some(Control::CancelAll { reply }) => {
                    engine.cancel_all();
                    let _ = reply.send(());
                }
                Some(Control::SetWireDebug { on, reply }) => {
                    engine.wire_debug = on;
                    let _ = reply.send(());
                }
                Some(Control::Suspend { reply }) => {
                    let _ = reply.send(engine.suspend());
                }
                Some(Control::Resume { transport, reply }) => {
                    let result = engine.resume(transport).await;
                    let _ = reply.send(result);
                }
                Some(Control::Shutdown { reply }) => {
                    engine.cancel_all();
                    let transport =
                        mem::replace(&mut engine.transport, Box::new(DetachedTransport));
                    let _ = reply.send(transport);
                    debug!("chat engine shut down");
                    return;
                }
                None => return,
            },

            sub = sub_rx.recv() => match sub {
                Some(sub) => engine.handle_submission(sub).await,
                None => return,
            },

            _ = deadline_sleep(deadline) => engine.handle_timeout().await,

            read = engine.poll_transport(&mut read_buf) => match read {
                Ok(n) if n > 0 => engine.process_incoming(&read_buf[..n]).await,
                Ok(_) => sleep(IDLE_DELAY).await,
                Err(Error::Timeout) => sleep(IDLE_DELAY).await,
                Err(e) => {
                    debug!(error = %e, "transport read failed");
                    engine.disconnect().await;
                }
            },
        }
    }
}

/// All state owned by the IO task.
struct Engine {
    transport: Box<dyn Transport>,
    syntax: Box<dyn Syntax>,
    terminators: TerminatorTable,
    command_timeout: Duration,
    wakeup: Option<WakeupConfig>,
    wire_debug: bool,
    event_tx: broadcast::Sender<ChatEvent>,
    queue: VecDeque<Submission>,
    in_flight: Option<InFlight>,
    registry: Vec<NotifyEntry>,
    /// Bytes of the unit currently being tokenized.
    unit_buf: BytesMut,
    pdu_binding: Option<PduBinding>,
    suspended: bool,
    /// Cleared by the first transport failure; submissions then fail
    /// with `NotConnected` while control requests keep working.
    alive: bool,
    /// Last successful write, for wakeup inactivity tracking.
    last_write: Option<Instant>,
    next_notify_id: u64,
}

impl Engine {
    /// Read from the transport, or park when there is nothing to read
    /// from (suspended or disconnected).
    async fn poll_transport(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.suspended || !self.alive {
            return std::future::pending().await;
        }
        self.transport.receive(buf, RECEIVE_TIMEOUT).await
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        if self.wire_debug {
            trace!(data = ?String::from_utf8_lossy(data), "tx");
        }
        self.transport.send(data).await?;
        self.last_write = Some(Instant::now());
        Ok(())
    }

    fn emit(&self, event: ChatEvent) {
        let _ = self.event_tx.send(event);
    }

    // --- submissions and dispatch ---

    async fn handle_submission(&mut self, sub: Submission) {
        if !self.alive {
            let _ = sub.reply.send(Err(Error::NotConnected));
            return;
        }
        if self.suspended {
            let _ = sub.reply.send(Err(Error::Suspended));
            return;
        }
        trace!(id = %sub.id, command = ?sub.command.text(), "command queued");
        self.queue.push_back(sub);
        self.try_dispatch().await;
    }

    /// Put the next queued command on the wire, preceded by a wakeup
    /// probe when the line has been quiet too long.
    async fn try_dispatch(&mut self) {
        if self.in_flight.is_some() || self.suspended || !self.alive || self.queue.is_empty() {
            return;
        }

        if let Some(wakeup) = self.wakeup.clone() {
            let quiet = self
                .last_write
                .map_or(true, |at| at.elapsed() > wakeup.inactivity);
            if quiet {
                self.start_wakeup(wakeup).await;
                return;
            }
        }

        if let Some(sub) = self.queue.pop_front() {
            self.start_command(sub).await;
        }
    }

    async fn start_command(&mut self, sub: Submission) {
        let wire = sub.command.to_wire();
        let segment_len = next_segment(&wire, 0).len();

        if sub.command.expects_short_prompt() {
            self.syntax.set_hint(SyntaxHint::ShortPrompt);
        }

        trace!(id = %sub.id, command = ?sub.command.text(), "dispatching");
        match self.write(&wire[..segment_len]).await {
            Ok(()) => {
                let timeout = sub
                    .command
                    .deadline_override()
                    .unwrap_or(self.command_timeout);
                self.in_flight = Some(InFlight {
                    id: sub.id,
                    command: sub.command,
                    wire,
                    written: segment_len,
                    deadline: Instant::now() + timeout,
                    reply: Some(sub.reply),
                    listing: sub.listing,
                    pending_listing_line: None,
                    lines: Vec::new(),
                    pdu: None,
                    wakeup: false,
                });
            }
            Err(e) => {
                warn!(id = %sub.id, error = %e, "command write failed");
                let _ = sub.reply.send(Err(write_error(e)));
                self.disconnect().await;
            }
        }
    }

    async fn start_wakeup(&mut self, wakeup: WakeupConfig) {
        debug!(command = ?wakeup.text, "waking modem");
        let wire = wakeup.text.into_bytes();
        match self.write(&wire).await {
            Ok(()) => {
                let written = wire.len();
                self.in_flight = Some(InFlight {
                    id: CommandId::from_raw(0),
                    command: AtCommand::new(""),
                    wire,
                    written,
                    deadline: Instant::now() + wakeup.response_timeout,
                    reply: None,
                    listing: None,
                    pending_listing_line: None,
                    lines: Vec::new(),
                    pdu: None,
                    wakeup: true,
                });
            }
            Err(e) => {
                warn!(error = %e, "wakeup write failed");
                self.disconnect().await;
            }
        }
    }

    async fn handle_timeout(&mut self) {
        let Some(inf) = self.in_flight.take() else {
            return;
        };
        if matches!(self.pdu_binding, Some(PduBinding::Command)) {
            // A prefix line armed the tokenizer for a payload that never
            // arrived. Resync so the stale hint cannot eat the next
            // command's first line.
            self.pdu_binding = None;
            self.unit_buf.clear();
            self.syntax.reset();
        }

        if inf.wakeup {
            debug!("no wakeup response, continuing anyway");
        } else {
            warn!(id = %inf.id, command = ?inf.command.text(), "command timed out");
            if let Some(reply) = inf.reply {
                let _ = reply.send(Err(Error::Timeout));
            }
        }
        self.try_dispatch().await;
    }

    // --- cancellation ---

    fn cancel_one(&mut self, id: CommandId) -> Result<()> {
        if let Some(inf) = self.in_flight.as_mut() {
            if inf.id == id && !inf.wakeup {
                debug!(%id, "detaching in-flight command");
                if let Some(reply) = inf.reply.take() {
                    let _ = reply.send(Err(Error::Cancelled));
                }
                inf.listing = None;
                inf.pending_listing_line = None;
                return Ok(());
            }
        }

        if let Some(pos) = self.queue.iter().position(|sub| sub.id == id) {
            if let Some(sub) = self.queue.remove(pos) {
                let _ = sub.reply.send(Err(Error::Cancelled));
            }
            return Ok(());
        }

        Err(Error::InvalidParameter(format!("unknown command id: {id}")))
    }

    fn cancel_all(&mut self) {
        if let Some(inf) = self.in_flight.as_mut() {
            if !inf.wakeup {
                if let Some(reply) = inf.reply.take() {
                    let _ = reply.send(Err(Error::Cancelled));
                }
                inf.listing = None;
                inf.pending_listing_line = None;
            }
        }
        for sub in self.queue.drain(..) {
            let _ = sub.reply.send(Err(Error::Cancelled));
        }
    }

    // --- registry ---

    fn register(
        &mut self,
        prefix: String,
        pdu: bool,
        persistent: bool,
    ) -> Result<(NotifyId, mpsc::UnboundedReceiver<Notification>)> {
        if prefix.is_empty() {
            return Err(Error::InvalidParameter(
                "notification prefix must not be empty".into(),
            ));
        }
        let id = NotifyId::from_raw(self.next_notify_id);
        self.next_notify_id += 1;
        let (tx, rx) = mpsc::unbounded_channel();
        self.registry.push(NotifyEntry {
            id,
            prefix,
            pdu,
            persistent,
            tx,
        });
        Ok((id, rx))
    }

    fn unregister(&mut self, id: NotifyId) -> Result<()> {
        match self.registry.iter().position(|entry| entry.id == id) {
            Some(pos) => {
                self.registry.remove(pos);
                Ok(())
            }
            None => Err(Error::InvalidParameter(format!(
                "unknown notification id: {id}"
            ))),
        }
    }

    /// Route an unsolicited line to the best registration: longest
    /// matching prefix wins, ties to the earliest registration.
    fn dispatch_notification(&mut self, line: String) {
        loop {
            let mut best: Option<usize> = None;
            for (i, entry) in self.registry.iter().enumerate() {
                if !line.starts_with(&entry.prefix) {
                    continue;
                }
                match best {
                    Some(j) if entry.prefix.len() <= self.registry[j].prefix.len() => {}
                    _ => best = Some(i),
                }
            }

            let Some(i) = best else {
                debug!(line = %line, "dropping unmatched line");
                return;
            };

            if self.registry[i].pdu {
                // Delivery happens when the payload unit arrives.
                self.pdu_binding = Some(PduBinding::Notify {
                    id: self.registry[i].id,
                    line,
                });
                self.syntax.set_hint(SyntaxHint::Pdu);
                return;
            }

            let persistent = self.registry[i].persistent;
            let delivered = self.registry[i]
                .tx
                .send(Notification {
                    line: line.clone(),
                    pdu: None,
                })
                .is_ok();
            if delivered {
                if !persistent {
                    self.registry.remove(i);
                }
                return;
            }

            // Receiver dropped without unregistering: forget it and let
            // the next-best registration have the line.
            self.registry.remove(i);
        }
    }

    /// Deliver a notification whose pdu payload has now arrived.
    fn deliver_pdu_notification(&mut self, id: NotifyId, notification: Notification) {
        let Some(i) = self.registry.iter().position(|entry| entry.id == id) else {
            debug!(%id, "pdu notification unregistered before its payload");
            return;
        };
        let persistent = self.registry[i].persistent;
        let delivered = self.registry[i].tx.send(notification).is_ok();
        if !delivered || !persistent {
            self.registry.remove(i);
        }
    }

    // --- incoming data ---

    async fn process_incoming(&mut self, chunk: &[u8]) {
        if self.wire_debug {
            trace!(data = ?String::from_utf8_lossy(chunk), "rx");
        }

        let mut rest = chunk;
        while !rest.is_empty() {
            let (consumed, result) = self.syntax.feed(rest);
            self.unit_buf.extend_from_slice(&rest[..consumed]);
            rest = &rest[consumed..];

            match result {
                SyntaxResult::Unsure => {
                    if self.unit_buf.len() > MAX_UNIT {
                        warn!(
                            len = self.unit_buf.len(),
                            "oversized unit, dropping buffer to resync"
                        );
                        self.unit_buf.clear();
                        self.syntax.reset();
                    }
                }
                SyntaxResult::Line | SyntaxResult::MultiLine => {
                    let unit = mem::take(&mut self.unit_buf);
                    self.handle_line(&unit).await;
                }
                SyntaxResult::Pdu => {
                    let unit = mem::take(&mut self.unit_buf);
                    self.handle_pdu(&unit);
                }
                SyntaxResult::Prompt => {
                    self.unit_buf.clear();
                    self.handle_prompt().await;
                }
                SyntaxResult::Unrecognized => {
                    let unit = mem::take(&mut self.unit_buf);
                    debug!(data = ?String::from_utf8_lossy(&unit), "dropping unrecognized bytes");
                }
            }
        }
    }

    async fn handle_line(&mut self, unit: &[u8]) {
        let line = String::from_utf8_lossy(strip_framing(unit)).into_owned();
        if line.is_empty() {
            return;
        }

        if line.starts_with("AT") {
            trace!(line = %line, "dropping echo");
            return;
        }

        if let Some(final_response) = self.terminators.classify(&line) {
            if self.in_flight.is_some() {
                self.complete_in_flight(final_response).await;
            } else {
                // Final with nothing on the wire: NO CARRIER after a
                // remote hangup and the like. Offer it as unsolicited.
                self.dispatch_notification(line);
            }
            return;
        }

        let matched = match &self.in_flight {
            Some(inf) => !inf.wakeup && inf.command.matches_prefix(&line),
            None => false,
        };
        if matched {
            self.accept_intermediate(line);
            return;
        }

        self.dispatch_notification(line);
    }

    fn accept_intermediate(&mut self, line: String) {
        let Some(inf) = self.in_flight.as_mut() else {
            return;
        };

        if inf.command.expects_pdu() {
            self.pdu_binding = Some(PduBinding::Command);
            self.syntax.set_hint(SyntaxHint::Pdu);
            if inf.listing.is_some() {
                inf.pending_listing_line = Some(line);
            } else {
                inf.lines.push(line);
            }
            return;
        }

        // The next line may continue this one without fresh framing.
        self.syntax.set_hint(SyntaxHint::MultiLine);
        match &inf.listing {
            Some(tx) => {
                let _ = tx.send(Notification { line, pdu: None });
            }
            None => inf.lines.push(line),
        }
    }

    fn handle_pdu(&mut self, unit: &[u8]) {
        let payload = String::from_utf8_lossy(strip_framing(unit)).into_owned();

        match self.pdu_binding.take() {
            Some(PduBinding::Command) => {
                let Some(inf) = self.in_flight.as_mut() else {
                    debug!("pdu payload with no command in flight");
                    return;
                };
                match inf.pending_listing_line.take() {
                    Some(line) => {
                        if let Some(tx) = &inf.listing {
                            let _ = tx.send(Notification {
                                line,
                                pdu: Some(payload),
                            });
                        }
                    }
                    None => inf.pdu = Some(payload),
                }
            }
            Some(PduBinding::Notify { id, line }) => {
                self.deliver_pdu_notification(
                    id,
                    Notification {
                        line,
                        pdu: Some(payload),
                    },
                );
            }
            None => debug!("dropping unbound pdu payload"),
        }
    }

    async fn handle_prompt(&mut self) {
        let segment: Vec<u8> = match self.in_flight.as_mut() {
            Some(inf) => {
                let segment = next_segment(&inf.wire, inf.written);
                if segment.is_empty() {
                    trace!(id = %inf.id, "prompt after command fully written");
                    return;
                }
                let segment = segment.to_vec();
                inf.written += segment.len();
                segment
            }
            None => {
                debug!("prompt with no command in flight");
                return;
            }
        };

        if let Err(e) = self.write(&segment).await {
            warn!(error = %e, "segment write failed");
            if let Some(inf) = self.in_flight.take() {
                if let Some(reply) = inf.reply {
                    let _ = reply.send(Err(write_error(e)));
                }
            }
            self.disconnect().await;
        }
    }

    async fn complete_in_flight(&mut self, final_response: FinalResponse) {
        let Some(inf) = self.in_flight.take() else {
            return;
        };
        if matches!(self.pdu_binding, Some(PduBinding::Command)) {
            self.pdu_binding = None;
        }
        if inf.pending_listing_line.is_some() {
            debug!(id = %inf.id, "listing line never got its payload");
        }

        let response = AtResponse {
            lines: inf.lines,
            final_response,
            pdu: inf.pdu,
        };

        if inf.wakeup {
            trace!(line = %response.final_response.line, "wakeup response consumed");
        } else if let Some(reply) = inf.reply {
            trace!(id = %inf.id, line = %response.final_response.line, "command completed");
            let _ = reply.send(Ok(response));
        } else {
            trace!(id = %inf.id, "discarding response of cancelled command");
        }

        self.try_dispatch().await;
    }

    // --- lifecycle ---

    fn suspend(&mut self) -> Result<Box<dyn Transport>> {
        if self.suspended {
            return Err(Error::Suspended);
        }
        if !self.alive {
            return Err(Error::NotConnected);
        }

        if let Some(inf) = self.in_flight.take() {
            if let Some(reply) = inf.reply {
                let _ = reply.send(Err(Error::Cancelled));
            }
        }
        self.unit_buf.clear();
        self.syntax.reset();
        self.pdu_binding = None;
        self.suspended = true;

        let transport = mem::replace(&mut self.transport, Box::new(DetachedTransport));
        debug!(queued = self.queue.len(), "engine suspended, transport handed out");
        self.emit(ChatEvent::Suspended);
        Ok(transport)
    }

    async fn resume(&mut self, transport: Box<dyn Transport>) -> Result<()> {
        if !self.suspended {
            return Err(Error::InvalidParameter(
                "engine is not suspended".into(),
            ));
        }

        self.transport = transport;
        self.suspended = false;
        self.unit_buf.clear();
        self.syntax.reset();
        debug!(queued = self.queue.len(), "engine resumed");
        self.emit(ChatEvent::Resumed);
        self.try_dispatch().await;
        Ok(())
    }

    /// Transport failure: fail everything, emit `Disconnected` once,
    /// and stop touching the wire. Control requests stay serviceable.
    async fn disconnect(&mut self) {
        if !self.alive {
            return;
        }
        self.alive = false;

        if let Some(inf) = self.in_flight.take() {
            if let Some(reply) = inf.reply {
                let _ = reply.send(Err(Error::ConnectionLost));
            }
        }
        for sub in self.queue.drain(..) {
            let _ = sub.reply.send(Err(Error::NotConnected));
        }
        self.pdu_binding = None;
        self.unit_buf.clear();

        let _ = self.transport.close().await;
        warn!("transport lost, chat engine stopped");
        self.emit(ChatEvent::Disconnected);
    }
}
