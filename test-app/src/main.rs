// atchat test application -- CLI tool for exercising a modem's AT command
// port over a serial device or a network bridge (ser2net, GSM gateway).
//
// Usage:
//   atchat-cli --port /dev/ttyUSB2 info
//   atchat-cli --port /dev/ttyUSB2 --baud 460800 cmd "AT+COPS?" --prefix "+COPS:"
//   atchat-cli --host 192.168.1.50:2000 cmd ATI
//   atchat-cli --port /dev/ttyUSB2 sms send +15551234567 "hello from atchat"
//   atchat-cli --port /dev/ttyUSB2 sms list
//   atchat-cli --port /dev/ttyUSB2 monitor --duration 120 --prefix "+CGREG:"
//   atchat-cli --port /dev/ttyUSB2 stress --count 200
//   atchat-cli --port /dev/ttyUSB2 ppp --apn internet --hold 5
//
// Set RUST_LOG=atchat=trace and pass --wire-debug to dump every byte on
// the wire.

use std::io::{self, Write};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail, ensure};
use clap::{Parser, Subcommand};
use tracing::debug;

use atchat::serial::SerialTransport;
use atchat::tcp::TcpTransport;
use atchat::{AtChat, AtCommand, ChatBuilder, ChatEvent, FinalKind, PermissiveSyntax, Transport};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// atchat test application -- exercises a modem from the command line.
#[derive(Parser)]
#[command(name = "atchat-cli", version, about)]
struct Cli {
    /// Serial port path of the modem's AT command channel
    /// (e.g. /dev/ttyUSB2, /dev/ttyACM0, COM3).
    #[arg(long)]
    port: Option<String>,

    /// TCP address of a network-exposed modem (e.g. 192.168.1.50:2000).
    /// Used instead of --port.
    #[arg(long)]
    host: Option<String>,

    /// Baud rate for the serial port.
    #[arg(long, default_value_t = 115_200)]
    baud: u32,

    /// Use the permissive line syntax instead of strict 27.007 framing.
    /// Needed for modems with sloppy CR/LF discipline.
    #[arg(long)]
    permissive: bool,

    /// Default per-command timeout in milliseconds.
    #[arg(long, default_value_t = 5_000)]
    timeout_ms: u64,

    /// Log every chunk read from and written to the transport at trace
    /// level (requires a matching RUST_LOG filter).
    #[arg(long)]
    wire_debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print modem identity, signal quality, and registration state.
    Info,

    /// Send a single AT command and print its response.
    Cmd {
        /// The command text, without trailing CR (e.g. "AT+COPS?").
        command: String,

        /// Response prefix to accept as intermediate lines (repeatable).
        #[arg(long)]
        prefix: Vec<String>,

        /// Override the default timeout for this command (milliseconds).
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// SMS operations.
    Sms {
        #[command(subcommand)]
        action: SmsAction,
    },

    /// Subscribe to unsolicited notifications and print them in real time.
    Monitor {
        /// Duration in seconds (0 = run until Ctrl-C).
        #[arg(long, default_value_t = 0)]
        duration: u64,

        /// Extra notification prefix to watch (repeatable). +CREG:,
        /// RING, and +CMT: are always registered.
        #[arg(long)]
        prefix: Vec<String>,
    },

    /// Stress test: rapid-fire command/response round trips.
    Stress {
        /// Number of round trips.
        #[arg(long, default_value_t = 100)]
        count: u32,

        /// Command to fire (default: plain AT).
        #[arg(long, default_value = "AT")]
        command: String,
    },

    /// Dial a data context, suspend the engine while the line carries
    /// PPP, then escape back and verify the command channel survived.
    Ppp {
        /// Access point name for PDP context 1.
        #[arg(long, default_value = "internet")]
        apn: String,

        /// Seconds to hold the suspended (data-mode) line.
        #[arg(long, default_value_t = 3)]
        hold: u64,
    },
}

#[derive(Subcommand)]
enum SmsAction {
    /// Send a text-mode SMS (with confirmation -- this sends a real SMS).
    Send {
        /// Destination number in international format (e.g. +15551234567).
        number: String,

        /// Message body.
        text: String,

        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },

    /// List stored messages (PDU mode, all statuses).
    List,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Prompt the user for y/N confirmation. Returns true only if "y" or "Y"
/// entered.
fn confirm(prompt: &str) -> bool {
    print!("{prompt}");
    io::stdout().flush().ok();
    let mut input = String::new();
    if io::stdin().read_line(&mut input).is_err() {
        return false;
    }
    matches!(input.trim(), "y" | "Y")
}

/// Print an AtResponse the way a terminal program would: intermediate
/// lines, then the final response line.
fn print_response(response: &atchat::AtResponse) {
    for line in &response.lines {
        println!("{line}");
    }
    if let Some(pdu) = &response.pdu {
        println!("{pdu}");
    }
    println!("{}", response.final_response.line);
}

/// Map a +CSQ RSSI index to dBm, per 27.007 table 8.69.
fn rssi_dbm(rssi: u32) -> Option<i32> {
    (rssi <= 31).then(|| -113 + 2 * rssi as i32)
}

/// Describe a +CREG <stat> value.
fn registration_state(stat: Option<u32>) -> &'static str {
    match stat {
        Some(0) => "not registered, not searching",
        Some(1) => "registered (home)",
        Some(2) => "searching",
        Some(3) => "registration denied",
        Some(4) => "unknown",
        Some(5) => "registered (roaming)",
        _ => "unparseable",
    }
}

// ---------------------------------------------------------------------------
// Engine construction
// ---------------------------------------------------------------------------

/// Validate option combinations that clap cannot express.
fn validate_options(cli: &Cli) -> Result<()> {
    match (&cli.port, &cli.host) {
        (None, None) => bail!("either --port or --host is required"),
        (Some(_), Some(_)) => bail!("--port and --host are mutually exclusive"),
        _ => Ok(()),
    }
}

/// Open the transport named on the command line and build the chat
/// engine around it.
async fn connect(cli: &Cli) -> Result<AtChat> {
    let transport: Box<dyn Transport> = if let Some(port) = &cli.port {
        let t = SerialTransport::open(port, cli.baud)
            .await
            .with_context(|| format!("failed to open serial port {} at {} baud", port, cli.baud))?;
        println!("Connected to {} at {} baud", port, cli.baud);
        Box::new(t)
    } else {
        let host = cli.host.as_deref().unwrap();
        let t = TcpTransport::connect(host)
            .await
            .with_context(|| format!("failed to connect to {host}"))?;
        println!("Connected to {host}");
        Box::new(t)
    };

    let mut builder = ChatBuilder::new().command_timeout(Duration::from_millis(cli.timeout_ms));
    if cli.permissive {
        debug!("using permissive syntax");
        builder = builder.syntax(Box::new(PermissiveSyntax::new()));
    }

    let chat = builder.build_with_transport(transport);
    if cli.wire_debug {
        chat.set_wire_debug(true).await?;
    }

    // Silence echo so prefix matching sees clean lines. An unresponsive
    // modem shows up here rather than mid-command.
    chat.send(AtCommand::new("ATE0"))
        .await
        .context("modem did not answer ATE0 (wrong port, or modem stuck in data mode?)")?;

    Ok(chat)
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn cmd_info(chat: &AtChat) -> Result<()> {
    for (label, cmd) in [
        ("Manufacturer", "AT+CGMI"),
        ("Model", "AT+CGMM"),
        ("Revision", "AT+CGMR"),
        ("IMEI", "AT+CGSN"),
    ] {
        let response = chat.send(AtCommand::new(cmd)).await?;
        if response.success() {
            println!("{label}: {}", response.lines.join(" "));
        } else {
            println!("{label}: <{}>", response.final_response.line);
        }
    }

    let response = chat.send(AtCommand::new("AT+CSQ").prefix("+CSQ:")).await?;
    match response.reader("+CSQ:").and_then(|mut r| r.number()) {
        Some(rssi) => match rssi_dbm(rssi) {
            Some(dbm) => println!("Signal: {dbm} dBm (rssi {rssi})"),
            None => println!("Signal: unknown"),
        },
        None => println!("Signal: <{}>", response.final_response.line),
    }

    let response = chat
        .send(AtCommand::new("AT+CREG?").prefix("+CREG:"))
        .await?;
    let stat = response.reader("+CREG:").and_then(|mut r| {
        r.skip(); // <mode>
        r.number()
    });
    println!("Network: {}", registration_state(stat));

    let response = chat
        .send(AtCommand::new("AT+COPS?").prefix("+COPS:"))
        .await?;
    if let Some(mut fields) = response.reader("+COPS:") {
        fields.skip(); // <mode>
        fields.skip(); // <format>
        if let Some(operator) = fields.string() {
            println!("Operator: {operator}");
        }
    }

    Ok(())
}

async fn cmd_cmd(
    chat: &AtChat,
    command: &str,
    prefixes: &[String],
    timeout_ms: Option<u64>,
) -> Result<()> {
    let mut at = AtCommand::new(command).prefixes(prefixes.iter().cloned());
    if let Some(ms) = timeout_ms {
        at = at.timeout(Duration::from_millis(ms));
    }

    let start = Instant::now();
    let response = chat.send(at).await?;
    let elapsed = start.elapsed();

    print_response(&response);
    println!(
        "({} in {:.1} ms)",
        if response.success() { "ok" } else { "failed" },
        elapsed.as_secs_f64() * 1000.0
    );
    Ok(())
}

async fn cmd_sms_send(chat: &AtChat, number: &str, text: &str, yes: bool) -> Result<()> {
    ensure!(
        !text.contains('\x1a') && !text.contains('\r'),
        "message body must not contain CR or Ctrl-Z"
    );

    if !yes && !confirm(&format!("Send SMS to {number}? [y/N] ")) {
        println!("Aborted.");
        return Ok(());
    }

    let response = chat.send(AtCommand::new("AT+CMGF=1")).await?;
    ensure!(response.success(), "modem refused text mode (AT+CMGF=1)");

    // One command: the body after the embedded CR is held back until the
    // "> " prompt arrives. Network submission can be slow.
    let response = chat
        .send(
            AtCommand::new(format!("AT+CMGS=\"{number}\"\r{text}"))
                .prefix("+CMGS:")
                .timeout(Duration::from_secs(30)),
        )
        .await?;

    if response.success() {
        match response.reader("+CMGS:").and_then(|mut r| r.number()) {
            Some(mr) => println!("Sent, message reference {mr}"),
            None => println!("Sent"),
        }
    } else {
        bail!("send failed: {}", response.final_response.line);
    }
    Ok(())
}

async fn cmd_sms_list(chat: &AtChat) -> Result<()> {
    let response = chat.send(AtCommand::new("AT+CMGF=0")).await?;
    ensure!(response.success(), "modem refused PDU mode (AT+CMGF=0)");

    let (mut listing, pending) = chat
        .send_listing(
            AtCommand::new("AT+CMGL=4")
                .prefix("+CMGL:")
                .expect_pdu()
                .timeout(Duration::from_secs(30)),
        )
        .await?;

    let mut count = 0u32;
    while let Some(entry) = listing.next().await {
        count += 1;
        let index = entry
            .reader("+CMGL:")
            .and_then(|mut r| r.number())
            .unwrap_or(0);
        println!("[{index}] {}", entry.line);
        if let Some(pdu) = &entry.pdu {
            println!("    {pdu}");
        }
    }

    let response = pending.wait().await?;
    ensure!(
        response.success(),
        "listing failed: {}",
        response.final_response.line
    );
    println!("{count} message(s).");
    Ok(())
}

async fn cmd_monitor(chat: &AtChat, duration_secs: u64, extra: &[String]) -> Result<()> {
    // Ask the modem to volunteer registration changes and route incoming
    // SMS to the terminal.
    chat.send(AtCommand::new("AT+CREG=1")).await?;
    chat.send(AtCommand::new("AT+CMGF=0")).await?;
    chat.send(AtCommand::new("AT+CNMI=2,2,0,0,0")).await?;

    let mut creg = chat.register_notification("+CREG:", true).await?;
    let mut ring = chat.register_notification("RING", true).await?;
    let mut cmt = chat.register_pdu_notification("+CMT:", true).await?;

    // Extra prefixes are funnelled through one channel so the select
    // below stays fixed-arity.
    let (extra_tx, mut extra_rx) = tokio::sync::mpsc::unbounded_channel();
    for prefix in extra {
        let mut notifications = chat.register_notification(prefix.clone(), true).await?;
        let tx = extra_tx.clone();
        let label = prefix.clone();
        tokio::spawn(async move {
            while let Some(n) = notifications.next().await {
                if tx.send((label.clone(), n)).is_err() {
                    break;
                }
            }
        });
    }
    drop(extra_tx);

    let mut events = chat.subscribe();

    println!("Monitoring unsolicited notifications (Ctrl-C to stop)...");

    let deadline = (duration_secs > 0).then(|| Instant::now() + Duration::from_secs(duration_secs));

    loop {
        let timeout = match deadline {
            Some(dl) => {
                let remaining = dl.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    println!("Monitor duration elapsed.");
                    break;
                }
                remaining
            }
            None => Duration::from_secs(3600),
        };

        tokio::select! {
            _ = tokio::time::sleep(timeout) => {
                if deadline.is_some() {
                    println!("Monitor duration elapsed.");
                    break;
                }
            }
            Some(n) = creg.next() => {
                let stat = n.reader("+CREG:").and_then(|mut r| r.number());
                println!("[registration] {} ({})", n.line, registration_state(stat));
            }
            Some(n) = ring.next() => {
                println!("[call] {}", n.line);
            }
            Some(n) = cmt.next() => {
                println!("[sms] {}", n.line);
                if let Some(pdu) = &n.pdu {
                    println!("      {pdu}");
                }
            }
            Some((label, n)) = extra_rx.recv() => {
                println!("[{label}] {}", n.line);
            }
            event = events.recv() => {
                match event {
                    Ok(ChatEvent::Disconnected) => {
                        println!("[engine] transport lost, stopping");
                        break;
                    }
                    Ok(other) => println!("[engine] {other:?}"),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        println!("[warning] missed {n} engine events (consumer too slow)");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    Ok(())
}

async fn cmd_stress(chat: &AtChat, count: u32, command: &str) -> Result<()> {
    println!("Stress test: {count} round trips of {command}");

    let mut success = 0u32;
    let mut failures = 0u32;
    let mut min = Duration::MAX;
    let mut max = Duration::ZERO;
    let start = Instant::now();

    for i in 1..=count {
        let sent = Instant::now();
        match chat.send(AtCommand::new(command)).await {
            Ok(response) if response.success() => {
                let rtt = sent.elapsed();
                min = min.min(rtt);
                max = max.max(rtt);
                success += 1;
            }
            Ok(response) => {
                eprintln!("[{i}/{count}] failed: {}", response.final_response.line);
                failures += 1;
            }
            Err(e) => {
                eprintln!("[{i}/{count}] error: {e}");
                failures += 1;
            }
        }
    }

    let elapsed = start.elapsed();
    println!("Completed in {:.2} s", elapsed.as_secs_f64());
    println!("  success:  {success}");
    println!("  failures: {failures}");
    if success > 0 {
        println!(
            "  latency:  min {:.1} ms / avg {:.1} ms / max {:.1} ms",
            min.as_secs_f64() * 1000.0,
            elapsed.as_secs_f64() * 1000.0 / success as f64,
            max.as_secs_f64() * 1000.0,
        );
    }
    Ok(())
}

async fn cmd_ppp(chat: &AtChat, apn: &str, hold_secs: u64) -> Result<()> {
    let response = chat
        .send(AtCommand::new(format!("AT+CGDCONT=1,\"IP\",\"{apn}\"")))
        .await?;
    ensure!(response.success(), "failed to define PDP context");

    println!("Dialing *99***1#...");
    let response = chat
        .send(AtCommand::new("ATD*99***1#").timeout(Duration::from_secs(90)))
        .await?;
    ensure!(
        response.final_response.kind == FinalKind::Connect,
        "dial failed: {}",
        response.final_response.line
    );
    println!("Carrier up: {}", response.final_response.line);

    let mut transport = chat.suspend().await?;
    println!("Engine suspended; the line is carrying PPP now.");

    // A real application would hand the transport to a PPP stack here.
    // We hold the link, then drop to command mode with the +++ escape
    // (one second of guard silence on each side).
    tokio::time::sleep(Duration::from_secs(hold_secs)).await;
    transport.send(b"+++").await?;
    tokio::time::sleep(Duration::from_secs(1)).await;

    chat.resume(transport).await?;
    println!("Engine resumed.");

    let response = chat.send(AtCommand::new("ATH")).await?;
    println!("Hangup: {}", response.final_response.line);

    let response = chat.send(AtCommand::new("AT")).await?;
    ensure!(response.success(), "modem unresponsive after resume");
    println!("Command channel is back.");
    Ok(())
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    validate_options(&cli)?;

    let chat = connect(&cli).await?;

    let result = match &cli.command {
        Command::Info => cmd_info(&chat).await,
        Command::Cmd {
            command,
            prefix,
            timeout_ms,
        } => cmd_cmd(&chat, command, prefix, *timeout_ms).await,
        Command::Sms { action } => match action {
            SmsAction::Send { number, text, yes } => cmd_sms_send(&chat, number, text, *yes).await,
            SmsAction::List => cmd_sms_list(&chat).await,
        },
        Command::Monitor { duration, prefix } => cmd_monitor(&chat, *duration, prefix).await,
        Command::Stress { count, command } => cmd_stress(&chat, *count, command).await,
        Command::Ppp { apn, hold } => cmd_ppp(&chat, apn, *hold).await,
    };

    chat.shutdown().await.ok();
    result
}
