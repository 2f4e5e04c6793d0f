//! Basic modem interrogation example.
//!
//! Demonstrates connecting to a modem's AT command port, running the
//! usual init sequence, and reading identity, signal quality, and
//! network registration state.
//!
//! # Requirements
//!
//! - A cellular modem exposing an AT command port
//! - The serial port path adjusted for your system (e.g., `/dev/ttyUSB2`
//!   on a Qualcomm-based stick, `/dev/ttyACM0` for CDC-ACM modules)
//!
//! # Usage
//!
//! ```sh
//! cargo run -p atchat --example basic_info
//! ```

use std::time::Duration;

use atchat::serial::SerialTransport;
use atchat::{AtCommand, ChatBuilder};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Adjust this to match your system's AT port.
    let serial_port = "/dev/ttyUSB2";

    println!("Connecting to modem on {}...", serial_port);

    let transport = SerialTransport::open(serial_port, 115_200).await?;
    let chat = ChatBuilder::new()
        .command_timeout(Duration::from_secs(2))
        .build_with_transport(Box::new(transport));

    // Kill echo so responses come back clean.
    chat.send(AtCommand::new("ATE0")).await?;

    // Identity: manufacturer, model, revision.
    for (label, cmd) in [
        ("Manufacturer", "AT+CGMI"),
        ("Model", "AT+CGMM"),
        ("Revision", "AT+CGMR"),
    ] {
        let response = chat.send(AtCommand::new(cmd)).await?;
        if response.success() {
            println!("{}: {}", label, response.lines.join(" "));
        } else {
            println!("{}: <{}>", label, response.final_response.line);
        }
    }

    // Signal quality: +CSQ: <rssi>,<ber>
    let response = chat.send(AtCommand::new("AT+CSQ").prefix("+CSQ:")).await?;
    if let Some(mut fields) = response.reader("+CSQ:") {
        match fields.number() {
            Some(99) => println!("Signal: unknown"),
            Some(rssi) => println!("Signal: {} dBm", -113 + 2 * rssi as i32),
            None => println!("Signal: unparseable"),
        }
    }

    // Registration: +CREG: <mode>,<stat>
    let response = chat
        .send(AtCommand::new("AT+CREG?").prefix("+CREG:"))
        .await?;
    if let Some(mut fields) = response.reader("+CREG:") {
        fields.skip(); // <mode>
        let state = match fields.number() {
            Some(1) => "registered (home)",
            Some(2) => "searching",
            Some(3) => "denied",
            Some(5) => "registered (roaming)",
            _ => "not registered",
        };
        println!("Network: {}", state);
    }

    // Shut down cleanly and recover the transport.
    chat.shutdown().await?;
    println!("\nDone.");
    Ok(())
}
