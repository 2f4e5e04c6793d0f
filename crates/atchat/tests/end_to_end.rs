//! End-to-end tests: the chat engine driving a scripted modem through a
//! real TCP connection.
//!
//! The in-process mock covers engine semantics; these cover the whole
//! stack, `TcpTransport` included, against `MockModemServer`.

use std::time::Duration;

use atchat::tcp::TcpTransport;
use atchat::{AtCommand, ChatBuilder, Error, FinalKind};
use atchat_test_harness::MockModemServer;

#[tokio::test]
async fn full_session_over_tcp() {
    let mut server = MockModemServer::new().await.unwrap();
    server.expect(b"ATE0\r", b"\r\nOK\r\n");
    server.expect(b"AT+CREG?\r", b"\r\n+CREG: 0,1\r\n\r\nOK\r\n");
    server.expect(b"AT+CPIN?\r", b"\r\n+CME ERROR: 10\r\n");
    let notifier = server.notifier();
    let addr = server.addr().to_string();
    server.start();

    let transport = TcpTransport::connect(&addr).await.unwrap();
    let chat = ChatBuilder::new()
        .command_timeout(Duration::from_secs(5))
        .build_with_transport(Box::new(transport));

    let response = chat.send(AtCommand::new("ATE0")).await.unwrap();
    assert!(response.success());
    assert!(response.lines.is_empty());

    let response = chat
        .send(AtCommand::new("AT+CREG?").prefix("+CREG:"))
        .await
        .unwrap();
    assert!(response.success());
    assert_eq!(response.lines, ["+CREG: 0,1"]);
    let mut fields = response.reader("+CREG:").unwrap();
    assert_eq!(fields.number(), Some(0));
    assert_eq!(fields.number(), Some(1));

    // SIM failure is a delivered response, not an Err.
    let response = chat.send(AtCommand::new("AT+CPIN?")).await.unwrap();
    assert!(!response.success());
    assert_eq!(response.final_response.kind, FinalKind::CmeError);
    assert_eq!(response.final_response.code, Some(10));

    // The script is exhausted; the server now relays pushed bytes.
    let mut ring = chat.register_notification("RING", true).await.unwrap();
    notifier.push(b"\r\nRING\r\n");
    let notification = ring.next().await.unwrap();
    assert_eq!(notification.line, "RING");

    drop(notifier);
    chat.shutdown().await.unwrap();
    server.wait().await.unwrap();
}

#[tokio::test]
async fn prompt_gated_sms_over_tcp() {
    let mut server = MockModemServer::new().await.unwrap();
    server.expect(b"AT+CMGS=\"+15551234567\"\r", b"\r\n> ");
    server.expect(b"hello\x1a", b"\r\n+CMGS: 42\r\n\r\nOK\r\n");
    let addr = server.addr().to_string();
    server.start();

    let transport = TcpTransport::connect(&addr).await.unwrap();
    let chat = ChatBuilder::new().build_with_transport(Box::new(transport));

    let response = chat
        .send(AtCommand::new("AT+CMGS=\"+15551234567\"\rhello").prefix("+CMGS:"))
        .await
        .unwrap();
    assert!(response.success());
    assert_eq!(
        response.reader("+CMGS:").and_then(|mut r| r.number()),
        Some(42)
    );

    chat.shutdown().await.unwrap();
    server.wait().await.unwrap();
}

#[tokio::test]
async fn silent_modem_times_out_over_tcp() {
    // No exchanges scripted: the server accepts the connection and says
    // nothing.
    let mut server = MockModemServer::new().await.unwrap();
    let addr = server.addr().to_string();
    server.start();

    let transport = TcpTransport::connect(&addr).await.unwrap();
    let chat = ChatBuilder::new()
        .command_timeout(Duration::from_millis(200))
        .build_with_transport(Box::new(transport));

    let err = chat.send(AtCommand::new("AT")).await.unwrap_err();
    assert!(matches!(err, Error::Timeout));

    chat.shutdown().await.unwrap();
    server.wait().await.unwrap();
}
