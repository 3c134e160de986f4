//! The line transport over in-memory pipes.

use serde_json::{json, Value};
use serial_test::serial;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use chunker_host::transport::serve;

use super::test_helpers::{TestHost, FRAME_TIMEOUT, RESPONSIVE_ENGINE};

fn lines(output: &str) -> Vec<Value> {
    output
        .lines()
        .map(|line| serde_json::from_str(line).expect("output line is json"))
        .collect()
}

/// End of input closes every session and flushes their close notices.
#[tokio::test]
#[serial]
async fn eof_closes_sessions_and_flushes() {
    let host = TestHost::new(RESPONSIVE_ENGINE);
    let (mut client_in, host_in) = tokio::io::duplex(64 * 1024);
    let (host_out, mut client_out) = tokio::io::duplex(64 * 1024);

    client_in
        .write_all(
            b"{\"session\":\"t1\",\"type\":\"connect\"}\n\
              not json\n\
              {\"session\":\"ghost\",\"type\":\"message\",\"data\":{}}\n",
        )
        .await
        .expect("write");
    drop(client_in);

    let registry = host.ctx.registry.clone();
    tokio::time::timeout(
        FRAME_TIMEOUT,
        serve(host_in, host_out, host.ctx, host.frames, CancellationToken::new()),
    )
    .await
    .expect("serve finishes")
    .expect("serve ok");

    let mut output = String::new();
    client_out.read_to_string(&mut output).await.expect("read");
    assert_eq!(
        lines(&output),
        vec![
            json!({"session": "t1", "type": "open"}),
            json!({"session": "t1", "type": "close", "code": 1}),
        ]
    );
    assert!(registry.is_empty().await);
}

/// Cancelling the shutdown token stops serving while input is still open.
#[tokio::test]
#[serial]
async fn shutdown_token_stops_serving() {
    let host = TestHost::new(RESPONSIVE_ENGINE);
    let (mut client_in, host_in) = tokio::io::duplex(64 * 1024);
    let (host_out, mut client_out) = tokio::io::duplex(64 * 1024);
    let shutdown = CancellationToken::new();

    let server = tokio::spawn(serve(host_in, host_out, host.ctx, host.frames, shutdown.clone()));

    client_in
        .write_all(b"{\"session\":\"t2\",\"type\":\"connect\"}\n")
        .await
        .expect("write");

    let mut first = Vec::new();
    loop {
        let mut byte = [0u8; 1];
        tokio::time::timeout(FRAME_TIMEOUT, client_out.read_exact(&mut byte))
            .await
            .expect("open frame arrives")
            .expect("read");
        if byte[0] == b'\n' {
            break;
        }
        first.push(byte[0]);
    }
    let open: Value = serde_json::from_slice(&first).expect("json");
    assert_eq!(open, json!({"session": "t2", "type": "open"}));

    shutdown.cancel();
    tokio::time::timeout(FRAME_TIMEOUT, server)
        .await
        .expect("serve finishes")
        .expect("join")
        .expect("serve ok");

    let mut rest = String::new();
    client_out.read_to_string(&mut rest).await.expect("read");
    assert_eq!(lines(&rest), vec![json!({"session": "t2", "type": "close", "code": 1})]);
    drop(client_in);
}
