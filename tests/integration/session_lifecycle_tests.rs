//! Session lifecycle: open, close from every direction, and shutdown.

use std::time::Duration;

use serde_json::json;
use serial_test::serial;

use chunker_host::client::ClientFrame;
use chunker_host::registry::SHUTDOWN_CLOSE_CODE;
use chunker_host::session::{Session, SessionState, SPAWN_FAILURE_CODE};
use chunker_host::AppError;

use super::test_helpers::{command, TestHost, EXITING_ENGINE, RESPONSIVE_ENGINE, FRAME_TIMEOUT};

/// Concurrent closes run teardown once and agree on the first code.
#[tokio::test]
#[serial]
async fn close_is_idempotent() {
    let mut host = TestHost::new(RESPONSIVE_ENGINE);
    let session = Session::connect("idem", &host.ctx).await.expect("connect");
    assert_eq!(host.next_frame().await.frame, ClientFrame::Open);
    assert_eq!(session.state(), SessionState::Open);
    assert!(session.staging_dir().is_dir());
    assert!(host.ctx.registry.contains("idem").await);

    let (first, second) = tokio::join!(session.close(Some(4000)), session.close(Some(1)));
    assert_eq!(first, second);
    assert_eq!(session.close(None).await, first);

    let closing = host.next_frame().await;
    assert!(matches!(closing.frame, ClientFrame::Close { error: None, .. }));
    assert!(
        tokio::time::timeout(Duration::from_millis(300), host.frames.recv())
            .await
            .is_err(),
        "only one close notice is sent"
    );

    assert_eq!(session.state(), SessionState::Closed);
    assert!(!session.is_connected());
    assert!(session.is_worker_killed());
    assert!(!session.staging_dir().exists());
    assert!(host.ctx.registry.is_empty().await);
}

/// Commands delivered after close are dropped.
#[tokio::test]
#[serial]
async fn commands_after_close_are_dropped() {
    let mut host = TestHost::new(RESPONSIVE_ENGINE);
    let session = Session::connect("late", &host.ctx).await.expect("connect");
    host.next_frame().await;
    session.close(Some(0)).await;
    host.next_frame().await;

    session.deliver(command(json!({"type": "flow", "method": "cancel", "requestId": "r1"})));
    assert!(
        tokio::time::timeout(Duration::from_millis(300), host.frames.recv())
            .await
            .is_err()
    );
}

/// An engine that exits closes its session with the exit code.
#[tokio::test]
#[serial]
async fn engine_exit_closes_with_exit_code() {
    let mut host = TestHost::new(EXITING_ENGINE);
    let session = Session::connect("exits", &host.ctx).await.expect("connect");
    assert_eq!(host.next_frame().await.frame, ClientFrame::Open);

    assert_eq!(
        host.next_frame().await.frame,
        ClientFrame::Close { code: Some(3), error: None }
    );
    tokio::time::timeout(FRAME_TIMEOUT, session.closed())
        .await
        .expect("teardown finishes");
    assert!(!session.staging_dir().exists());
    assert!(host.ctx.registry.is_empty().await);
}

/// A client close event starts teardown immediately.
#[tokio::test]
#[serial]
async fn client_close_event_tears_down() {
    let mut host = TestHost::new(RESPONSIVE_ENGINE);
    let session = Session::connect("client-close", &host.ctx).await.expect("connect");
    host.next_frame().await;

    session.deliver(chunker_host::client::ClientEvent::Close { code: Some(1000) });
    assert_eq!(
        host.next_frame().await.frame,
        ClientFrame::Close { code: Some(1000), error: None }
    );
    tokio::time::timeout(FRAME_TIMEOUT, session.closed())
        .await
        .expect("teardown finishes");
    assert!(host.ctx.registry.is_empty().await);
}

/// A missing engine produces the spawn-failure close and no session.
#[tokio::test]
#[serial]
async fn spawn_failure_sends_sentinel_close() {
    let mut host = TestHost::without_engine();
    let err = Session::connect("nospawn", &host.ctx).await.expect_err("must fail");
    assert!(matches!(err, AppError::ExecutableNotFound(_)), "got {err}");

    let outbound = host.next_frame().await;
    assert_eq!(outbound.session, "nospawn");
    match outbound.frame {
        ClientFrame::Close { code, error } => {
            assert_eq!(code, Some(SPAWN_FAILURE_CODE));
            assert!(error.expect("error text").contains("executable not found"));
        }
        other => panic!("expected close, got {other:?}"),
    }

    assert!(host.ctx.registry.is_empty().await);
    assert!(!host.staging_root().join("nospawn").exists());
}

/// Ids that are not a single plain directory name never reach the
/// filesystem and get the spawn-failure close.
#[tokio::test]
#[serial]
async fn unsafe_session_ids_are_rejected() {
    let mut host = TestHost::new(RESPONSIVE_ENGINE);
    let sentinel = host.scratch.join("keep.txt");
    std::fs::write(&sentinel, b"keep").expect("sentinel");

    for id in ["..", "/x", "a/b", "a/../..", ".", ""] {
        let err = Session::connect(id, &host.ctx).await.expect_err(id);
        assert!(matches!(err, AppError::PathViolation(_)), "{id:?}: {err}");

        let outbound = host.next_frame().await;
        assert_eq!(outbound.session, id);
        assert!(
            matches!(outbound.frame, ClientFrame::Close { code: Some(SPAWN_FAILURE_CODE), error: Some(_) }),
            "{id:?}: {:?}",
            outbound.frame
        );
    }

    assert!(host.ctx.registry.is_empty().await);
    assert_eq!(std::fs::read(&sentinel).expect("sentinel survives"), b"keep");
    assert!(host.staging_root().is_dir());
    assert_eq!(std::fs::read_dir(host.staging_root()).expect("staging root").count(), 0);
}

/// A second connect for a live id is refused without disturbing the first.
#[tokio::test]
#[serial]
async fn duplicate_connect_is_rejected() {
    let mut host = TestHost::new(RESPONSIVE_ENGINE);
    let session = Session::connect("dup", &host.ctx).await.expect("connect");
    host.next_frame().await;

    let err = Session::connect("dup", &host.ctx).await.expect_err("duplicate");
    assert!(matches!(err, AppError::Protocol(_)));
    assert!(host.frames.try_recv().is_err(), "no frame for a rejected connect");
    assert_eq!(host.ctx.registry.len().await, 1);
    assert!(session.is_connected());

    session.close(Some(0)).await;
}

/// Shutdown closes every live session with the shutdown code.
#[tokio::test]
#[serial]
async fn registry_shutdown_closes_all_sessions() {
    let mut host = TestHost::new(RESPONSIVE_ENGINE);
    let first = Session::connect("one", &host.ctx).await.expect("connect one");
    let second = Session::connect("two", &host.ctx).await.expect("connect two");
    host.next_frame().await;
    host.next_frame().await;
    assert!(host.ctx.registry.contains("one").await);
    assert!(host.ctx.registry.contains("two").await);
    assert_eq!(host.ctx.registry.len().await, 2);

    assert_eq!(host.ctx.registry.shutdown().await, 2);

    let mut closed = Vec::new();
    for _ in 0..2 {
        let outbound = host.next_frame().await;
        assert_eq!(
            outbound.frame,
            ClientFrame::Close { code: Some(SHUTDOWN_CLOSE_CODE), error: None }
        );
        closed.push(outbound.session);
    }
    closed.sort();
    assert_eq!(closed, vec!["one", "two"]);

    assert!(host.ctx.registry.is_empty().await);
    assert!(!first.staging_dir().exists());
    assert!(!second.staging_dir().exists());
}
