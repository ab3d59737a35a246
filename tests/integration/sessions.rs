use std::sync::Arc;
use std::time::{Duration, Instant};

use drpc::{DrpcError, Status};
use tokio_util::sync::CancellationToken;

use crate::*;

/// Each accepted connection is tracked until its client goes away.
#[tokio::test]
async fn test_session_table_tracks_clients() -> Result<()> {
    let ts = start_server()?;
    let a = ts.client().await?;
    let b = ts.client().await?;

    wait_until("two sessions", || ts.server.session_count() == 2).await?;

    a.close().await?;
    wait_until("one session", || ts.server.session_count() == 1).await?;

    let resp = b.send_msg(&CancellationToken::new(), echo("b")).await?;
    assert_eq!(resp.body, b"b");

    b.close().await?;
    wait_until("no sessions", || ts.server.session_count() == 0).await?;
    ts.stop().await?;
    Ok(())
}

/// A slow call on one session does not hold up calls on another.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sessions_run_concurrently() -> Result<()> {
    let ts = start_server()?;
    let slow = Arc::new(ts.client().await?);
    let fast = ts.client().await?;

    let slow_call = {
        let slow = slow.clone();
        tokio::spawn(async move { slow.send_msg(&CancellationToken::new(), slow_echo(600)).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = Instant::now();
    let resp = fast.send_msg(&CancellationToken::new(), echo("quick")).await?;
    assert_eq!(resp.status(), Status::Success);
    assert!(
        started.elapsed() < Duration::from_millis(400),
        "fast call waited {:?} behind the slow one",
        started.elapsed()
    );

    let resp = slow_call.await??;
    assert_eq!(resp.status(), Status::Success);
    assert_eq!(resp.body, b"600");

    slow.close().await?;
    fast.close().await?;
    ts.stop().await?;
    Ok(())
}

/// Cancelling a call leaves that client disconnected; other sessions and the
/// server carry on.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancelled_call_drops_only_that_session() -> Result<()> {
    let ts = start_server()?;
    let doomed = ts.client().await?;
    let survivor = ts.client().await?;
    wait_until("two sessions", || ts.server.session_count() == 2).await?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancel.cancel();
        });
    }

    let started = Instant::now();
    let err = doomed.send_msg(&cancel, slow_echo(500)).await.unwrap_err();
    assert!(err.is_cancelled(), "expected cancellation, got {err:?}");
    assert!(started.elapsed() < Duration::from_millis(450));
    assert!(!doomed.is_connected().await);

    let err = doomed
        .send_msg(&CancellationToken::new(), echo("x"))
        .await
        .unwrap_err();
    assert!(matches!(err, DrpcError::NotConnected));

    let resp = survivor
        .send_msg(&CancellationToken::new(), echo("alive"))
        .await?;
    assert_eq!(resp.body, b"alive");

    // The abandoned session ends once its handler returns and the reply
    // finds nobody listening.
    wait_until("abandoned session to close", || ts.server.session_count() == 1).await?;

    survivor.close().await?;
    ts.stop().await?;
    Ok(())
}

/// A client that disappears mid-call does not disturb a call in flight on
/// another session.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_client_killed_during_other_call() -> Result<()> {
    let ts = start_server()?;
    let busy = Arc::new(ts.client().await?);
    let victim = ts.client().await?;

    let in_flight = {
        let busy = busy.clone();
        tokio::spawn(async move { busy.send_msg(&CancellationToken::new(), slow_echo(300)).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    drop(victim);

    let resp = in_flight.await??;
    assert_eq!(resp.status(), Status::Success);
    assert_eq!(resp.sequence, 1);

    wait_until("victim session to close", || ts.server.session_count() == 1).await?;

    busy.close().await?;
    ts.stop().await?;
    Ok(())
}

/// Blocking handlers on more sessions than there are runtime workers still
/// leave room for new connections and quick calls.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_blocked_handlers_do_not_starve_other_sessions() -> Result<()> {
    let ts = start_server()?;

    let mut busy = Vec::new();
    for _ in 0..4 {
        let client = Arc::new(ts.client().await?);
        let call = {
            let client = client.clone();
            tokio::spawn(async move { client.send_msg(&CancellationToken::new(), slow_echo(1000)).await })
        };
        busy.push((client, call));
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Connecting now also needs the accept loop to get a turn.
    let started = Instant::now();
    let idle = ts.client().await?;
    let resp = idle.send_msg(&CancellationToken::new(), echo("quick")).await?;
    assert_eq!(resp.status(), Status::Success);
    assert!(
        started.elapsed() < Duration::from_millis(500),
        "quick call waited {:?} behind blocked handlers",
        started.elapsed()
    );

    for (client, call) in busy {
        let resp = call.await??;
        assert_eq!(resp.body, b"1000");
        client.close().await?;
    }
    idle.close().await?;
    ts.stop().await?;
    Ok(())
}
