use std::os::unix::fs::MetadataExt;

use drpc::{Call, ClientConnection, DrpcError, Status};
use tokio_util::sync::CancellationToken;

use crate::*;

/// A call comes back with the body echoed and the first sequence number.
#[tokio::test]
async fn test_echo_call() -> Result<()> {
    let ts = start_server()?;
    let client = ts.client().await?;
    let cancel = CancellationToken::new();

    let resp = client.send_msg(&cancel, echo("ping")).await?;
    assert_eq!(resp.sequence, 1);
    assert_eq!(resp.status(), Status::Success);
    assert_eq!(resp.body, b"ping");

    let resp = client.send_msg(&cancel, echo("pong")).await?;
    assert_eq!(resp.sequence, 2);
    assert_eq!(resp.body, b"pong");

    client.close().await?;
    ts.stop().await?;
    Ok(())
}

/// Bodies spanning many chunks arrive intact in both directions.
#[tokio::test]
async fn test_multi_chunk_body() -> Result<()> {
    let ts = start_server()?;
    let client = ts.client().await?;

    let body: Vec<u8> = (0..100_000u32).map(|i| (i % 253) as u8).collect();
    let resp = client
        .send_msg(
            &CancellationToken::new(),
            Call::new(TEST_MODULE, ECHO, body.clone()),
        )
        .await?;
    assert_eq!(resp.status(), Status::Success);
    assert_eq!(resp.body, body);

    client.close().await?;
    ts.stop().await?;
    Ok(())
}

/// Dispatch failures come back as statuses on a connection that stays usable.
#[tokio::test]
async fn test_error_statuses() -> Result<()> {
    let ts = start_server()?;
    let client = ts.client().await?;
    let cancel = CancellationToken::new();

    let resp = client
        .send_msg(&cancel, Call::new(TEST_MODULE + 1, ECHO, Vec::new()))
        .await?;
    assert_eq!(resp.status(), Status::UnknownModule);
    assert_eq!(resp.sequence, 1);

    let resp = client
        .send_msg(&cancel, Call::new(TEST_MODULE, 99, Vec::new()))
        .await?;
    assert_eq!(resp.status(), Status::UnknownMethod);
    assert_eq!(resp.sequence, 2);

    let resp = client
        .send_msg(&cancel, Call::new(TEST_MODULE, FAIL, Vec::new()))
        .await?;
    assert_eq!(resp.status(), Status::Failure);
    assert!(resp.body.is_empty());

    let resp = client.send_msg(&cancel, echo("still here")).await?;
    assert_eq!(resp.status(), Status::Success);
    assert_eq!(resp.sequence, 4);

    client.close().await?;
    ts.stop().await?;
    Ok(())
}

/// Closing and reconnecting starts the sequence over.
#[tokio::test]
async fn test_reconnect_restarts_sequence() -> Result<()> {
    let ts = start_server()?;
    let client = ts.client().await?;
    let cancel = CancellationToken::new();

    client.send_msg(&cancel, echo("a")).await?;
    client.send_msg(&cancel, echo("b")).await?;
    client.close().await?;
    client.close().await?;
    assert!(!client.is_connected().await);

    let err = client.send_msg(&cancel, echo("c")).await.unwrap_err();
    assert!(matches!(err, DrpcError::NotConnected));

    client.connect(&cancel).await?;
    let resp = client.send_msg(&cancel, echo("d")).await?;
    assert_eq!(resp.sequence, 1);

    client.close().await?;
    ts.stop().await?;
    Ok(())
}

/// Handlers see the kernel-reported credentials of the caller.
#[tokio::test]
async fn test_peer_credentials_reach_handler() -> Result<()> {
    let ts = start_server()?;
    // Files this process creates are owned by its effective uid.
    let my_uid = std::fs::metadata(ts.dir.path())?.uid();

    let client = ClientConnection::new(&ts.path);
    client.connect(&CancellationToken::new()).await?;
    let resp = client
        .send_msg(
            &CancellationToken::new(),
            Call::new(TEST_MODULE, PEER_UID, Vec::new()),
        )
        .await?;
    assert_eq!(resp.status(), Status::Success);
    assert_eq!(String::from_utf8(resp.body)?, my_uid.to_string());

    client.close().await?;
    ts.stop().await?;
    Ok(())
}
