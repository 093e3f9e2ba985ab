// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use bytes::Bytes;
use mockito::{Matcher, Server};
use std::time::Duration;
use w3clog::error::TransferError;
use w3clog::transfer::{HttpTransferClient, HttpTransferConfig, RetryStrategy, TransferClient};

const PAYLOAD: &[u8] = b"{\"host\":\"web01\",\"url\":\"/\"}\n{\"host\":\"web01\",\"url\":\"/about\"}\n";

fn client(url: String, compression_level: Option<i32>, limit_kb: u64) -> HttpTransferClient {
    client_with_timeout(url, compression_level, limit_kb, Duration::from_secs(5))
}

fn client_with_timeout(
    url: String,
    compression_level: Option<i32>,
    limit_kb: u64,
    timeout: Duration,
) -> HttpTransferClient {
    HttpTransferClient::new(HttpTransferConfig {
        upload_url: format!("{url}/upload"),
        user: Some("ship".to_string()),
        password: Some("secret".to_string()),
        https_proxy: None,
        timeout,
        retry_strategy: RetryStrategy::Immediate(3),
        compression_level,
        limit_kb,
    })
    .expect("failed to create client")
}

#[tokio::test]
async fn transfer_puts_compressed_payload() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("PUT", "/upload/jsonlog/web01_W3SVC1_240510.log")
        .match_header("authorization", "Basic c2hpcDpzZWNyZXQ=")
        .match_header("content-type", "application/x-ndjson")
        .match_header("content-encoding", "zstd")
        .match_header("x-w3clog-length", PAYLOAD.len().to_string().as_str())
        .match_request(|req| {
            req.body()
                .ok()
                .and_then(|body| zstd::stream::decode_all(body.as_slice()).ok())
                .is_some_and(|decoded| decoded == PAYLOAD)
        })
        .with_status(201)
        .expect(1)
        .create_async()
        .await;

    let result = client(server.url(), Some(3), 0)
        .transfer(Bytes::from_static(PAYLOAD), "jsonlog/web01_W3SVC1_240510.log")
        .await;

    assert!(result.is_ok(), "{result:?}");
    mock.assert_async().await;
}

#[tokio::test]
async fn transfer_paced_uncompressed_payload() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("PUT", "/upload/jsonlog/web01_W3SVC1_240510.log")
        .match_header("content-encoding", Matcher::Missing)
        .match_body(PAYLOAD.to_vec())
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let result = client(server.url(), None, 200)
        .transfer(Bytes::from_static(PAYLOAD), "jsonlog/web01_W3SVC1_240510.log")
        .await;

    assert!(result.is_ok(), "{result:?}");
    mock.assert_async().await;
}

#[tokio::test]
async fn paced_transfer_may_outlast_the_base_timeout() {
    // 4 KiB at 1 KiB/s needs about three seconds on the wire
    let payload = Bytes::from(vec![b'x'; 4 * 1024]);
    let mut server = Server::new_async().await;
    let mock = server
        .mock("PUT", "/upload/jsonlog/a.log")
        .match_body(payload.to_vec())
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let client = client_with_timeout(server.url(), None, 1, Duration::from_secs(2));
    assert_eq!(
        client.deadline(payload.len()),
        Some(Duration::from_secs(3 * (2 + 3)))
    );

    let result = client.transfer(payload, "jsonlog/a.log").await;

    assert!(result.is_ok(), "{result:?}");
    mock.assert_async().await;
}

#[tokio::test]
async fn transfer_retries_server_errors() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("PUT", "/upload/jsonlog/a.log")
        .with_status(503)
        .expect(3)
        .create_async()
        .await;

    let err = client(server.url(), Some(3), 0)
        .transfer(Bytes::from_static(PAYLOAD), "jsonlog/a.log")
        .await
        .unwrap_err();

    assert!(!err.is_permanent());
    assert!(matches!(
        err,
        TransferError::Destination { status: Some(status), .. } if status.as_u16() == 503
    ));
    mock.assert_async().await;
}

#[tokio::test]
async fn transfer_does_not_retry_rejections() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("PUT", "/upload/jsonlog/a.log")
        .with_status(403)
        .with_body("forbidden")
        .expect(1)
        .create_async()
        .await;

    let err = client(server.url(), Some(3), 0)
        .transfer(Bytes::from_static(PAYLOAD), "jsonlog/a.log")
        .await
        .unwrap_err();

    assert!(err.is_permanent());
    assert!(err.to_string().contains("forbidden"));
    mock.assert_async().await;
}

#[tokio::test]
async fn transfer_to_unreachable_destination_fails() {
    let result = client("http://127.0.0.1:1".to_string(), None, 0)
        .transfer(Bytes::from_static(PAYLOAD), "jsonlog/a.log")
        .await;

    assert!(matches!(
        result,
        Err(TransferError::Destination { status: None, .. })
    ));
}
