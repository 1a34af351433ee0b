#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Edge-case tests for the codecs and the call facades
//! Covers error replies, corrupted bodies, frame limits, timeouts and teardown

use std::time::Duration;

use bytes::Bytes;
use futures::SinkExt;
use serde::{Deserialize, Serialize};
use tinyrpc::config::{ClientConfig, ServerConfig};
use tinyrpc::core::frame::{receive_frame, send_frame, split_stream};
use tinyrpc::core::header::{Header, RequestHeader, ResponseHeader};
use tinyrpc::core::serialization::Serializer;
use tinyrpc::error::ProtocolError;
use tinyrpc::service::{Client, Server};
use tinyrpc::utils::checksum;

#[derive(Debug, Serialize, Deserialize)]
struct DivArgs {
    a: i64,
    b: i64,
}

fn arith_server() -> Server {
    let server = Server::new(ServerConfig::default());
    server
        .register("Arith.Div", |args: DivArgs| async move {
            if args.b == 0 {
                Err("divide by zero")
            } else {
                Ok(args.a / args.b)
            }
        })
        .unwrap();
    server
        .register("Slow.Echo", |millis: u64| async move {
            tokio::time::sleep(Duration::from_millis(millis)).await;
            Ok::<_, String>(millis)
        })
        .unwrap();
    server
}

fn connect(server: &Server, config: ClientConfig) -> Client {
    let (a, b) = tokio::io::duplex(64 * 1024);
    let server = server.clone();
    tokio::spawn(async move { server.serve_conn(b).await });
    Client::new(a, config)
}

// ============================================================================
// REMOTE ERRORS
// ============================================================================

#[tokio::test]
async fn test_handler_error_surfaces_verbatim() {
    let client = connect(&arith_server(), ClientConfig::default());

    let err = client
        .call::<_, i64>("Arith.Div", &DivArgs { a: 1, b: 0 })
        .await
        .unwrap_err();
    match err {
        ProtocolError::Remote(text) => assert_eq!(text, "divide by zero"),
        other => panic!("expected remote error, got {other:?}"),
    }

    // The connection is still usable afterwards.
    let q: i64 = client
        .call("Arith.Div", &DivArgs { a: 9, b: 3 })
        .await
        .unwrap();
    assert_eq!(q, 3);
}

#[tokio::test]
async fn test_unknown_method_reply() {
    let client = connect(&arith_server(), ClientConfig::default());

    let err = client
        .call::<_, i64>("Arith.Pow", &(2, 8))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "rpc: can't find method Arith.Pow");

    let q: i64 = client
        .call("Arith.Div", &DivArgs { a: 8, b: 2 })
        .await
        .unwrap();
    assert_eq!(q, 4);
}

#[tokio::test]
async fn test_wrong_argument_type_is_answered_not_fatal() {
    let config = ClientConfig::default().with_serializer(Serializer::Json);
    let server = Server::new(ServerConfig::default().with_serializer(Serializer::Json));
    server
        .register("Arith.Div", |args: DivArgs| async move { Ok::<_, String>(args.a / args.b) })
        .unwrap();
    let client = connect(&server, config);

    let err = client
        .call::<_, i64>("Arith.Div", &"not an object")
        .await
        .unwrap_err();
    assert!(matches!(err, ProtocolError::Remote(_)));

    let q: i64 = client
        .call("Arith.Div", &DivArgs { a: 10, b: 5 })
        .await
        .unwrap();
    assert_eq!(q, 2);
}

// ============================================================================
// CORRUPTION AND LIMITS
// ============================================================================

#[tokio::test]
async fn test_corrupted_request_gets_error_reply_and_loop_continues() {
    let server = arith_server();
    let (a, b) = tokio::io::duplex(64 * 1024);
    let task = {
        let server = server.clone();
        tokio::spawn(async move { server.serve_conn(b).await })
    };
    let (mut reader, mut writer) = split_stream(a, 1024 * 1024);

    let body = Serializer::Bincode.marshal(&DivArgs { a: 6, b: 3 }).unwrap();
    let mut header = RequestHeader {
        method: "Arith.Div".to_string(),
        id: 40,
        request_len: body.len() as u32,
        checksum: checksum::checksum(&body) ^ 0xdead_beef,
        ..Default::default()
    };
    send_frame(&mut writer, header.marshal()).await.unwrap();
    send_frame(&mut writer, Bytes::from(body.clone())).await.unwrap();

    header.id = 41;
    header.checksum = checksum::checksum(&body);
    send_frame(&mut writer, header.marshal()).await.unwrap();
    send_frame(&mut writer, Bytes::from(body)).await.unwrap();
    writer.flush().await.unwrap();

    let mut replies = Vec::new();
    for _ in 0..2 {
        let mut response = ResponseHeader::default();
        response
            .unmarshal(&receive_frame(&mut reader).await.unwrap())
            .unwrap();
        let body = receive_frame(&mut reader).await.unwrap();
        replies.push((response, body));
    }
    replies.sort_by_key(|(h, _)| h.id);

    assert_eq!(replies[0].0.id, 40);
    assert!(replies[0].0.error.contains("Checksum mismatch"));
    assert!(replies[0].1.is_empty());

    assert_eq!(replies[1].0.id, 41);
    assert!(replies[1].0.error.is_empty());
    let q: i64 = Serializer::Bincode.unmarshal(&replies[1].1).unwrap();
    assert_eq!(q, 2);

    writer.close().await.unwrap();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_oversized_request_fails_locally() {
    let config = ClientConfig::default().with_max_frame_size(1024);
    let client = connect(&arith_server(), config);

    let err = client
        .call::<_, Vec<u8>>("Slow.Echo", &vec![7u8; 4096])
        .await
        .unwrap_err();
    assert!(matches!(err, ProtocolError::FrameTooLarge(_)));
    assert_eq!(client.in_flight(), 0);

    let echoed: u64 = client.call("Slow.Echo", &1u64).await.unwrap();
    assert_eq!(echoed, 1);
}

#[tokio::test]
async fn test_oversized_reply_answered_with_error() {
    let server = Server::new(ServerConfig::default().with_max_frame_size(1024));
    server
        .register("Blob.Make", |len: usize| async move { Ok::<_, String>(vec![7u8; len]) })
        .unwrap();
    let config = ClientConfig::default().with_request_timeout(Duration::from_secs(5));
    let client = connect(&server, config);

    let err = client
        .call::<_, Vec<u8>>("Blob.Make", &4096usize)
        .await
        .unwrap_err();
    match err {
        ProtocolError::Remote(text) => assert!(text.contains("Frame too large"), "{text}"),
        other => panic!("expected remote error, got {other:?}"),
    }

    let small: Vec<u8> = client.call("Blob.Make", &16usize).await.unwrap();
    assert_eq!(small, vec![7u8; 16]);
    assert_eq!(client.in_flight(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_raised_frame_limit_carries_large_bodies() {
    let limit = 64 * 1024 * 1024;
    let server = Server::new(ServerConfig::default().with_max_frame_size(limit));
    server
        .register("Blob.Len", |blob: Vec<u8>| async move { Ok::<_, String>(blob.len()) })
        .unwrap();
    let config = ClientConfig::default()
        .with_max_frame_size(limit)
        .with_request_timeout(Duration::from_secs(60));
    let client = connect(&server, config);

    let blob = vec![9u8; 20 * 1024 * 1024];
    let len: usize = client.call("Blob.Len", &blob).await.unwrap();
    assert_eq!(len, blob.len());
}

#[tokio::test]
async fn test_garbage_header_ends_connection() {
    let server = arith_server();
    let (a, b) = tokio::io::duplex(1024);
    let task = tokio::spawn(async move { server.serve_conn(b).await });
    let (mut reader, mut writer) = split_stream(a, 1024);

    send_frame(&mut writer, Bytes::from_static(&[0x00])).await.unwrap();
    writer.flush().await.unwrap();

    let result = task.await.unwrap();
    assert!(matches!(result, Err(ProtocolError::Decode(_))));
    assert!(matches!(
        receive_frame(&mut reader).await,
        Err(ProtocolError::ConnectionClosed)
    ));
}

// ============================================================================
// TIMEOUTS AND TEARDOWN
// ============================================================================

#[tokio::test]
async fn test_call_timeout_then_recovery() {
    let config = ClientConfig::default().with_request_timeout(Duration::from_millis(50));
    let client = connect(&arith_server(), config);

    let err = client.call::<_, u64>("Slow.Echo", &500u64).await.unwrap_err();
    assert!(matches!(err, ProtocolError::Timeout));
    assert_eq!(client.in_flight(), 0);

    let fast: u64 = client.call("Slow.Echo", &0u64).await.unwrap();
    assert_eq!(fast, 0);
}

#[tokio::test]
async fn test_server_gone_fails_outstanding_and_later_calls() {
    let (a, b) = tokio::io::duplex(1024);
    let client = Client::new(a, ClientConfig::default());

    let pending = client.async_call::<_, u64>("Slow.Echo", 1u64);
    tokio::time::sleep(Duration::from_millis(20)).await;
    drop(b);

    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err, ProtocolError::ConnectionClosed));

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(client.is_closed());
    assert!(matches!(
        client.call::<_, u64>("Slow.Echo", &1u64).await,
        Err(ProtocolError::ConnectionClosed)
    ));
}

#[tokio::test]
async fn test_close_refuses_new_calls() {
    let client = connect(&arith_server(), ClientConfig::default());
    let value: u64 = client.call("Slow.Echo", &3u64).await.unwrap();
    assert_eq!(value, 3);

    client.close().await.unwrap();
    assert!(client.is_closed());
    assert!(matches!(
        client.call::<_, u64>("Slow.Echo", &3u64).await,
        Err(ProtocolError::ConnectionClosed)
    ));
}

#[tokio::test]
async fn test_duplicate_registration_rejected() {
    let server = arith_server();
    let err = server
        .register("Arith.Div", |x: i64| async move { Ok::<_, String>(x) })
        .unwrap_err();
    assert!(matches!(err, ProtocolError::DuplicateMethod(name) if name == "Arith.Div"));
    assert_eq!(
        server.dispatcher().methods(),
        vec!["Arith.Div".to_string(), "Slow.Echo".to_string()]
    );
}
