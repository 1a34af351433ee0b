//! End-to-end calls across every serializer and compression tag
//!
//! Client and server must agree on the serializer out of band; the compression
//! tag is chosen by the client and echoed by the server.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use serde::{Deserialize, Serialize};
use tinyrpc::config::{ClientConfig, ServerConfig};
use tinyrpc::core::serialization::Serializer;
use tinyrpc::error::ProtocolError;
use tinyrpc::service::{Client, Server};
use tinyrpc::utils::compression::CompressionType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Document {
    title: String,
    tags: Vec<String>,
    body: Vec<u8>,
}

const SERIALIZERS: [Serializer; 3] = [
    Serializer::Bincode,
    Serializer::Json,
    Serializer::MessagePack,
];

const COMPRESSIONS: [CompressionType; 4] = [
    CompressionType::RAW,
    CompressionType::GZIP,
    CompressionType::SNAPPY,
    CompressionType::ZLIB,
];

fn document() -> Document {
    Document {
        title: "Quarterly report".to_string(),
        tags: vec!["finance".to_string(), "q3".to_string()],
        body: b"lorem ipsum ".repeat(512),
    }
}

fn pair(serializer: Serializer, compression: CompressionType) -> Client {
    let server = Server::new(ServerConfig::default().with_serializer(serializer));
    server
        .register("Doc.Stamp", |mut doc: Document| async move {
            doc.tags.push("stamped".to_string());
            Ok::<_, String>(doc)
        })
        .unwrap();

    let (a, b) = tokio::io::duplex(64 * 1024);
    tokio::spawn(async move { server.serve_conn(b).await });

    let config = ClientConfig::default()
        .with_serializer(serializer)
        .with_compression(compression);
    Client::new(a, config)
}

#[tokio::test]
async fn test_every_serializer_and_compression() {
    for serializer in SERIALIZERS {
        for compression in COMPRESSIONS {
            let client = pair(serializer, compression);
            let stamped: Document = client
                .call("Doc.Stamp", &document())
                .await
                .unwrap_or_else(|e| panic!("{} / {}: {e}", serializer.name(), compression));

            let mut expected = document();
            expected.tags.push("stamped".to_string());
            assert_eq!(stamped, expected);
        }
    }
}

#[tokio::test]
async fn test_serializer_disagreement_is_reported() {
    let server = Server::new(ServerConfig::default().with_serializer(Serializer::Json));
    server
        .register("Doc.Stamp", |doc: Document| async move { Ok::<_, String>(doc) })
        .unwrap();
    let (a, b) = tokio::io::duplex(64 * 1024);
    tokio::spawn(async move { server.serve_conn(b).await });

    let client = Client::new(
        a,
        ClientConfig::default().with_serializer(Serializer::Bincode),
    );
    let err = client
        .call::<_, Document>("Doc.Stamp", &document())
        .await
        .unwrap_err();
    assert!(matches!(err, ProtocolError::Remote(_)));
}

#[test]
fn test_serializer_names() {
    assert_eq!(Serializer::default(), Serializer::Bincode);
    let names: Vec<_> = SERIALIZERS.iter().map(|s| s.name()).collect();
    assert_eq!(names, ["Bincode", "JSON", "MessagePack"]);
}
