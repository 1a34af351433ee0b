#![allow(clippy::unwrap_used)]

use tinyrpc::config::{ClientConfig, ServerConfig};
use tinyrpc::service::{Client, Server};
use tinyrpc::utils::compression::CompressionType;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stress_sequential_calls_large_series() {
    // Heavy burst over one connection, every payload size, no leaks in the tables
    let server = Server::new(ServerConfig::default());
    server
        .register("Blob.Len", |blob: Vec<u8>| async move {
            Ok::<_, String>(blob.len())
        })
        .unwrap();

    let (a, b) = tokio::io::duplex(256 * 1024);
    tokio::spawn(async move { server.serve_conn(b).await });
    let client = Client::new(
        a,
        ClientConfig::default().with_compression(CompressionType::SNAPPY),
    );

    for size in [0usize, 1, 64, 512, 4096, 65536, 1_048_576] {
        let rounds = if size >= 65536 { 20 } else { 1_000 };
        for _ in 0..rounds {
            let len: usize = client.call("Blob.Len", &vec![0u8; size]).await.unwrap();
            assert_eq!(len, size);
        }
    }
    assert_eq!(client.in_flight(), 0);
}
