//! Example: an arithmetic service over TCP
//!
//! Starts a server with `Arith.Add`, `Arith.Mul` and `Arith.Div`, then calls
//! it from a client using snappy-compressed requests, both synchronously and
//! with concurrent background calls.
//!
//! Run with: `cargo run --example arith`

#![allow(clippy::uninlined_format_args)]

use serde::{Deserialize, Serialize};
use tinyrpc::config::{ClientConfig, LoggingConfig, ServerConfig};
use tinyrpc::utils::compression::CompressionType;
use tinyrpc::utils::logging::init_logging;
use tinyrpc::{Client, ProtocolError, Server};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

#[derive(Debug, Serialize, Deserialize)]
struct ArithRequest {
    a: i64,
    b: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct ArithResponse {
    c: i64,
}

fn arith_server() -> tinyrpc::Result<Server> {
    let server = Server::new(ServerConfig::default());
    server.register("Arith.Add", |req: ArithRequest| async move {
        Ok::<_, String>(ArithResponse { c: req.a + req.b })
    })?;
    server.register("Arith.Mul", |req: ArithRequest| async move {
        Ok::<_, String>(ArithResponse { c: req.a * req.b })
    })?;
    server.register("Arith.Div", |req: ArithRequest| async move {
        if req.b == 0 {
            return Err("divided is zero".to_string());
        }
        Ok(ArithResponse { c: req.a / req.b })
    })?;
    Ok(server)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging(&LoggingConfig::default())?;

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?.to_string();

    let server = arith_server()?;
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
    let serving =
        tokio::spawn(async move { server.serve_with_shutdown(listener, shutdown_rx).await });

    let config = ClientConfig::default().with_compression(CompressionType::SNAPPY);
    let client = Client::connect(&addr, config).await?;

    let sum: ArithResponse = client
        .call("Arith.Add", &ArithRequest { a: 20, b: 5 })
        .await?;
    println!("20 + 5 = {}", sum.c);

    match client
        .call::<_, ArithResponse>("Arith.Div", &ArithRequest { a: 20, b: 0 })
        .await
    {
        Err(ProtocolError::Remote(text)) => println!("20 / 0 -> server error: {}", text),
        other => println!("20 / 0 -> unexpected: {:?}", other.map(|r| r.c)),
    }

    let handles: Vec<_> = (1..=5)
        .map(|i| client.async_call::<_, ArithResponse>("Arith.Mul", ArithRequest { a: i, b: i }))
        .collect();
    for (i, handle) in (1..=5).zip(handles) {
        println!("{} * {} = {}", i, i, handle.await??.c);
    }

    client.close().await?;
    shutdown_tx.send(()).await?;
    serving.await??;
    Ok(())
}
