//! Example: body sizes across serializers and compression tags
//!
//! Encodes one request body the way the client codec would (serialize, then
//! compress) and prints the resulting size and checksum for every combination.
//!
//! Run with: `cargo run --example serialization_formats`

#![allow(clippy::uninlined_format_args)]

use serde::{Deserialize, Serialize};
use tinyrpc::config::MAX_FRAME_SIZE;
use tinyrpc::core::serialization::Serializer;
use tinyrpc::utils::checksum;
use tinyrpc::utils::compression::{CompressionType, CompressorRegistry};

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Order {
    id: u64,
    customer: String,
    lines: Vec<(String, u32)>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Body encoding sizes ===\n");

    let order = Order {
        id: 12455,
        customer: "ACME Corporation".to_string(),
        lines: (0..40).map(|i| (format!("SKU-{:04}", i), i * 3)).collect(),
    };
    let registry = CompressorRegistry::builtin();

    for serializer in [Serializer::Bincode, Serializer::Json, Serializer::MessagePack] {
        let body = serializer.marshal(&order)?;
        println!("{} ({} bytes serialized)", serializer.name(), body.len());

        for tag in [
            CompressionType::RAW,
            CompressionType::GZIP,
            CompressionType::SNAPPY,
            CompressionType::ZLIB,
        ] {
            let compressed = registry.compress(tag, &body)?;
            let restored = registry.decompress(tag, &compressed, MAX_FRAME_SIZE)?;
            let restored: Order = serializer.unmarshal(&restored)?;
            println!(
                "   - {:<10} {:>6} bytes  crc32 {:#010x}  roundtrip {}",
                tag.to_string(),
                compressed.len(),
                checksum::checksum(&compressed),
                if restored == order { "ok" } else { "FAILED" }
            );
        }
        println!();
    }

    Ok(())
}
