#![no_main]

use libfuzzer_sys::fuzz_target;
use tinyrpc::config::MAX_FRAME_SIZE;
use tinyrpc::utils::compression::{CompressionType, CompressorRegistry};

fuzz_target!(|data: &[u8]| {
    let registry = CompressorRegistry::builtin();

    for tag in [
        CompressionType::GZIP,
        CompressionType::SNAPPY,
        CompressionType::ZLIB,
    ] {
        // Round trip must restore the input
        if let Ok(compressed) = registry.compress(tag, data) {
            let restored = registry.decompress(tag, &compressed, MAX_FRAME_SIZE);
            assert_eq!(restored.ok().as_deref(), Some(data));
        }

        // Malformed input must fail cleanly and respect the output cap
        let _ = registry.decompress(tag, data, MAX_FRAME_SIZE);
    }
});
