mod lz4_codec;
mod passthrough;
mod zstd_codec;

pub use lz4_codec::Lz4Codec;
pub use passthrough::PassThroughCodec;
pub use zstd_codec::ZstdCodec;

use bitshuffle_core::codec::{Codec, CODEC_LZ4, CODEC_PASSTHROUGH, CODEC_ZSTD};
use std::sync::Arc;

/// Resolve a codec from its on-disk `codec_id`.
///
/// Called by the CLI when opening an existing container, so the reader can be
/// initialized with the right codec automatically.
pub fn codec_by_id(id: u16) -> anyhow::Result<Arc<dyn Codec>> {
    match id {
        CODEC_PASSTHROUGH => Ok(Arc::new(PassThroughCodec)),
        CODEC_ZSTD => Ok(Arc::new(ZstdCodec::default())),
        CODEC_LZ4 => Ok(Arc::new(Lz4Codec)),
        _ => anyhow::bail!(
            "unknown codec id {}; supported: 0 (passthrough), 1 (zstd), 2 (lz4)",
            id
        ),
    }
}

/// Resolve a codec from its CLI name. `zstd_level` applies to zstd only.
pub fn codec_by_name(name: &str, zstd_level: i32) -> anyhow::Result<Arc<dyn Codec>> {
    match name.to_ascii_lowercase().as_str() {
        "passthrough" | "pass" | "none" => Ok(Arc::new(PassThroughCodec)),
        "zstd" | "z" => Ok(Arc::new(ZstdCodec::new(zstd_level))),
        "lz4" | "l" => Ok(Arc::new(Lz4Codec)),
        other => anyhow::bail!(
            "unknown codec '{}'. Valid options: passthrough, zstd, lz4",
            other
        ),
    }
}

/// Bitshuffle + LZ4 on the process-wide context.
pub fn compress_lz4(
    input: &[u8],
    n: usize,
    itemsize: usize,
    block_size: usize,
) -> bitshuffle_core::Result<Vec<u8>> {
    bitshuffle_core::compress(input, n, itemsize, block_size, &Lz4Codec)
}

pub fn decompress_lz4(
    input: &[u8],
    total_n: usize,
    itemsize: usize,
    block_size: usize,
) -> bitshuffle_core::Result<Vec<u8>> {
    bitshuffle_core::decompress(input, total_n, itemsize, block_size, &Lz4Codec)
}

/// Worst-case output size of [`compress_lz4`].
pub fn compress_lz4_bound(
    n: usize,
    itemsize: usize,
    block_size: usize,
) -> bitshuffle_core::Result<usize> {
    bitshuffle_core::compress_bound(n, itemsize, block_size, &Lz4Codec)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_and_names_agree() {
        for name in ["passthrough", "zstd", "lz4"] {
            let codec = codec_by_name(name, 3).unwrap();
            assert_eq!(codec.name(), name);
            assert_eq!(codec_by_id(codec.id()).unwrap().name(), name);
        }
        assert!(codec_by_id(9).is_err());
        assert!(codec_by_name("brotli", 3).is_err());
        assert_eq!(codec_by_name("Z", 19).unwrap().id(), CODEC_ZSTD);
        assert_eq!(codec_by_name("none", 3).unwrap().id(), CODEC_PASSTHROUGH);
    }

    #[test]
    fn codecs_roundtrip_and_respect_bound() {
        let raw: Vec<u8> = (0..5000u32).map(|i| (i.wrapping_mul(2654435761) >> 24) as u8).collect();
        for name in ["passthrough", "zstd", "lz4"] {
            let codec = codec_by_name(name, 3).unwrap();
            let packed = codec.compress_block(&raw).unwrap();
            assert!(packed.len() <= codec.compress_bound(raw.len()), "{name}");
            assert_eq!(codec.decompress_block(&packed, raw.len()).unwrap(), raw, "{name}");
        }
    }

    #[test]
    fn wrong_size_is_an_error() {
        let raw = vec![7u8; 256];
        for name in ["passthrough", "zstd", "lz4"] {
            let codec = codec_by_name(name, 3).unwrap();
            let packed = codec.compress_block(&raw).unwrap();
            assert!(codec.decompress_block(&packed, 300).is_err(), "{name}");
        }
    }

    #[test]
    fn lz4_helpers_roundtrip() {
        let input: Vec<u8> = (0..4000u32).flat_map(|v| v.to_le_bytes()).collect();
        let stream = compress_lz4(&input, 4000, 4, 256).unwrap();
        assert!(stream.len() <= compress_lz4_bound(4000, 4, 256).unwrap());
        assert!(stream.len() < input.len());
        assert_eq!(decompress_lz4(&stream, 4000, 4, 256).unwrap(), input);
    }
}
