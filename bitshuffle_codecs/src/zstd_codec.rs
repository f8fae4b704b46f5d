use bitshuffle_core::codec::{Codec, CODEC_ZSTD};

/// Zstandard block codec.
///
/// Each block is compressed independently with `zstd` at the configured level
/// (default: 3). Slower than LZ4 but usually smaller on bitshuffled data.
pub struct ZstdCodec {
    /// Compression level (1 = fast / larger, 22 = slow / smallest).
    pub level: i32,
}

impl Default for ZstdCodec {
    fn default() -> Self {
        Self { level: 3 }
    }
}

impl ZstdCodec {
    pub fn new(level: i32) -> Self {
        Self { level }
    }
}

impl Codec for ZstdCodec {
    fn id(&self) -> u16 {
        CODEC_ZSTD
    }

    fn name(&self) -> &'static str {
        "zstd"
    }

    fn compress_block(&self, raw: &[u8]) -> anyhow::Result<Vec<u8>> {
        let compressed = zstd::bulk::compress(raw, self.level)?;
        Ok(compressed)
    }

    fn decompress_block(&self, compressed: &[u8], raw_len: usize) -> anyhow::Result<Vec<u8>> {
        // Capacity is exact, so an oversized frame fails here.
        let raw = zstd::bulk::decompress(compressed, raw_len)?;
        if raw.len() != raw_len {
            anyhow::bail!("zstd block decoded to {} bytes, expected {}", raw.len(), raw_len);
        }
        Ok(raw)
    }

    fn compress_bound(&self, raw_len: usize) -> usize {
        zstd::zstd_safe::compress_bound(raw_len)
    }
}
