use bitshuffle_core::codec::{Codec, CODEC_PASSTHROUGH};

/// No-op codec: stores blocks verbatim, with no compression.
///
/// Useful for checking the transpose and framing independently of any
/// compressor, and for measuring what the bitshuffle alone does to the data.
pub struct PassThroughCodec;

impl Codec for PassThroughCodec {
    fn id(&self) -> u16 {
        CODEC_PASSTHROUGH
    }

    fn name(&self) -> &'static str {
        "passthrough"
    }

    fn compress_block(&self, raw: &[u8]) -> anyhow::Result<Vec<u8>> {
        Ok(raw.to_vec())
    }

    fn decompress_block(&self, compressed: &[u8], raw_len: usize) -> anyhow::Result<Vec<u8>> {
        if compressed.len() != raw_len {
            anyhow::bail!("stored block is {} bytes, expected {}", compressed.len(), raw_len);
        }
        Ok(compressed.to_vec())
    }

    fn compress_bound(&self, raw_len: usize) -> usize {
        raw_len
    }
}
