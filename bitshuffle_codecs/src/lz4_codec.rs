use bitshuffle_core::codec::{Codec, CODEC_LZ4};
use lz4_flex::block::{compress, decompress, get_maximum_output_size};

/// LZ4 block codec.
///
/// Raw LZ4 blocks without a size prefix: the pipeline already knows every
/// block's decompressed size. Fastest decode of the bundled codecs, and the
/// pairing bitshuffle is usually deployed with.
pub struct Lz4Codec;

impl Codec for Lz4Codec {
    fn id(&self) -> u16 {
        CODEC_LZ4
    }

    fn name(&self) -> &'static str {
        "lz4"
    }

    fn compress_block(&self, raw: &[u8]) -> anyhow::Result<Vec<u8>> {
        Ok(compress(raw))
    }

    fn decompress_block(&self, compressed: &[u8], raw_len: usize) -> anyhow::Result<Vec<u8>> {
        let raw = decompress(compressed, raw_len)
            .map_err(|e| anyhow::anyhow!("lz4 decompress error: {}", e))?;
        if raw.len() != raw_len {
            anyhow::bail!("lz4 block decoded to {} bytes, expected {}", raw.len(), raw_len);
        }
        Ok(raw)
    }

    fn compress_bound(&self, raw_len: usize) -> usize {
        get_maximum_output_size(raw_len)
    }
}
