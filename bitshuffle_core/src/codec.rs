/// External byte compressor used by the block pipeline.
///
/// Each `Codec` implementation:
/// - Is identified by a stable numeric `id()` that applications can store
///   next to a stream to pick the codec back up when decoding.
/// - Must compress/decompress individual blocks independently. No cross-block
///   state is permitted; blocks may be handled on different threads.
/// - Is told the exact decompressed size of every block and must fail if the
///   payload does not decode to exactly that many bytes.
pub trait Codec: Send + Sync {
    /// Stable codec ID.
    fn id(&self) -> u16;

    /// Human-readable codec name for CLI display.
    fn name(&self) -> &'static str;

    /// Compress a single independent block.
    fn compress_block(&self, raw: &[u8]) -> anyhow::Result<Vec<u8>>;

    /// Decompress a single block back to exactly `raw_len` bytes.
    fn decompress_block(&self, compressed: &[u8], raw_len: usize) -> anyhow::Result<Vec<u8>>;

    /// Worst-case compressed size of a `raw_len`-byte block.
    fn compress_bound(&self, raw_len: usize) -> usize;
}

// ── Codec IDs ──────────────────────────────────────────────────────────────

pub const CODEC_PASSTHROUGH: u16 = 0;
pub const CODEC_ZSTD: u16 = 1;
pub const CODEC_LZ4: u16 = 2;
