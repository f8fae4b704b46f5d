/// `.bshuf` container files: streaming writes, seek-based block reads,
/// checksums and rejection of damaged or hostile files.
use std::sync::Arc;

use bitshuffle_cli::container::MAGIC;
use bitshuffle_cli::{ContainerError, ContainerHeader, Reader, Writer};
use bitshuffle_codecs::{Lz4Codec, PassThroughCodec, ZstdCodec};
use bitshuffle_core::codec::CODEC_LZ4;
use bitshuffle_core::{default_block_size, BitshuffleError, StreamHeader};

fn pseudo_random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = seed;
    (0..len)
        .map(|_| {
            rng = rng
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (rng >> 56) as u8
        })
        .collect()
}

/// Slowly increasing little-endian u32 counters.
fn counters(n: usize, seed: u64) -> Vec<u8> {
    let steps = pseudo_random_bytes(n, seed);
    let mut v = 1_000_000u32;
    let mut out = Vec::with_capacity(n * 4);
    for s in steps {
        v += (s & 0x0f) as u32;
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("bshuf_cli_test_{}_{}.bshuf", std::process::id(), name))
}

#[test]
fn test_container_roundtrip() {
    let n = 10_000;
    let data = counters(n, 21);
    let path = temp_path("roundtrip");

    let mut w = Writer::create(&path, Arc::new(Lz4Codec), 4, 512).unwrap();
    // Odd-sized writes that split elements across calls.
    for chunk in data.chunks(1001) {
        w.write(chunk).unwrap();
    }
    let blocks = w.finish().unwrap();
    assert_eq!(blocks, 20); // 19 full + 1 partial

    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(&bytes[..8], MAGIC);

    let mut r = Reader::open(&path, Arc::new(Lz4Codec)).unwrap();
    assert_eq!(r.itemsize(), 4);
    assert_eq!(r.element_count(), n);
    assert_eq!(r.block_size(), 512);
    assert_eq!(r.block_count(), 20);
    assert_eq!(r.raw_size(), data.len() as u64);
    assert!(r.ratio() > 1.0);
    assert_eq!(r.read_all().unwrap(), data);

    assert_eq!(r.read_block(3).unwrap(), data[3 * 512 * 4..4 * 512 * 4]);
    assert_eq!(r.read_block(19).unwrap().len(), (n - 19 * 512) * 4);
    assert!(matches!(
        r.read_block(20),
        Err(ContainerError::Bitshuffle(BitshuffleError::BlockOutOfRange {
            index: 20,
            count: 20
        }))
    ));

    // Range spanning a block boundary.
    let range = r.read_elements(500, 100).unwrap();
    assert_eq!(range, data[500 * 4..600 * 4]);
    assert!(matches!(
        r.read_elements(n - 1, 2),
        Err(ContainerError::RangeOutOfBounds { .. })
    ));
    assert!(r.read_elements(n, 0).unwrap().is_empty());

    std::fs::remove_file(&path).ok();
}

#[test]
fn test_blocks_read_in_any_order_after_open() {
    let n = 4096;
    let data = counters(n, 5);
    let path = temp_path("seek_order");
    let mut w = Writer::create(&path, Arc::new(ZstdCodec::new(1)), 4, 256).unwrap();
    w.write(&data).unwrap();
    w.finish().unwrap();

    let mut r = Reader::open(&path, Arc::new(ZstdCodec::new(1))).unwrap();
    let file_len = std::fs::metadata(&path).unwrap().len();
    let payloads: u64 = r.record_sizes().iter().map(|&s| s as u64).sum();
    assert_eq!(payloads, r.compressed_size());
    assert_eq!(file_len, 32 + 12 + 4 * r.block_count() as u64 + payloads);

    // Backwards, then a repeat, so every read has to seek.
    for idx in (0..r.block_count()).rev().chain([7, 0, 7]) {
        let block = r.read_block(idx).unwrap();
        assert_eq!(block, data[idx * 256 * 4..(idx + 1) * 256 * 4], "block {idx}");
    }
    // Whole-file read still works after random access.
    assert_eq!(r.read_all().unwrap(), data);
    std::fs::remove_file(&path).ok();
}

#[test]
fn test_container_default_block_size() {
    let data = pseudo_random_bytes(3 * 5000, 8);
    let path = temp_path("default_bs");
    let mut w = Writer::create(&path, Arc::new(ZstdCodec::new(3)), 3, 0).unwrap();
    w.write(&data).unwrap();
    w.finish().unwrap();

    let mut r = Reader::open(&path, Arc::new(ZstdCodec::new(3))).unwrap();
    assert_eq!(r.block_size(), default_block_size(3));
    assert_eq!(r.read_all().unwrap(), data);
    std::fs::remove_file(&path).ok();
}

#[test]
fn test_container_checksum_mismatch() {
    let data = counters(2000, 13);
    let path = temp_path("checksum");
    let mut w = Writer::create(&path, Arc::new(PassThroughCodec), 4, 256).unwrap();
    w.write(&data).unwrap();
    w.finish().unwrap();

    // Flip one payload bit of the first record: 32-byte container header,
    // 12-byte stream header, 4-byte length prefix.
    let mut bytes = std::fs::read(&path).unwrap();
    bytes[32 + 12 + 4 + 10] ^= 0x01;
    std::fs::write(&path, &bytes).unwrap();

    let mut r = Reader::open(&path, Arc::new(PassThroughCodec)).unwrap();
    assert!(matches!(
        r.read_all(),
        Err(ContainerError::ChecksumMismatch { .. })
    ));
    std::fs::remove_file(&path).ok();
}

#[test]
fn test_container_rejects_bad_files() {
    let data = counters(100, 17);
    let path = temp_path("bad");
    let mut w = Writer::create(&path, Arc::new(Lz4Codec), 4, 64).unwrap();
    w.write(&data).unwrap();
    w.finish().unwrap();

    assert!(matches!(
        Reader::open(&path, Arc::new(PassThroughCodec)),
        Err(ContainerError::CodecMismatch { file: 2, provided: 0 })
    ));

    // Bad magic.
    let mut bytes = std::fs::read(&path).unwrap();
    bytes[0] = b'X';
    std::fs::write(&path, &bytes).unwrap();
    assert!(matches!(
        Reader::read_header(&path),
        Err(ContainerError::Invalid(_))
    ));

    // Shorter than a header.
    std::fs::write(&path, &bytes[..10]).unwrap();
    assert!(matches!(
        Reader::open(&path, Arc::new(Lz4Codec)),
        Err(ContainerError::Invalid(_))
    ));
    std::fs::remove_file(&path).ok();
}

#[test]
fn test_open_rejects_header_claiming_more_blocks_than_file_holds() {
    let path = temp_path("hostile");
    let container = ContainerHeader {
        version: 1,
        codec_id: CODEC_LZ4,
        itemsize: 1,
        checksum: 0,
        flags: 0,
    };
    for total_bytes in [1u64 << 40, u64::MAX - 7] {
        // Headers only, no records behind them.
        let stream = StreamHeader {
            total_bytes,
            block_size: 8,
        };
        let mut bytes = container.to_bytes().to_vec();
        bytes.extend_from_slice(&stream.to_bytes());
        std::fs::write(&path, &bytes).unwrap();

        match Reader::open(&path, Arc::new(Lz4Codec)) {
            Err(ContainerError::Bitshuffle(BitshuffleError::TruncatedStream {
                actual, ..
            })) => assert_eq!(actual, 12),
            Err(other) => panic!("expected TruncatedStream, got {other:?}"),
            Ok(_) => panic!("hostile header accepted"),
        }
    }
    std::fs::remove_file(&path).ok();
}

#[test]
fn test_writer_rejects_partial_element() {
    let path = temp_path("partial");
    let mut w = Writer::create(&path, Arc::new(Lz4Codec), 4, 64).unwrap();
    w.write(&[1, 2, 3, 4, 5, 6]).unwrap();
    assert!(matches!(
        w.finish(),
        Err(ContainerError::Bitshuffle(BitshuffleError::LengthMismatch { .. }))
    ));
    assert!(matches!(
        Writer::create(&path, Arc::new(Lz4Codec), 0, 64),
        Err(ContainerError::Bitshuffle(BitshuffleError::InvalidItemSize(0)))
    ));
    assert!(matches!(
        Writer::create(&path, Arc::new(Lz4Codec), 4, 20),
        Err(ContainerError::Bitshuffle(BitshuffleError::InvalidBlockSize(20)))
    ));
    std::fs::remove_file(&path).ok();
}
