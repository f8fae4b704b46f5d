//! Bitshuffle demo
//!
//! Generates three typed datasets (monotonic int64 timestamps, a smooth
//! float32 signal, noisy u16 sensor counts), compresses each one raw and
//! bitshuffled with several codecs, then reads single blocks back out of a
//! container file to show block-level random access.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use flate2::write::GzEncoder;
use flate2::Compression as GzCompression;

use bitshuffle_cli::{Reader, Writer};
use bitshuffle_codecs::{codec_by_id, Lz4Codec, PassThroughCodec, ZstdCodec};
use bitshuffle_core::{
    bitshuffle, capabilities, compress, compress_bound, decompress, default_block_size, Codec,
};

// ── constants ──────────────────────────────────────────────────────────────

const ELEMENTS: usize = 2_000_000;

// ── data generators ────────────────────────────────────────────────────────

struct Dataset {
    name: &'static str,
    itemsize: usize,
    bytes: Vec<u8>,
}

/// Millisecond timestamps with small irregular gaps.
fn timestamps(n: usize) -> Dataset {
    let mut rng = 0x9E37_79B9_7F4A_7C15u64;
    let mut t = 1_740_268_800_000i64;
    let mut bytes = Vec::with_capacity(n * 8);
    for _ in 0..n {
        rng = lcg(rng);
        t += 10 + (rng >> 59) as i64;
        bytes.extend_from_slice(&t.to_le_bytes());
    }
    Dataset { name: "int64 timestamps", itemsize: 8, bytes }
}

/// Sum of two slow sines, the way an instrument trace looks.
fn signal(n: usize) -> Dataset {
    let mut bytes = Vec::with_capacity(n * 4);
    for i in 0..n {
        let x = i as f32 * 0.001;
        let v = 100.0 * x.sin() + 3.0 * (x * 17.0).cos();
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    Dataset { name: "float32 signal", itemsize: 4, bytes }
}

/// Counts around a baseline with a few bits of noise.
fn sensor(n: usize) -> Dataset {
    let mut rng = 42u64;
    let mut bytes = Vec::with_capacity(n * 2);
    for _ in 0..n {
        rng = lcg(rng);
        let v = 1200u16 + (rng >> 58) as u16;
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    Dataset { name: "u16 sensor", itemsize: 2, bytes }
}

fn lcg(state: u64) -> u64 {
    state
        .wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407)
}

// ── timing ─────────────────────────────────────────────────────────────────

fn human_bytes(n: u64) -> String {
    const U: &[&str] = &["B", "KB", "MB", "GB"];
    let mut v = n as f64;
    let mut u = 0;
    while v >= 1024.0 && u < U.len() - 1 { v /= 1024.0; u += 1; }
    if u == 0 { format!("{n} B") } else { format!("{v:.2} {}", U[u]) }
}

fn fmt_duration(d: Duration) -> String {
    let ms = d.as_secs_f64() * 1000.0;
    if ms < 1.0 {
        format!("{:.1} µs", ms * 1000.0)
    } else if ms < 1000.0 {
        format!("{ms:.1} ms")
    } else {
        format!("{:.2} s", d.as_secs_f64())
    }
}

// ── compression helpers ────────────────────────────────────────────────────

fn gzip(raw: &[u8]) -> Result<Vec<u8>> {
    let mut enc = GzEncoder::new(Vec::new(), GzCompression::default());
    enc.write_all(raw)?;
    Ok(enc.finish()?)
}

/// One row: codec applied to the plain bytes vs. to the bitshuffled stream.
fn compare(ds: &Dataset, label: &str, codec: &dyn Codec) -> Result<()> {
    let n = ds.bytes.len() / ds.itemsize;
    let block_size = default_block_size(ds.itemsize);

    let t0 = Instant::now();
    let plain = codec.compress_block(&ds.bytes)?;
    let t_plain = t0.elapsed();

    let t0 = Instant::now();
    let stream = compress(&ds.bytes, n, ds.itemsize, block_size, codec)?;
    let t_shuf = t0.elapsed();

    let back = decompress(&stream, n, ds.itemsize, 0, codec)?;
    anyhow::ensure!(back == ds.bytes, "{label} round trip failed on {}", ds.name);
    let bound = compress_bound(n, ds.itemsize, block_size, codec)?;
    anyhow::ensure!(stream.len() <= bound, "stream exceeds its bound");

    print_row(ds, label, plain.len(), t_plain, stream.len(), t_shuf);
    Ok(())
}

fn print_row(ds: &Dataset, label: &str, plain: usize, t_plain: Duration, shuf: usize, t_shuf: Duration) {
    let raw = ds.bytes.len() as f64;
    println!(
        "  {:<12} {:>11} {:>7.2}x {:>9}   {:>11} {:>7.2}x {:>9}",
        label,
        human_bytes(plain as u64),
        raw / plain.max(1) as f64,
        fmt_duration(t_plain),
        human_bytes(shuf as u64),
        raw / shuf.max(1) as f64,
        fmt_duration(t_shuf),
    );
}

// ── demo runner ────────────────────────────────────────────────────────────

fn run() -> Result<()> {
    let caps = capabilities();
    println!();
    println!("  bitshuffle demo · backend {} · available [{}]",
        caps.backend_name, caps.available_backends.join(", "));
    println!();

    let datasets = [timestamps(ELEMENTS), signal(ELEMENTS), sensor(ELEMENTS)];

    for ds in &datasets {
        section(&format!("{} · {}", ds.name, human_bytes(ds.bytes.len() as u64)));
        println!("  {:<12} {:>11} {:>8} {:>9}   {:>11} {:>8} {:>9}",
            "codec", "plain", "ratio", "time", "bitshuffled", "ratio", "time");

        // Bitshuffle alone does not shrink anything; it only reorders.
        let n = ds.bytes.len() / ds.itemsize;
        let t0 = Instant::now();
        let shuffled = bitshuffle(&ds.bytes, n, ds.itemsize, 0)?;
        let t_shuffle = t0.elapsed();
        print_row(ds, "(none)", ds.bytes.len(), Duration::ZERO, shuffled.len(), t_shuffle);

        compare(ds, "lz4", &Lz4Codec)?;
        compare(ds, "zstd-3", &ZstdCodec::new(3))?;

        let t0 = Instant::now();
        let plain = gzip(&ds.bytes)?;
        let t_plain = t0.elapsed();
        let t0 = Instant::now();
        let shuf = gzip(&shuffled)?;
        let t_shuf = t0.elapsed();
        print_row(ds, "gzip", plain.len(), t_plain, shuf.len(), t_shuf);
        println!();
    }

    random_access(&datasets[0])?;
    Ok(())
}

/// Write a container, then pull individual blocks and element ranges back.
fn random_access(ds: &Dataset) -> Result<()> {
    section("block random access");
    let path = std::env::temp_dir().join("bshuf_demo.bshuf");
    let block_size = default_block_size(ds.itemsize);

    let t0 = Instant::now();
    let mut w = Writer::create(&path, Arc::new(Lz4Codec), ds.itemsize, block_size)?;
    for chunk in ds.bytes.chunks(1 << 20) {
        w.write(chunk)?;
    }
    let blocks = w.finish()?;
    println!("  wrote {} blocks to {:?} in {}", blocks, path, fmt_duration(t0.elapsed()));
    println!("  file size {}", human_bytes(file_size(&path)?));

    let header = Reader::read_header(&path)?;
    let mut reader = Reader::open(&path, codec_by_id(header.codec_id)?)?;

    let mut latencies = Vec::new();
    for i in 0..64usize {
        let idx = (i * 7919) % reader.block_count();
        let t0 = Instant::now();
        let block = reader.read_block(idx)?;
        latencies.push(t0.elapsed());
        let start = idx * block_size * ds.itemsize;
        anyhow::ensure!(block == ds.bytes[start..start + block.len()], "block {idx} differs");
    }
    latencies.sort();
    println!(
        "  read_block p50 {} · p99 {}",
        fmt_duration(latencies[latencies.len() / 2]),
        fmt_duration(latencies[latencies.len() * 99 / 100])
    );

    let (start, len) = (ELEMENTS / 3, 5000);
    let t0 = Instant::now();
    let range = reader.read_elements(start, len)?;
    println!("  read_elements({start}, {len}) in {}", fmt_duration(t0.elapsed()));
    anyhow::ensure!(
        range == ds.bytes[start * ds.itemsize..(start + len) * ds.itemsize],
        "element range differs"
    );

    let t0 = Instant::now();
    let all = reader.read_all()?;
    println!("  read_all ({}) with checksum in {}", human_bytes(all.len() as u64), fmt_duration(t0.elapsed()));

    // Framing overhead alone, no compressor in the way.
    let n = ds.bytes.len() / ds.itemsize;
    let stored = compress(&ds.bytes, n, ds.itemsize, block_size, &PassThroughCodec)?;
    println!("  passthrough framing overhead: {} bytes", stored.len() - ds.bytes.len());

    let _ = std::fs::remove_file(&path);
    Ok(())
}

// ── small helpers ──────────────────────────────────────────────────────────

fn section(title: &str) {
    println!("━━━ {title} {}", "━".repeat(70usize.saturating_sub(title.chars().count() + 5)));
}

fn file_size(path: &Path) -> Result<u64> {
    Ok(std::fs::metadata(path)?.len())
}

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
