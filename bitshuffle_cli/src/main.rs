use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use log::{info, LevelFilter};

use bitshuffle_cli::{Reader, Writer};
use bitshuffle_codecs::{codec_by_id, codec_by_name, Lz4Codec};
use bitshuffle_core::config::{ENV_BACKEND, ENV_THREADS};
use bitshuffle_core::{capabilities, default_block_size, Backend, Bitshuffle, PipelineConfig};

// ── CLI definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "bshuf",
    about = "Bitshuffle: bit-transpose typed binary data and compress it in independent blocks",
    version
)]
struct Cli {
    /// Log more (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Worker threads for block-parallel work (default: one per core)
    #[arg(long, global = true)]
    threads: Option<usize>,
    /// Force a transpose backend: scalar | wide8 | wide16 | wide32
    #[arg(long, global = true)]
    backend: Option<Backend>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bitshuffle and compress a file of fixed-size elements
    Compress {
        /// Source file ("-" reads stdin)
        input: PathBuf,
        /// Destination container file
        output: PathBuf,
        /// Bytes per element
        #[arg(short = 's', long)]
        itemsize: usize,
        /// Codec to use: passthrough | zstd | lz4
        #[arg(short, long, default_value = "lz4")]
        codec: String,
        /// Zstd compression level (1–22, only used with --codec zstd)
        #[arg(long, default_value_t = 3)]
        zstd_level: i32,
        /// Elements per block, a multiple of 8 (0 = default for the item size)
        #[arg(short, long, default_value_t = 0)]
        block_size: usize,
    },
    /// Decompress a container back to raw bytes
    Decompress {
        /// Source container file
        input: PathBuf,
        /// Destination file ("-" writes to stdout)
        output: PathBuf,
    },
    /// Print header metadata and per-block statistics
    Inspect {
        /// Container file to inspect
        file: PathBuf,
        /// Print per-block details
        #[arg(long)]
        blocks: bool,
    },
    /// Decompress a single block by index
    ReadBlock {
        /// Container file
        file: PathBuf,
        /// Zero-based block index to read
        #[arg(short, long)]
        index: usize,
        /// Write raw bytes to a file instead of printing a hex dump
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show the selected transpose backend and CPU capabilities
    Info {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Measure transpose and compression throughput on every available backend
    Bench {
        /// Bytes per element
        #[arg(short = 's', long, default_value_t = 4)]
        itemsize: usize,
        /// Elements to generate
        #[arg(short = 'n', long, default_value_t = 4_000_000)]
        elements: usize,
        /// Elements per block (0 = default for the item size)
        #[arg(short, long, default_value_t = 0)]
        block_size: usize,
        /// Fixed random seed for reproducibility
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
}

// ── Helpers ────────────────────────────────────────────────────────────────

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);
    // RUST_LOG still wins when set.
    builder.parse_env("RUST_LOG");
    let _ = builder.try_init();
}

fn open_reader(file: &PathBuf) -> anyhow::Result<Reader> {
    let header = Reader::read_header(file)
        .with_context(|| format!("reading container header of {:?}", file))?;
    let codec = codec_by_id(header.codec_id)?;
    let reader =
        Reader::open(file, codec).with_context(|| format!("opening container {:?}", file))?;
    Ok(reader)
}

fn human_bytes(n: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut v = n as f64;
    let mut unit = 0;
    while v >= 1024.0 && unit < UNITS.len() - 1 {
        v /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", n)
    } else {
        format!("{:.2} {}", v, UNITS[unit])
    }
}

fn throughput(bytes: u64, secs: f64) -> String {
    format!("{}/s", human_bytes((bytes as f64 / secs.max(1e-9)) as u64))
}

// ── Subcommand implementations ─────────────────────────────────────────────

fn run_compress(
    input: PathBuf,
    output: PathBuf,
    itemsize: usize,
    codec_name: &str,
    zstd_level: i32,
    block_size: usize,
) -> anyhow::Result<()> {
    let codec = codec_by_name(codec_name, zstd_level)?;
    let codec_display = codec.name().to_string();
    let block_size = if block_size == 0 {
        default_block_size(itemsize)
    } else {
        block_size
    };

    let mut writer = Writer::create(&output, codec, itemsize, block_size)
        .with_context(|| format!("creating output file {:?}", output))?;

    let t0 = Instant::now();
    let mut src: Box<dyn Read> = if input.to_str() == Some("-") {
        Box::new(io::stdin().lock())
    } else {
        Box::new(BufReader::new(
            File::open(&input).with_context(|| format!("opening input file {:?}", input))?,
        ))
    };
    let mut buf = vec![0u8; (block_size * itemsize).max(64 * 1024)];
    let mut bytes_read = 0u64;
    loop {
        let n = src.read(&mut buf)?;
        if n == 0 {
            break;
        }
        writer.write(&buf[..n])?;
        bytes_read += n as u64;
    }

    let block_count = writer
        .finish()
        .with_context(|| format!("input is not a whole number of {itemsize}-byte elements"))?;
    let elapsed = t0.elapsed();

    let compressed_size = std::fs::metadata(&output)?.len();
    let ratio = bytes_read as f64 / compressed_size.max(1) as f64;

    eprintln!("  codec       : {}", codec_display);
    eprintln!("  item size   : {} B", itemsize);
    eprintln!("  block size  : {} elements", block_size);
    eprintln!("  blocks      : {}", block_count);
    eprintln!("  raw size    : {}", human_bytes(bytes_read));
    eprintln!("  compressed  : {}", human_bytes(compressed_size));
    eprintln!("  ratio       : {:.2}x", ratio);
    eprintln!("  throughput  : {}", throughput(bytes_read, elapsed.as_secs_f64()));
    eprintln!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    Ok(())
}

fn run_decompress(input: PathBuf, output: PathBuf) -> anyhow::Result<()> {
    let mut reader = open_reader(&input)?;

    let t0 = Instant::now();
    let raw = reader
        .read_all()
        .with_context(|| format!("decompressing {:?}", input))?;
    let elapsed = t0.elapsed();

    if output.to_str() == Some("-") {
        io::stdout().lock().write_all(&raw)?;
    } else {
        std::fs::write(&output, &raw)
            .with_context(|| format!("writing output file {:?}", output))?;
    }

    eprintln!("  blocks      : {}", reader.block_count());
    eprintln!("  raw size    : {}", human_bytes(raw.len() as u64));
    eprintln!("  throughput  : {}", throughput(raw.len() as u64, elapsed.as_secs_f64()));
    eprintln!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    Ok(())
}

fn run_inspect(file: PathBuf, show_blocks: bool) -> anyhow::Result<()> {
    let reader = open_reader(&file)?;
    let codec = codec_by_id(reader.header.codec_id)?;
    let file_size = std::fs::metadata(&file)?.len();

    println!("=== bitshuffle container: {:?} ===", file);
    println!();
    println!("  format version : {}", reader.header.version);
    println!("  codec          : {} (id={})", codec.name(), reader.header.codec_id);
    println!("  item size      : {} B", reader.itemsize());
    println!("  elements       : {}", reader.element_count());
    println!("  block size     : {} elements", reader.block_size());
    println!("  block count    : {}", reader.block_count());
    println!("  raw size       : {}", human_bytes(reader.raw_size()));
    println!("  compressed     : {}", human_bytes(reader.compressed_size()));
    println!("  file on disk   : {}", human_bytes(file_size));
    println!("  ratio          : {:.2}x", reader.ratio());
    println!("  checksum       : {:016x}", reader.header.checksum);
    println!("  flags          : 0x{:016x}", reader.header.flags);

    if show_blocks {
        let block_raw = (reader.block_size() * reader.itemsize()) as u64;
        println!();
        println!("  {:>8}  {:>12}  {:>12}  {:>8}", "block", "compressed", "raw", "ratio");
        println!("  {}", "-".repeat(46));
        let sizes = reader.record_sizes();
        let last = sizes.len().saturating_sub(1);
        for (i, &size) in sizes.iter().enumerate() {
            let raw = if i == last {
                reader.raw_size() - block_raw * last as u64
            } else {
                block_raw
            };
            println!(
                "  {:>8}  {:>12}  {:>12}  {:>7.2}x",
                i,
                human_bytes(size as u64),
                human_bytes(raw),
                raw as f64 / size.max(1) as f64
            );
        }
    }

    Ok(())
}

fn run_read_block(file: PathBuf, index: usize, output: Option<PathBuf>) -> anyhow::Result<()> {
    let mut reader = open_reader(&file)?;

    let t0 = Instant::now();
    let raw = reader.read_block(index)?;
    let elapsed = t0.elapsed();

    eprintln!(
        "  decoded block {} ({}) in {:.3}ms",
        index,
        human_bytes(raw.len() as u64),
        elapsed.as_secs_f64() * 1000.0
    );

    match output {
        Some(path) => {
            std::fs::write(&path, &raw)?;
            eprintln!("  written to {:?}", path);
        }
        None => {
            // Hex dump of the first 256 bytes, one element group per line
            let preview = &raw[..raw.len().min(256)];
            println!("--- block {} ({} bytes, first {} shown) ---", index, raw.len(), preview.len());
            for (i, chunk) in preview.chunks(16).enumerate() {
                print!("  {:04x}  ", i * 16);
                for b in chunk {
                    print!("{:02x} ", b);
                }
                println!();
            }
            if raw.len() > 256 {
                println!("  ... ({} bytes remaining not shown)", raw.len() - 256);
            }
        }
    }

    Ok(())
}

fn run_info(json: bool) -> anyhow::Result<()> {
    let caps = capabilities();
    if json {
        println!("{}", serde_json::to_string_pretty(&caps)?);
        return Ok(());
    }
    println!("  backend    : {}", caps.backend_name);
    println!("  scalar     : {}", caps.scalar);
    println!("  available  : {}", caps.available_backends.join(", "));
    println!("  sse2       : {}", caps.sse2);
    println!("  avx2       : {}", caps.avx2);
    Ok(())
}

/// Slowly varying integers in little-endian order, the kind of data bitshuffle
/// is meant for.
fn bench_data(elements: usize, itemsize: usize, seed: u64) -> Vec<u8> {
    let mut rng = seed;
    let mut value = 0u64;
    let mut out = Vec::with_capacity(elements * itemsize);
    for _ in 0..elements {
        rng = rng
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        value = value.wrapping_add((rng >> 60) & 0x7);
        let bytes = value.to_le_bytes();
        for k in 0..itemsize {
            out.push(if k < 8 { bytes[k] } else { 0 });
        }
    }
    out
}

fn run_bench(
    itemsize: usize,
    elements: usize,
    block_size: usize,
    seed: u64,
    threads: Option<usize>,
) -> anyhow::Result<()> {
    let data = bench_data(elements, itemsize, seed);
    let block_size = if block_size == 0 {
        default_block_size(itemsize)
    } else {
        block_size
    };
    let raw_bytes = data.len() as u64;

    println!(
        "=== {} elements x {} B ({}), block size {} ===",
        elements,
        itemsize,
        human_bytes(raw_bytes),
        block_size
    );
    println!(
        "  {:>8}  {:>14}  {:>14}  {:>14}  {:>8}",
        "backend", "bitshuffle", "bitunshuffle", "lz4 compress", "ratio"
    );
    println!("  {}", "-".repeat(66));

    let mut reference: Option<Vec<u8>> = None;
    for backend in Backend::available() {
        let mut config = PipelineConfig::default().with_backend(backend);
        config.threads = threads;
        let ctx = Bitshuffle::new(config)?;

        let t0 = Instant::now();
        let shuffled = ctx.bitshuffle(&data, elements, itemsize, block_size)?;
        let t_shuffle = t0.elapsed().as_secs_f64();

        let t0 = Instant::now();
        let restored = ctx.bitunshuffle(&shuffled, elements, itemsize, block_size)?;
        let t_unshuffle = t0.elapsed().as_secs_f64();
        anyhow::ensure!(restored == data, "{backend} failed to restore the input");

        if let Some(expected) = &reference {
            anyhow::ensure!(&shuffled == expected, "{backend} disagrees with scalar output");
        } else {
            reference = Some(shuffled);
        }

        let t0 = Instant::now();
        let stream = ctx.compress(&data, elements, itemsize, block_size, &Lz4Codec)?;
        let t_compress = t0.elapsed().as_secs_f64();
        info!("{backend}: {} compressed bytes", stream.len());

        println!(
            "  {:>8}  {:>14}  {:>14}  {:>14}  {:>7.2}x",
            backend.name(),
            throughput(raw_bytes, t_shuffle),
            throughput(raw_bytes, t_unshuffle),
            throughput(raw_bytes, t_compress),
            raw_bytes as f64 / stream.len().max(1) as f64
        );
    }

    Ok(())
}

// ── Entry point ────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // The process-wide context reads these on first use.
    if let Some(threads) = cli.threads {
        std::env::set_var(ENV_THREADS, threads.to_string());
    }
    if let Some(backend) = cli.backend {
        std::env::set_var(ENV_BACKEND, backend.name());
    }

    match cli.command {
        Commands::Compress {
            input,
            output,
            itemsize,
            codec,
            zstd_level,
            block_size,
        } => run_compress(input, output, itemsize, &codec, zstd_level, block_size),
        Commands::Decompress { input, output } => run_decompress(input, output),
        Commands::Inspect { file, blocks } => run_inspect(file, blocks),
        Commands::ReadBlock {
            file,
            index,
            output,
        } => run_read_block(file, index, output),
        Commands::Info { json } => run_info(json),
        Commands::Bench {
            itemsize,
            elements,
            block_size,
            seed,
        } => run_bench(itemsize, elements, block_size, seed, cli.threads),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn bench_data_is_deterministic() {
        assert_eq!(bench_data(100, 4, 1), bench_data(100, 4, 1));
        assert_eq!(bench_data(10, 12, 7).len(), 120);
    }

    #[test]
    fn human_bytes_units() {
        assert_eq!(human_bytes(512), "512 B");
        assert_eq!(human_bytes(2048), "2.00 KB");
    }
}
