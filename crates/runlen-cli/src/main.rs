use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use runlen_core::{BufferPool, EncodePath, EncodePipeline, EncodeRunStats, EncoderConfig, MergeMode};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "runlen",
    version,
    about = "Parallel run-length encoder",
    long_about = "Encodes the concatenation of FILE... as (byte, count) pairs. \
                  Runs never continue from one file into the next."
)]
struct Cli {
    /// Input files, encoded in the order given.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Worker threads, or "auto" for one per CPU. 1 encodes sequentially.
    ///
    /// With more than one worker, a run longer than 255 bytes that crosses a
    /// chunk boundary may be split differently than with -j 1. The decoded
    /// bytes are the same; pass --canonical for byte-identical output.
    #[arg(short = 'j', long, default_value = "1", value_parser = parse_jobs)]
    jobs: usize,

    /// Bytes per chunk handed to a worker (suffixes K, M, G).
    #[arg(long, default_value = "4K", value_parser = parse_size)]
    chunk_size: usize,

    /// Re-split runs that overflow at chunk boundaries so the output is
    /// byte-identical to -j 1 for every worker count and chunk size.
    #[arg(long, default_value_t = false)]
    canonical: bool,

    /// Write encoded output here instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print a run summary to stderr.
    #[arg(long, default_value_t = false)]
    stats: bool,
}

fn main() {
    if let Err(error) = run() {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing()?;

    let merge_mode = if cli.canonical {
        MergeMode::Canonical
    } else {
        MergeMode::Lookback
    };
    let config = EncoderConfig::new(cli.chunk_size, cli.jobs).with_merge_mode(merge_mode);
    let pipeline = EncodePipeline::new(config)?;
    tracing::debug!(
        jobs = cli.jobs,
        chunk_size = cli.chunk_size,
        ?merge_mode,
        inputs = cli.inputs.len(),
        "starting encode"
    );

    let stats = match &cli.output {
        Some(path) => {
            let mut writer = BufWriter::new(File::create(path).map_err(|source| {
                runlen_core::RunlenError::Open {
                    path: path.clone(),
                    source,
                }
            })?);
            let stats = pipeline.encode_paths(&cli.inputs, &mut writer)?;
            writer.flush()?;
            stats
        }
        None => {
            let stdout = io::stdout();
            let mut writer = BufWriter::new(stdout.lock());
            let stats = pipeline.encode_paths(&cli.inputs, &mut writer)?;
            writer.flush()?;
            stats
        }
    };

    if cli.stats {
        print_summary(&cli.inputs, cli.output.as_deref(), &stats, pipeline.buffer_pool());
    }
    Ok(())
}

fn init_tracing() -> Result<(), Box<dyn std::error::Error>> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new("warn"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init()
        .map_err(|error| error as Box<dyn std::error::Error>)?;
    Ok(())
}

fn print_summary(
    inputs: &[PathBuf],
    output: Option<&Path>,
    stats: &EncodeRunStats,
    buffer_pool: &BufferPool,
) {
    let elapsed_secs = stats.elapsed.as_secs_f64().max(1e-6);
    let path = match stats.path {
        EncodePath::Sequential => "sequential",
        EncodePath::Parallel => "parallel",
    };
    let output = output
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "<stdout>".to_string());

    eprintln!("encode complete ({path})");
    eprintln!("  inputs: {}", inputs.len());
    eprintln!("  output: {output}");
    eprintln!("  elapsed: {}", format_duration(stats.elapsed));
    eprintln!("  input bytes: {}", format_bytes(stats.input_bytes_total));
    eprintln!("  output bytes: {}", format_bytes(stats.output_bytes_total));
    eprintln!("  output ratio: {:.3}x", stats.ratio());
    eprintln!(
        "  throughput: {}/s",
        format_rate(stats.input_bytes_total as f64 / elapsed_secs)
    );
    eprintln!(
        "  chunks: {} | runs: {} | boundary merges: {}",
        stats.chunks_total, stats.runs_written, stats.boundary_merges
    );

    if stats.workers.is_empty() {
        return;
    }

    let min_tasks = stats.workers.iter().map(|worker| worker.tasks_completed).min();
    let max_tasks = stats.workers.iter().map(|worker| worker.tasks_completed).max();
    eprintln!(
        "  scheduler: {} workers | task balance min/max {}/{}",
        stats.workers.len(),
        min_tasks.unwrap_or(0),
        max_tasks.unwrap_or(0),
    );
    for worker in &stats.workers {
        eprintln!(
            "    w{:02} tasks {:>6} | busy {:>8} | idle {:>8} | util {:>6.2}%",
            worker.worker_id,
            worker.tasks_completed,
            format_duration(worker.busy),
            format_duration(worker.idle),
            worker.utilization * 100.0,
        );
    }

    let pool = buffer_pool.metrics();
    eprintln!(
        "  buffer pool: created {} | recycled {} | dropped {}",
        pool.created, pool.recycled, pool.dropped
    );
}

fn parse_jobs(value: &str) -> Result<usize, String> {
    let trimmed = value.trim();
    if trimmed.eq_ignore_ascii_case("auto") {
        return Ok(num_cpus::get().max(1));
    }

    match trimmed.parse::<usize>() {
        Ok(0) => Err("job count must be at least 1".to_string()),
        Ok(jobs) => Ok(jobs),
        Err(_) => Err(format!("invalid job count: {value}")),
    }
}

fn parse_size(value: &str) -> Result<usize, String> {
    let trimmed = value.trim();
    let split_at = trimmed
        .find(|ch: char| !ch.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (num_part, suffix_part) = trimmed.split_at(split_at);
    if num_part.is_empty() {
        return Err(format!("invalid size: {value}"));
    }

    let base: usize = num_part
        .parse()
        .map_err(|_| format!("invalid size number: {value}"))?;
    let multiplier = match suffix_part.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1usize,
        "k" | "kb" => 1 << 10,
        "m" | "mb" => 1 << 20,
        "g" | "gb" => 1 << 30,
        other => return Err(format!("invalid size suffix '{other}' in '{value}'")),
    };

    match base.checked_mul(multiplier) {
        Some(0) => Err("size must be at least 1 byte".to_string()),
        Some(size) => Ok(size),
        None => Err(format!("size overflow: {value}")),
    }
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0usize;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.2} {}", UNITS[unit])
    }
}

fn format_rate(bytes_per_second: f64) -> String {
    if !bytes_per_second.is_finite() || bytes_per_second <= 0.0 {
        return "0 B".to_string();
    }
    format_bytes(bytes_per_second as u64)
}

fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let minutes = total_seconds / 60;
    let seconds = total_seconds % 60;

    if minutes > 0 {
        format!("{minutes:02}:{seconds:02}")
    } else {
        format!("{seconds}.{:03}s", duration.subsec_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sizes_with_suffixes() {
        assert_eq!(parse_size("4096"), Ok(4096));
        assert_eq!(parse_size("4K"), Ok(4096));
        assert_eq!(parse_size("2mb"), Ok(2 << 20));
        assert_eq!(parse_size(" 1G "), Ok(1 << 30));
        assert!(parse_size("0").is_err());
        assert!(parse_size("K").is_err());
        assert!(parse_size("12q").is_err());
    }

    #[test]
    fn parses_job_counts() {
        assert_eq!(parse_jobs("1"), Ok(1));
        assert_eq!(parse_jobs("16"), Ok(16));
        assert!(parse_jobs("auto").is_ok_and(|jobs| jobs >= 1));
        assert!(parse_jobs("0").is_err());
        assert!(parse_jobs("-2").is_err());
        assert!(parse_jobs("many").is_err());
    }

    #[test]
    fn formats_human_readable_values() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.00 MiB");
        assert_eq!(format_rate(f64::NAN), "0 B");
        assert_eq!(format_duration(Duration::from_millis(1_250)), "1.250s");
        assert_eq!(format_duration(Duration::from_secs(125)), "02:05");
    }

    #[test]
    fn tracing_init_reports_second_install() {
        let _ = init_tracing();
        assert!(init_tracing().is_err());
    }

    #[test]
    fn cli_defaults_select_sequential_lookback() {
        let cli = Cli::try_parse_from(["runlen", "a.bin"]).expect("parse");
        assert_eq!(cli.jobs, 1);
        assert_eq!(cli.chunk_size, 4096);
        assert!(!cli.canonical);
        assert!(cli.output.is_none());
        assert!(Cli::try_parse_from(["runlen"]).is_err());
        assert!(Cli::try_parse_from(["runlen", "-j", "0", "a.bin"]).is_err());
    }
}
