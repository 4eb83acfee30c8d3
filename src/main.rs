//! obsbench -- concurrent put/append benchmark against object storage.
//!
//! Sweeps object sizes and thread counts, writing one CSV row per point.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use obsbench::bench::tracer::Tracer;
use obsbench::bench::{run_tag, Harness, KeyGenerator, Operation};
use obsbench::config::{Config, RangeConfig};
use obsbench::transport::memory::MemoryTransport;
use obsbench::ObsClient;

/// Command-line arguments for the benchmark.
#[derive(Parser, Debug)]
#[command(
    name = "obsbench",
    version,
    about = "Concurrent put/append benchmark for object storage"
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Operations to run (repeatable).
    #[arg(short, long, value_enum)]
    operation: Vec<Operation>,

    /// Object sizes as MIN:MAX in bytes.
    #[arg(long, value_parser = parse_range)]
    sizes: Option<(u64, u64)>,

    /// Thread counts as MIN:MAX.
    #[arg(long, value_parser = parse_range)]
    threads: Option<(u64, u64)>,

    /// Operations per thread.
    #[arg(short, long)]
    loops: Option<usize>,

    /// Total bytes per point; derives the loop count.
    #[arg(long)]
    volume_bytes: Option<u64>,

    /// CSV output path.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Key prefix (defaults to a timestamped run tag).
    #[arg(long)]
    key_prefix: Option<String>,

    /// Delete created objects after every point.
    #[arg(long, default_value_t = false)]
    cleanup: bool,

    /// Add per-op latency columns to the CSV.
    #[arg(long, default_value_t = false)]
    trace_latencies: bool,

    /// Simulated per-call latency of the in-process transport, in ms.
    #[arg(long)]
    latency_ms: Option<u64>,

    /// Print Prometheus metrics at exit.
    #[arg(long, default_value_t = false)]
    metrics: bool,
}

fn parse_range(s: &str) -> Result<(u64, u64), String> {
    let (min, max) = s
        .split_once(':')
        .ok_or_else(|| format!("expected MIN:MAX, got {s:?}"))?;
    let min = min.trim().parse().map_err(|e| format!("bad minimum {min:?}: {e}"))?;
    let max = max.trim().parse().map_err(|e| format!("bad maximum {max:?}: {e}"))?;
    Ok((min, max))
}

fn apply_cli(config: &mut Config, cli: &Cli) {
    let bench = &mut config.bench;
    if !cli.operation.is_empty() {
        bench.operations = cli.operation.clone();
    }
    if let Some((min, max)) = cli.sizes {
        bench.object_size = RangeConfig {
            min,
            max,
            ..bench.object_size
        };
    }
    if let Some((min, max)) = cli.threads {
        bench.threads = RangeConfig {
            min,
            max,
            ..bench.threads
        };
    }
    if let Some(loops) = cli.loops {
        bench.loop_count = loops;
    }
    if cli.volume_bytes.is_some() {
        bench.volume_bytes = cli.volume_bytes;
    }
    if let Some(output) = &cli.output {
        bench.output = output.display().to_string();
    }
    if cli.key_prefix.is_some() {
        bench.key_prefix = cli.key_prefix.clone();
    }
    bench.cleanup |= cli.cleanup;
    bench.trace_latencies |= cli.trace_latencies;
    if let Some(latency_ms) = cli.latency_ms {
        config.transport.latency_ms = latency_ms;
    }
}

fn run(config: &Config) -> anyhow::Result<()> {
    let transport = Arc::new(
        MemoryTransport::open(&config.transport).context("failed to open in-process transport")?,
    );
    transport.create_bucket(&config.endpoint.bucket_name);

    let client = ObsClient::new(config.endpoint.clone(), transport.clone())?;
    let prefix = config.bench.key_prefix.clone().unwrap_or_else(run_tag);
    info!(prefix = %prefix, output = %config.bench.output, "starting sweep");

    let harness = Harness::new(client, KeyGenerator::new(prefix)).with_cleanup(config.bench.cleanup);
    let tracer = Tracer::new(config.bench.trace_latencies);
    let result = harness.run_sweep(&config.bench, &tracer, Path::new(&config.bench.output));
    harness.client().shutdown();

    if let Some(path) = &config.transport.snapshot_path {
        transport
            .save_snapshot(path)
            .with_context(|| format!("failed to save snapshot {path}"))?;
    }

    match result {
        Ok(rows) => {
            info!(rows = rows.len(), "sweep complete");
            Ok(())
        }
        Err(err) => {
            error!(code = err.code(), "benchmark failed");
            anyhow::bail!(err.diagnostic())
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    obsbench::init_tracing(&config.logging);
    apply_cli(&mut config, &cli);
    config.finalize()?;

    if cli.metrics {
        obsbench::metrics::init_metrics();
        obsbench::metrics::describe_metrics();
        info!("Prometheus metrics initialized");
    }

    let result = run(&config);

    if let Some(text) = obsbench::metrics::render() {
        println!("{text}");
    }
    result
}
