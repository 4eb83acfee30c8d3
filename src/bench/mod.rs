//! Concurrent put/append benchmark.
//!
//! A sweep walks every (operation, object size, thread count) point. Each
//! point fans out scoped worker threads that issue `loop_count` blocking
//! operations apiece through one shared [`ObsClient`], then the merged
//! latencies are summarized by the [`tracer::Tracer`].

pub mod tracer;

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::client::ObsClient;
use crate::config::{BenchConfig, RangeConfig};
use crate::errors::ObsError;
use tracer::{BenchmarkRow, LatencySample, Tracer};

/// Benchmarked operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Put,
    Append,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Put => "put",
            Operation::Append => "append",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Benchmark failures.
#[derive(Debug, Error)]
pub enum BenchError {
    /// A worker's storage operation failed; the point was abandoned.
    #[error("{operation} benchmark with {threads} threads and {object_size} byte objects failed: {source}")]
    Operation {
        operation: Operation,
        threads: usize,
        object_size: u64,
        #[source]
        source: ObsError,
    },

    /// Results could not be written.
    #[error("failed to write results to {path}: {source}")]
    Output {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl BenchError {
    pub fn code(&self) -> &'static str {
        match self {
            BenchError::Operation { source, .. } => source.code(),
            BenchError::Output { .. } => "OutputError",
        }
    }

    /// Error line plus the storage diagnostic, when there is one.
    pub fn diagnostic(&self) -> String {
        match self {
            BenchError::Operation { source, .. } => {
                format!("{self}\n{}", source.diagnostic())
            }
            BenchError::Output { .. } => self.to_string(),
        }
    }
}

/// Values swept for a range: `min`, every power of the multiplier strictly
/// between `min` and `max`, then `max`.
pub fn expand_range(range: RangeConfig) -> Vec<u64> {
    let mut values = vec![range.min];
    if range.min >= range.max {
        return values;
    }
    let multiplier = range.multiplier.max(2);
    let mut power = 1u64;
    while power <= range.min {
        match power.checked_mul(multiplier) {
            Some(next) => power = next,
            None => break,
        }
    }
    while power > range.min && power < range.max {
        values.push(power);
        match power.checked_mul(multiplier) {
            Some(next) => power = next,
            None => break,
        }
    }
    values.push(range.max);
    values
}

/// How many operations each worker performs at a point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPolicy {
    Fixed(usize),
    /// Spread `total_bytes` over the point's threads, capped at `loop_max`.
    Volume { total_bytes: u64, loop_max: usize },
}

impl LoopPolicy {
    pub fn from_config(config: &BenchConfig) -> Self {
        match config.volume_bytes {
            Some(total_bytes) => LoopPolicy::Volume {
                total_bytes,
                loop_max: config.loop_max,
            },
            None => LoopPolicy::Fixed(config.loop_count),
        }
    }

    pub fn loop_count(&self, threads: usize, object_size: u64) -> usize {
        match *self {
            LoopPolicy::Fixed(n) => n.max(1),
            LoopPolicy::Volume {
                total_bytes,
                loop_max,
            } => {
                let per_round = (threads as u64).saturating_mul(object_size).max(1);
                let loops = (total_bytes / per_round).min(usize::MAX as u64) as usize;
                loops.clamp(1, loop_max.max(1))
            }
        }
    }
}

static KEY_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique object keys `{prefix}_{operation}_{n}` from a process-wide counter.
#[derive(Debug, Clone)]
pub struct KeyGenerator {
    prefix: String,
}

impl KeyGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn next_key(&self, operation: Operation) -> String {
        let n = KEY_COUNTER.fetch_add(1, Ordering::Relaxed);
        format!("{}_{}_{}", self.prefix, operation, n)
    }
}

/// Default key prefix, unique per run.
pub fn run_tag() -> String {
    chrono::Utc::now().format("obsbench-%Y%m%dT%H%M%S").to_string()
}

/// One configuration point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BenchPoint {
    pub operation: Operation,
    pub threads: usize,
    pub object_size: u64,
    pub loop_count: usize,
}

/// Runs benchmark points against one client.
#[derive(Debug)]
pub struct Harness {
    client: ObsClient,
    keys: KeyGenerator,
    cleanup: bool,
}

impl Harness {
    pub fn new(client: ObsClient, keys: KeyGenerator) -> Self {
        Self {
            client,
            keys,
            cleanup: false,
        }
    }

    /// Delete every key a point created once the point finishes.
    pub fn with_cleanup(mut self, cleanup: bool) -> Self {
        self.cleanup = cleanup;
        self
    }

    pub fn client(&self) -> &ObsClient {
        &self.client
    }

    /// Run one point and return its raw timings.
    pub fn run_point(&self, point: &BenchPoint) -> Result<LatencySample, BenchError> {
        let payload = vec![b'x'; point.object_size as usize];
        let loops = point.loop_count;

        // Put writes a fresh key per op; append grows one key per thread.
        let keys_per_worker = match point.operation {
            Operation::Put => loops,
            Operation::Append => 1,
        };
        let worker_keys: Vec<Vec<String>> = (0..point.threads)
            .map(|_| {
                (0..keys_per_worker)
                    .map(|_| self.keys.next_key(point.operation))
                    .collect()
            })
            .collect();

        let merged: Mutex<Vec<(f64, f64)>> = Mutex::new(Vec::with_capacity(point.threads * loops));
        let first_error: Mutex<Option<ObsError>> = Mutex::new(None);
        let abort = AtomicBool::new(false);

        debug!(
            operation = %point.operation,
            threads = point.threads,
            object_size = point.object_size,
            loops,
            "starting point"
        );
        let started = Instant::now();
        std::thread::scope(|s| {
            for keys in &worker_keys {
                let payload = payload.as_slice();
                let merged = &merged;
                let first_error = &first_error;
                let abort = &abort;
                s.spawn(move || {
                    let mut local = Vec::with_capacity(loops);
                    let mut offset = 0u64;
                    for i in 0..loops {
                        if abort.load(Ordering::Relaxed) {
                            break;
                        }
                        let op_start = Instant::now();
                        let result = match point.operation {
                            Operation::Put => self.client.put(&keys[i], payload),
                            Operation::Append => self
                                .client
                                .append(&keys[0], payload, offset)
                                .map(|next| offset = next),
                        };
                        match result {
                            Ok(()) => {
                                let latency = op_start.elapsed().as_secs_f64() * 1000.0;
                                let since_start =
                                    op_start.duration_since(started).as_secs_f64() * 1000.0;
                                local.push((latency, since_start));
                            }
                            Err(err) => {
                                abort.store(true, Ordering::Relaxed);
                                first_error
                                    .lock()
                                    .expect("mutex poisoned")
                                    .get_or_insert(err);
                                break;
                            }
                        }
                    }
                    merged.lock().expect("mutex poisoned").extend(local);
                });
            }
        });
        let duration_seconds = started.elapsed().as_secs_f64();

        if self.cleanup {
            let created: Vec<&String> = worker_keys.iter().flatten().collect();
            let report = self.client.delete_many(&created);
            if !report.is_success() {
                warn!(
                    failed_batches = report.failures.len(),
                    "cleanup left objects behind"
                );
            }
        }

        if let Some(source) = first_error.into_inner().expect("mutex poisoned") {
            return Err(BenchError::Operation {
                operation: point.operation,
                threads: point.threads,
                object_size: point.object_size,
                source,
            });
        }

        let (latencies_ms, start_offsets_ms) = merged
            .into_inner()
            .expect("mutex poisoned")
            .into_iter()
            .unzip();
        Ok(LatencySample {
            operation: point.operation,
            threads: point.threads,
            object_size: point.object_size,
            loop_count: loops,
            duration_seconds,
            latencies_ms,
            start_offsets_ms,
        })
    }

    /// Run every point of `config`, saving the CSV after each row.
    pub fn run_sweep(
        &self,
        config: &BenchConfig,
        tracer: &Tracer,
        output: &Path,
    ) -> Result<Vec<BenchmarkRow>, BenchError> {
        let policy = LoopPolicy::from_config(config);
        let sizes = expand_range(config.object_size);
        let thread_counts = expand_range(config.threads);
        let mut rows = Vec::new();

        for &operation in &config.operations {
            for &object_size in &sizes {
                for &threads in &thread_counts {
                    let threads = threads as usize;
                    let point = BenchPoint {
                        operation,
                        threads,
                        object_size,
                        loop_count: policy.loop_count(threads, object_size),
                    };
                    let sample = self.run_point(&point)?;
                    let row = tracer.append_row(&sample);
                    info!(
                        "{} threads={} size={} ops={} {:.2} ops/s {:.2} MB/s p50={:.2}ms p90={:.2}ms p99={:.2}ms",
                        row.operation,
                        row.threads,
                        row.object_size,
                        row.total_ops,
                        row.ops_per_s,
                        row.mb_per_s,
                        row.lat_p50,
                        row.lat_p90,
                        row.lat_p99
                    );
                    tracer
                        .save_csv(output)
                        .map_err(|source| BenchError::Output {
                            path: output.display().to_string(),
                            source,
                        })?;
                    rows.push(row);
                }
            }
        }
        Ok(rows)
    }
}
