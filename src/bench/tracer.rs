//! Latency aggregation and CSV persistence.

use std::fmt::Write as _;
use std::io::Write as _;
use std::path::Path;
use std::sync::Mutex;

use tempfile::NamedTempFile;
use tracing::debug;

use super::Operation;

/// CSV header; the trace columns are appended when tracing is on.
pub const CSV_HEADER: &str =
    "type,threads,object_size,total_ops,loop_count,seconds,ops_per_s,mb_per_s,lat_p50,lat_p90,lat_p99";

const TRACE_HEADER: &str = ",latencies,trace_latencies";

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Raw timings of one benchmark point.
#[derive(Debug, Clone, PartialEq)]
pub struct LatencySample {
    pub operation: Operation,
    pub threads: usize,
    pub object_size: u64,
    pub loop_count: usize,
    /// Wall time of the whole point.
    pub duration_seconds: f64,
    /// Per-op latency in ms, in merge order.
    pub latencies_ms: Vec<f64>,
    /// Per-op start offset since the point started, in ms, parallel to
    /// `latencies_ms`.
    pub start_offsets_ms: Vec<f64>,
}

impl LatencySample {
    pub fn total_ops(&self) -> usize {
        self.latencies_ms.len()
    }
}

/// Summary row derived from a [`LatencySample`].
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkRow {
    pub operation: Operation,
    pub threads: usize,
    pub object_size: u64,
    pub total_ops: usize,
    pub loop_count: usize,
    pub seconds: f64,
    pub ops_per_s: f64,
    pub mb_per_s: f64,
    pub lat_p50: f64,
    pub lat_p90: f64,
    pub lat_p99: f64,
    /// Per-op latencies and start offsets, when tracing.
    pub trace: Option<(Vec<f64>, Vec<f64>)>,
}

impl BenchmarkRow {
    /// Summarize `sample`, keeping the raw series when `trace` is set.
    pub fn from_sample(sample: &LatencySample, trace: bool) -> Self {
        let total_ops = sample.total_ops();
        let seconds = sample.duration_seconds;
        let (ops_per_s, mb_per_s) = if seconds > 0.0 {
            let ops = total_ops as f64;
            (
                ops / seconds,
                ops * sample.object_size as f64 / BYTES_PER_MB / seconds,
            )
        } else {
            (0.0, 0.0)
        };

        let mut sorted = sample.latencies_ms.clone();
        sorted.sort_by(f64::total_cmp);

        Self {
            operation: sample.operation,
            threads: sample.threads,
            object_size: sample.object_size,
            total_ops,
            loop_count: sample.loop_count,
            seconds,
            ops_per_s,
            mb_per_s,
            lat_p50: percentile_sorted(&sorted, 0.50),
            lat_p90: percentile_sorted(&sorted, 0.90),
            lat_p99: percentile_sorted(&sorted, 0.99),
            trace: trace.then(|| {
                (
                    sample.latencies_ms.clone(),
                    sample.start_offsets_ms.clone(),
                )
            }),
        }
    }

    /// One CSV record, without the trailing newline.
    pub fn csv_record(&self) -> String {
        let mut line = format!(
            "{},{},{},{},{},{:.6},{:.2},{:.2},{:.2},{:.2},{:.2}",
            self.operation,
            self.threads,
            self.object_size,
            self.total_ops,
            self.loop_count,
            self.seconds,
            self.ops_per_s,
            self.mb_per_s,
            self.lat_p50,
            self.lat_p90,
            self.lat_p99,
        );
        if let Some((latencies, offsets)) = &self.trace {
            let _ = write!(line, ",{},{}", quoted_series(latencies), quoted_series(offsets));
        }
        line
    }
}

fn quoted_series(values: &[f64]) -> String {
    let items: Vec<String> = values.iter().map(|v| format!("{v:.2}")).collect();
    format!("\"[{}]\"", items.join(","))
}

/// Nearest-rank percentile: index `floor(p * n)` of the ascending values,
/// clamped to the last element. Empty input yields 0.0.
pub fn percentile(values: &[f64], p: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    percentile_sorted(&sorted, p)
}

fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let index = ((p * sorted.len() as f64) as usize).min(sorted.len() - 1);
    sorted[index]
}

/// Thread-safe row accumulator.
#[derive(Debug, Default)]
pub struct Tracer {
    rows: Mutex<Vec<BenchmarkRow>>,
    trace_latencies: bool,
}

impl Tracer {
    pub fn new(trace_latencies: bool) -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            trace_latencies,
        }
    }

    /// Summarize `sample` and keep the row. Returns a copy of the row.
    pub fn append_row(&self, sample: &LatencySample) -> BenchmarkRow {
        let row = BenchmarkRow::from_sample(sample, self.trace_latencies);
        self.rows.lock().expect("mutex poisoned").push(row.clone());
        row
    }

    pub fn rows(&self) -> Vec<BenchmarkRow> {
        self.rows.lock().expect("mutex poisoned").clone()
    }

    /// Render every row as CSV, header first.
    pub fn to_csv(&self) -> String {
        let rows = self.rows.lock().expect("mutex poisoned");
        let mut out = String::from(CSV_HEADER);
        if self.trace_latencies {
            out.push_str(TRACE_HEADER);
        }
        out.push('\n');
        for row in rows.iter() {
            out.push_str(&row.csv_record());
            out.push('\n');
        }
        out
    }

    /// Write the CSV to `path`, replacing it atomically.
    pub fn save_csv(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(self.to_csv().as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;
        debug!(path = %path.display(), "results saved");
        Ok(())
    }
}
