//! Configuration loading and types.
//!
//! Configuration is read from an optional YAML file and deserialized into
//! [`Config`]. Endpoint fields can then be overridden one by one through
//! `CONFIG_<FIELD>` environment variables; anything left unset keeps its
//! compiled-in default.

use anyhow::Context;
use serde::Deserialize;
use std::path::Path;
use tracing::info;

use crate::bench::Operation;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Storage endpoint and credentials.
    #[serde(default)]
    pub endpoint: EndpointConfig,

    /// Benchmark sweep settings.
    #[serde(default)]
    pub bench: BenchConfig,

    /// In-process transport settings.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Storage endpoint, bucket and credentials.
///
/// Immutable once a client is built; every operation and every benchmark
/// thread reads the same instance.
#[derive(Clone, Deserialize)]
pub struct EndpointConfig {
    /// Endpoint host name.
    #[serde(alias = "endpoint", default = "default_host")]
    pub host: String,

    /// Bucket all operations target.
    #[serde(default = "default_bucket_name")]
    pub bucket_name: String,

    /// Region the bucket lives in.
    #[serde(default = "default_bucket_location")]
    pub bucket_location: String,

    /// Access key id (also accepts `access_key`).
    #[serde(alias = "access_key", default)]
    pub access_key_id: String,

    /// Secret access key (also accepts `secret_key`).
    #[serde(alias = "secret_key", default)]
    pub secret_access_key: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            bucket_name: default_bucket_name(),
            bucket_location: default_bucket_location(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
        }
    }
}

impl std::fmt::Debug for EndpointConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointConfig")
            .field("host", &self.host)
            .field("bucket_name", &self.bucket_name)
            .field("bucket_location", &self.bucket_location)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &mask(&self.secret_access_key))
            .finish()
    }
}

impl EndpointConfig {
    /// Apply `CONFIG_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_with(|name| std::env::var(name).ok());
    }

    /// Apply `CONFIG_*` overrides from `lookup`, logging every resolved
    /// value (secrets masked).
    pub fn apply_overrides_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let fields: [(&str, &mut String, bool); 5] = [
            ("CONFIG_ENDPOINT", &mut self.host, false),
            ("CONFIG_BUCKET_LOCATION", &mut self.bucket_location, false),
            ("CONFIG_BUCKET_NAME", &mut self.bucket_name, false),
            ("CONFIG_ACCESS_KEY_ID", &mut self.access_key_id, false),
            ("CONFIG_SECRET_ACCESS_KEY", &mut self.secret_access_key, true),
        ];
        for (name, slot, secret) in fields {
            if let Some(value) = lookup(name) {
                *slot = value;
            }
            if secret {
                info!("{name} = {}", mask(slot));
            } else {
                info!("{name} = {slot}");
            }
        }
    }
}

/// Inclusive range swept with a multiplier, e.g. `4..=32` by `2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RangeConfig {
    /// First value.
    pub min: u64,
    /// Last value.
    pub max: u64,
    /// Growth factor between intermediate values.
    #[serde(default = "default_multiplier")]
    pub multiplier: u64,
}

/// Benchmark sweep configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BenchConfig {
    /// Operations to benchmark, in order.
    #[serde(default = "default_operations")]
    pub operations: Vec<Operation>,

    /// Object sizes in bytes.
    #[serde(default = "default_object_sizes")]
    pub object_size: RangeConfig,

    /// Worker thread counts.
    #[serde(default = "default_threads")]
    pub threads: RangeConfig,

    /// Operations per thread when no volume target is set.
    #[serde(default = "default_loop_count")]
    pub loop_count: usize,

    /// Total bytes to write per point; derives the loop count when set.
    #[serde(default)]
    pub volume_bytes: Option<u64>,

    /// Upper bound on the derived loop count.
    #[serde(default = "default_loop_max")]
    pub loop_max: usize,

    /// CSV output path.
    #[serde(default = "default_output")]
    pub output: String,

    /// Key prefix; a timestamped run tag is used when absent.
    #[serde(default)]
    pub key_prefix: Option<String>,

    /// Delete every key a point created once it finishes.
    #[serde(default)]
    pub cleanup: bool,

    /// Add per-op latency and start-offset columns to the CSV.
    #[serde(default)]
    pub trace_latencies: bool,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            operations: default_operations(),
            object_size: default_object_sizes(),
            threads: default_threads(),
            loop_count: default_loop_count(),
            volume_bytes: None,
            loop_max: default_loop_max(),
            output: default_output(),
            key_prefix: None,
            cleanup: false,
            trace_latencies: false,
        }
    }
}

/// In-process transport configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    /// Size of the buffer the transport offers the body producer.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Simulated round-trip latency per call, in milliseconds.
    #[serde(default)]
    pub latency_ms: u64,

    /// SQLite snapshot file holding bucket state between runs.
    #[serde(default)]
    pub snapshot_path: Option<String>,

    /// Keep object bodies. Off by default: only sizes and ETags are stored,
    /// so a full benchmark sweep stays within memory.
    #[serde(default)]
    pub retain_data: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            latency_ms: 0,
            snapshot_path: None,
            retain_data: false,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// -- Defaults ----------------------------------------------------------------

fn default_host() -> String {
    "obs.cn-east-3.myhuaweicloud.com".to_string()
}

fn default_bucket_name() -> String {
    "hw-obs-bench".to_string()
}

fn default_bucket_location() -> String {
    "cn-east-3".to_string()
}

fn default_multiplier() -> u64 {
    2
}

fn default_operations() -> Vec<Operation> {
    vec![Operation::Put, Operation::Append]
}

fn default_object_sizes() -> RangeConfig {
    RangeConfig {
        min: 4 << 10,  // 4 KiB
        max: 32 << 20, // 32 MiB
        multiplier: 2,
    }
}

fn default_threads() -> RangeConfig {
    RangeConfig {
        min: 4,
        max: 32,
        multiplier: 2,
    }
}

fn default_loop_count() -> usize {
    16
}

fn default_loop_max() -> usize {
    1000
}

fn default_output() -> String {
    "results.csv".to_string()
}

fn default_chunk_size() -> usize {
    64 * 1024
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn mask(secret: &str) -> &'static str {
    if secret.is_empty() {
        ""
    } else {
        "****"
    }
}

// -- Loader ------------------------------------------------------------------

/// Load and parse configuration from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&contents)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    Ok(config)
}

impl Config {
    /// Load from `path` when given, defaults otherwise.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => load_config(path),
            None => Ok(Config::default()),
        }
    }

    /// Apply environment overrides, then validate. Call after logging is
    /// set up so the resolved endpoint values are recorded.
    pub fn finalize(&mut self) -> anyhow::Result<()> {
        self.endpoint.apply_env_overrides();
        self.validate()
    }

    /// Reject settings no run could use.
    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, range) in [
            ("bench.object_size", self.bench.object_size),
            ("bench.threads", self.bench.threads),
        ] {
            if range.min == 0 || range.min > range.max {
                anyhow::bail!("{name}: expected 0 < min <= max, got {}..{}", range.min, range.max);
            }
            if range.multiplier < 2 {
                anyhow::bail!("{name}: multiplier must be at least 2");
            }
        }
        if self.bench.loop_count == 0 {
            anyhow::bail!("bench.loop_count must be positive");
        }
        if self.bench.loop_max == 0 {
            anyhow::bail!("bench.loop_max must be positive");
        }
        if self.bench.operations.is_empty() {
            anyhow::bail!("bench.operations must name at least one operation");
        }
        if self.transport.chunk_size == 0 {
            anyhow::bail!("transport.chunk_size must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.endpoint.host, "obs.cn-east-3.myhuaweicloud.com");
        assert_eq!(config.endpoint.bucket_name, "hw-obs-bench");
        assert_eq!(config.endpoint.bucket_location, "cn-east-3");
        assert!(config.endpoint.access_key_id.is_empty());
        assert_eq!(config.bench.loop_count, 16);
        assert_eq!(config.bench.object_size.max, 32 * 1024 * 1024);
        assert_eq!(config.transport.chunk_size, 65536);
        config.validate().unwrap();
    }

    #[test]
    fn test_env_overrides_replace_only_present_fields() {
        let env: HashMap<&str, &str> = [
            ("CONFIG_BUCKET_NAME", "other-bucket"),
            ("CONFIG_SECRET_ACCESS_KEY", "s3cr3t"),
        ]
        .into_iter()
        .collect();

        let mut endpoint = EndpointConfig::default();
        endpoint.apply_overrides_with(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(endpoint.bucket_name, "other-bucket");
        assert_eq!(endpoint.secret_access_key, "s3cr3t");
        assert_eq!(endpoint.host, "obs.cn-east-3.myhuaweicloud.com");
        assert_eq!(endpoint.bucket_location, "cn-east-3");
    }

    #[test]
    fn test_debug_masks_secret() {
        let endpoint = EndpointConfig {
            secret_access_key: "s3cr3t".to_string(),
            ..Default::default()
        };
        let text = format!("{endpoint:?}");
        assert!(!text.contains("s3cr3t"));
        assert!(text.contains("****"));
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
endpoint:
  endpoint: obs.example.com
  bucket_name: bench
  access_key: ak
bench:
  operations: [append]
  object_size: { min: 1024, max: 4096 }
  threads: { min: 1, max: 8, multiplier: 4 }
  cleanup: true
transport:
  latency_ms: 3
logging:
  format: json
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.endpoint.host, "obs.example.com");
        assert_eq!(config.endpoint.access_key_id, "ak");
        assert_eq!(config.bench.operations, vec![Operation::Append]);
        assert_eq!(config.bench.object_size.multiplier, 2);
        assert_eq!(config.bench.threads.multiplier, 4);
        assert!(config.bench.cleanup);
        assert_eq!(config.transport.latency_ms, 3);
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.logging.level, "info");
        config.validate().unwrap();
    }

    #[test]
    fn test_load_without_path_uses_defaults() {
        let config = Config::load(None).unwrap();
        assert_eq!(config.bench.operations, vec![Operation::Put, Operation::Append]);
        assert_eq!(config.bench.output, "results.csv");
        assert!(!config.transport.retain_data);
    }

    #[test]
    fn test_validate_rejects_inverted_range() {
        let mut config = Config::default();
        config.bench.threads = RangeConfig {
            min: 8,
            max: 4,
            multiplier: 2,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("obsbench.yaml");
        std::fs::write(&path, "bench:\n  loop_count: 3\n").unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.bench.loop_count, 3);
        assert!(load_config(dir.path().join("missing.yaml")).is_err());
    }
}
