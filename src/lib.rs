//! obsbench library -- blocking object storage client and benchmark harness.
//!
//! This crate adapts a callback-driven object storage protocol into plain
//! blocking calls (put, append, list, delete, storage info), and drives
//! those calls from many threads to measure latency and throughput.

pub mod bench;
pub mod client;
pub mod config;
pub mod errors;
pub mod metrics;
pub mod progress;
pub mod protocol;
pub mod transport;

pub use client::ObsClient;
pub use errors::ObsError;

use crate::config::LoggingConfig;

/// Install the global tracing subscriber. `RUST_LOG` takes precedence over
/// the configured level.
pub fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}
