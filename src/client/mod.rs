//! Blocking object storage client.
//!
//! [`ObsClient`] owns one endpoint configuration and one transport, and
//! turns every callback-driven transport call into a plain `Result`. Each
//! call builds a fresh handler state, hands it to the transport, and checks
//! the terminal status once the transport returns.

pub mod batch;
pub mod lifecycle;
pub mod listing;

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::EndpointConfig;
use crate::errors::ObsError;
use crate::metrics;
use crate::progress::progress_bar;
use crate::protocol::{
    ListRequest, ObjectInfo, PutProperties, ReaderTransfer, ResponseState, StorageInfoState,
    TransferState,
};
use crate::transport::Transport;

pub use batch::{chunk_keys, DeleteBatch, DeleteReport, DeleteState};
pub use lifecycle::InitGate;
pub use listing::{ListOptions, ListState, ListingCursor, MAX_LIST_KEYS};

/// Uploads at least this large draw a progress bar.
const PROGRESS_UPLOAD_BYTES: u64 = 16 << 20;

/// Bucket usage reported by the storage info query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageInfo {
    /// Used capacity as reported by the service.
    pub capacity: String,
    pub object_count: u64,
}

/// Synchronous facade over a [`Transport`].
#[derive(Clone)]
pub struct ObsClient {
    endpoint: Arc<EndpointConfig>,
    transport: Arc<dyn Transport>,
    put_properties: PutProperties,
}

impl std::fmt::Debug for ObsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObsClient")
            .field("endpoint", &self.endpoint)
            .field("put_properties", &self.put_properties)
            .finish_non_exhaustive()
    }
}

impl ObsClient {
    /// Build a client. The first client in the process runs transport setup;
    /// later clients reuse its outcome. Fails with [`ObsError::ShutDown`]
    /// once [`ObsClient::shutdown`] has run.
    pub fn new(endpoint: EndpointConfig, transport: Arc<dyn Transport>) -> Result<Self, ObsError> {
        lifecycle::GLOBAL_GATE.initialize(&transport)?;
        info!(
            host = %endpoint.host,
            bucket = %endpoint.bucket_name,
            location = %endpoint.bucket_location,
            "object storage client ready"
        );
        Ok(Self {
            endpoint: Arc::new(endpoint),
            transport,
            put_properties: PutProperties::default(),
        })
    }

    /// Use `properties` for every put and append.
    pub fn with_put_properties(mut self, properties: PutProperties) -> Self {
        self.put_properties = properties;
        self
    }

    pub fn endpoint(&self) -> &EndpointConfig {
        &self.endpoint
    }

    /// Run process-wide teardown on the transport that performed setup.
    /// Only the first call in the process has an effect; returns whether
    /// this call performed it.
    pub fn shutdown(&self) -> bool {
        lifecycle::GLOBAL_GATE.teardown()
    }

    fn finish(
        operation: &'static str,
        key: Option<&str>,
        response: &ResponseState,
        started: Instant,
    ) -> Result<(), ObsError> {
        let elapsed = started.elapsed();
        metrics::record_operation(operation, response.status(), elapsed);
        debug!(
            operation,
            key = key.unwrap_or_default(),
            status = %response.status(),
            request_id = response.request_id().unwrap_or_default(),
            elapsed_us = elapsed.as_micros() as u64,
            "operation complete"
        );
        response.check(operation, key)
    }

    /// Upload `payload` to `key`, replacing any existing object.
    pub fn put(&self, key: &str, payload: &[u8]) -> Result<(), ObsError> {
        let started = Instant::now();
        let mut state = TransferState::new(payload);
        self.transport.put_object(
            &self.endpoint,
            key,
            state.content_length(),
            &self.put_properties,
            &mut state,
        );
        Self::finish("put", Some(key), &state.response, started)?;
        metrics::record_bytes_sent(payload.len() as u64);
        Ok(())
    }

    /// Stream the file at `path` to `key`. Returns the uploaded size.
    pub fn put_file(&self, key: &str, path: impl AsRef<Path>) -> Result<u64, ObsError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let content_length = file.metadata()?.len();
        let progress =
            progress_bar((content_length >= PROGRESS_UPLOAD_BYTES).then_some(content_length));

        debug!(key, path = %path.display(), content_length, "uploading file");
        let started = Instant::now();
        let reader = progress.wrap_read(BufReader::new(file));
        let mut state = ReaderTransfer::new(reader, content_length);
        self.transport.put_object(
            &self.endpoint,
            key,
            content_length,
            &self.put_properties,
            &mut state,
        );
        progress.abandon();

        if let Some(err) = state.take_read_error() {
            metrics::record_operation("put_file", state.response.status(), started.elapsed());
            return Err(ObsError::Io(err));
        }
        Self::finish("put_file", Some(key), &state.response, started)?;
        metrics::record_bytes_sent(content_length);
        Ok(content_length)
    }

    /// Append `payload` to `key` at `start_offset`. Returns the offset for
    /// the next append.
    pub fn append(&self, key: &str, payload: &[u8], start_offset: u64) -> Result<u64, ObsError> {
        let started = Instant::now();
        let position = start_offset.to_string();
        let mut state = TransferState::new(payload);
        self.transport.append_object(
            &self.endpoint,
            key,
            state.content_length(),
            &position,
            &self.put_properties,
            &mut state,
        );
        Self::finish("append", Some(key), &state.response, started)?;
        metrics::record_bytes_sent(payload.len() as u64);

        Ok(state
            .response
            .next_append_position()
            .unwrap_or(start_offset + payload.len() as u64))
    }

    /// Delete `key`. Deleting a missing key succeeds.
    pub fn delete(&self, key: &str) -> Result<(), ObsError> {
        let started = Instant::now();
        let mut state = ResponseState::new();
        self.transport
            .delete_object(&self.endpoint, &ObjectInfo::new(key), &mut state);
        Self::finish("delete", Some(key), &state, started)
    }

    /// Delete `keys` in batches of up to 1000, one request per batch.
    ///
    /// Every batch is attempted even after a failure; the report lists the
    /// failed batches.
    pub fn delete_many<S: AsRef<str>>(&self, keys: &[S]) -> DeleteReport {
        self.delete_batches(keys, None)
    }

    fn delete_batches<S: AsRef<str>>(&self, keys: &[S], total: Option<u64>) -> DeleteReport {
        let progress = progress_bar(total);
        let mut report = DeleteReport::default();
        let mut attempted = 0u64;

        for batch in chunk_keys(keys) {
            let started = Instant::now();
            let mut state = DeleteState::new();
            self.transport
                .batch_delete_objects(&self.endpoint, batch.objects(), &mut state);
            report.batches += 1;
            attempted += batch.len() as u64;

            match Self::finish("delete_many", Some(batch.first_key()), &state.response, started) {
                Ok(()) => {
                    let deleted = batch.len().saturating_sub(state.failed().count());
                    report.deleted += deleted;
                    metrics::record_keys_deleted(deleted as u64);
                }
                Err(err) => {
                    warn!(batch = report.batches, keys = batch.len(), "bulk delete failed: {err}");
                    report.failures.push(err);
                }
            }
            progress.set_position(attempted);
        }
        progress.abandon();

        debug!(
            batches = report.batches,
            deleted = report.deleted,
            failed_batches = report.failures.len(),
            "bulk delete finished"
        );
        report
    }

    /// Delete every object in the bucket. Returns the number of keys listed.
    pub fn delete_all(&self) -> Result<usize, ObsError> {
        let total = self.approximate_total();
        let keys = self.list_pages(&ListOptions::everything(), total)?;
        info!(keys = keys.len(), "deleting all objects");
        if keys.is_empty() {
            return Ok(0);
        }
        self.delete_batches(&keys, total)
            .into_result()?;
        Ok(keys.len())
    }

    /// List keys matching `options`, following pages until one is empty.
    ///
    /// Unfiltered listings first fetch the approximate object count to
    /// drive a progress bar.
    pub fn list(&self, options: &ListOptions) -> Result<Vec<String>, ObsError> {
        let total = if options.is_unfiltered() {
            self.approximate_total()
        } else {
            None
        };
        self.list_pages(options, total)
    }

    fn list_pages(
        &self,
        options: &ListOptions,
        approximate_total: Option<u64>,
    ) -> Result<Vec<String>, ObsError> {
        ListingCursor::new(&options.start_key, approximate_total).drain(|marker| {
            let started = Instant::now();
            let mut state = ListState::new();
            let request = ListRequest {
                prefix: &options.prefix,
                marker,
                delimiter: &options.delimiter,
                max_keys: MAX_LIST_KEYS,
            };
            self.transport
                .list_objects(&self.endpoint, &request, &mut state);
            Self::finish("list", None, &state.response, started)?;
            Ok(state.into_keys())
        })
    }

    fn approximate_total(&self) -> Option<u64> {
        match self.get_approximate_object_count() {
            Ok(count) => Some(count),
            Err(err) => {
                warn!("object count unavailable, progress disabled: {err}");
                None
            }
        }
    }

    /// Capacity and object count of the bucket.
    pub fn get_storage_info(&self) -> Result<StorageInfo, ObsError> {
        let started = Instant::now();
        let mut state = StorageInfoState::default();
        self.transport
            .get_bucket_storage_info(&self.endpoint, &mut state);
        Self::finish("get_bucket_storage_info", None, &state.response, started)?;
        Ok(StorageInfo {
            object_count: state.parse_object_count()?,
            capacity: state.capacity,
        })
    }

    /// Object count reported by the bucket storage info query.
    pub fn get_approximate_object_count(&self) -> Result<u64, ObsError> {
        self.get_storage_info().map(|info| info.object_count)
    }
}
