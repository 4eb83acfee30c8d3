//! In-process transport with the storage service's observable semantics.
//!
//! Buckets are `BTreeMap`s behind a `std::sync::RwLock`, so listings come
//! back in lexicographic key order. The transport drives handlers exactly
//! like a network SDK would: it pulls the body in `chunk_size` pieces,
//! reports response properties, then fires completion once.
//!
//! An optional SQLite snapshot lets command-line tools keep bucket state
//! between invocations.

use bytes::{Bytes, BytesMut};
use md5::{Digest, Md5};
use rusqlite::{params, Connection};
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::Duration;
use tracing::{debug, info};

use super::Transport;
use crate::config::{EndpointConfig, TransportConfig};
use crate::errors::MAX_DELETE_BATCH;
use crate::protocol::{
    BodyHandler, DeleteHandler, DeleteResult, ErrorDetails, ListContent, ListHandler, ListPage,
    ListRequest, ObjectInfo, ObsStatus, PutProperties, ResponseHandler, ResponseProperties,
    StorageInfoHandler,
};

/// One stored object.
#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    size: u64,
    etag: String,
    appendable: bool,
}

type Bucket = BTreeMap<String, StoredObject>;

/// In-memory storage transport.
#[derive(Debug)]
pub struct MemoryTransport {
    buckets: RwLock<HashMap<String, Bucket>>,
    chunk_size: usize,
    latency: Duration,
    retain_data: bool,
    init_calls: AtomicUsize,
    deinit_calls: AtomicUsize,
}

/// Store that keeps object bodies, with default chunking and no latency.
impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new(&TransportConfig {
            retain_data: true,
            ..TransportConfig::default()
        })
    }
}

impl MemoryTransport {
    /// Create an empty transport.
    pub fn new(config: &TransportConfig) -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
            chunk_size: config.chunk_size.max(1),
            latency: Duration::from_millis(config.latency_ms),
            retain_data: config.retain_data,
            init_calls: AtomicUsize::new(0),
            deinit_calls: AtomicUsize::new(0),
        }
    }

    /// Create a transport, restoring state from `config.snapshot_path` when
    /// the file exists.
    pub fn open(config: &TransportConfig) -> anyhow::Result<Self> {
        let transport = Self::new(config);
        if let Some(path) = &config.snapshot_path {
            if Path::new(path).exists() {
                transport.load_snapshot(path)?;
            }
        }
        Ok(transport)
    }

    /// Builder-style bucket creation.
    pub fn with_bucket(self, name: &str) -> Self {
        self.create_bucket(name);
        self
    }

    /// Create `name` if it does not exist yet.
    pub fn create_bucket(&self, name: &str) {
        let mut buckets = self.buckets.write().expect("rwlock poisoned");
        buckets.entry(name.to_string()).or_default();
    }

    /// Raw bytes of `key` in `bucket`. Empty when bodies are not retained.
    pub fn object_data(&self, bucket: &str, key: &str) -> Option<Bytes> {
        let buckets = self.buckets.read().expect("rwlock poisoned");
        buckets
            .get(bucket)
            .and_then(|b| b.get(key))
            .map(|o| o.data.clone())
    }

    /// Number of objects in `bucket` (0 for a missing bucket).
    pub fn object_count(&self, bucket: &str) -> usize {
        let buckets = self.buckets.read().expect("rwlock poisoned");
        buckets.get(bucket).map(|b| b.len()).unwrap_or(0)
    }

    /// How often [`Transport::initialize`] has been called.
    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    /// How often [`Transport::deinitialize`] has been called.
    pub fn deinit_calls(&self) -> usize {
        self.deinit_calls.load(Ordering::SeqCst)
    }

    // ── Request helpers ─────────────────────────────────────────────

    fn simulate_round_trip(&self) {
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }
    }

    /// Pull exactly `content_length` bytes, or `None` if the producer
    /// stopped early.
    fn pull_body<H: BodyHandler + ?Sized>(
        &self,
        content_length: u64,
        handler: &mut H,
    ) -> Option<Vec<u8>> {
        let mut body = Vec::with_capacity(content_length.min(self.chunk_size as u64 * 16) as usize);
        let mut buf = vec![0u8; self.chunk_size];
        while (body.len() as u64) < content_length {
            let want = (content_length - body.len() as u64).min(self.chunk_size as u64) as usize;
            let n = handler.next_chunk(&mut buf[..want]).min(want);
            if n == 0 {
                break;
            }
            body.extend_from_slice(&buf[..n]);
        }
        if (body.len() as u64) < content_length {
            debug!(
                received = body.len(),
                declared = content_length,
                "body producer stopped early"
            );
            return None;
        }
        Some(body)
    }

    fn retained(&self, body: Vec<u8>) -> Bytes {
        if self.retain_data {
            Bytes::from(body)
        } else {
            Bytes::new()
        }
    }

    fn compute_etag(data: &[u8]) -> String {
        let mut hasher = Md5::new();
        hasher.update(data);
        format!("\"{}\"", hex::encode(hasher.finalize()))
    }

    fn no_such_bucket(bucket: &str) -> Failure {
        Failure::new(
            ObsStatus::NoSuchBucket,
            "The specified bucket does not exist",
            bucket,
        )
    }

    /// Run `f` against `bucket` under the write lock.
    fn with_bucket_mut<T>(
        &self,
        bucket: &str,
        f: impl FnOnce(&mut Bucket) -> Result<T, Failure>,
    ) -> Result<T, Failure> {
        let mut buckets = self.buckets.write().expect("rwlock poisoned");
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| Self::no_such_bucket(bucket))?;
        f(objects)
    }

    /// Run `f` against `bucket` under the read lock.
    fn with_bucket_ref<T>(
        &self,
        bucket: &str,
        f: impl FnOnce(&Bucket) -> Result<T, Failure>,
    ) -> Result<T, Failure> {
        let buckets = self.buckets.read().expect("rwlock poisoned");
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| Self::no_such_bucket(bucket))?;
        f(objects)
    }

    // ── Snapshot persistence ───────────────────────────────────────

    /// Write all buckets to a SQLite file at `path`.
    ///
    /// Writes a temp file next to `path`, then renames it into place.
    pub fn save_snapshot(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let buckets = self.buckets.read().expect("rwlock poisoned");

        let tmp_path = path.with_extension("tmp");
        if let Some(parent) = tmp_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let _ = std::fs::remove_file(&tmp_path);

        let mut conn = Connection::open(&tmp_path)?;
        conn.execute_batch(
            "CREATE TABLE buckets (
                 name TEXT PRIMARY KEY
             );
             CREATE TABLE objects (
                 bucket     TEXT NOT NULL,
                 key        TEXT NOT NULL,
                 data       BLOB NOT NULL,
                 size       INTEGER NOT NULL,
                 etag       TEXT NOT NULL,
                 appendable INTEGER NOT NULL,
                 PRIMARY KEY (bucket, key)
             );",
        )?;

        let tx = conn.transaction()?;
        {
            let mut bucket_stmt = tx.prepare("INSERT INTO buckets (name) VALUES (?1)")?;
            let mut object_stmt = tx.prepare(
                "INSERT INTO objects (bucket, key, data, size, etag, appendable) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for (name, objects) in buckets.iter() {
                bucket_stmt.execute(params![name])?;
                for (key, obj) in objects {
                    object_stmt.execute(params![
                        name,
                        key,
                        obj.data.as_ref(),
                        obj.size as i64,
                        obj.etag,
                        obj.appendable
                    ])?;
                }
            }
        }
        tx.commit()?;
        drop(conn);

        std::fs::rename(&tmp_path, path)?;
        debug!("snapshot written to {}", path.display());
        Ok(())
    }

    /// Replace all buckets with the content of the SQLite file at `path`.
    pub fn load_snapshot(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;

        let mut restored: HashMap<String, Bucket> = HashMap::new();
        {
            let mut stmt = conn.prepare("SELECT name FROM buckets")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            for name in rows {
                restored.entry(name?).or_default();
            }
        }
        let mut count = 0usize;
        {
            let mut stmt =
                conn.prepare("SELECT bucket, key, data, size, etag, appendable FROM objects")?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Vec<u8>>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, bool>(5)?,
                ))
            })?;
            for row in rows {
                let (bucket, key, data, size, etag, appendable) = row?;
                restored.entry(bucket).or_default().insert(
                    key,
                    StoredObject {
                        data: Bytes::from(data),
                        size: size as u64,
                        etag,
                        appendable,
                    },
                );
                count += 1;
            }
        }

        *self.buckets.write().expect("rwlock poisoned") = restored;
        info!("restored {count} objects from snapshot {}", path.display());
        Ok(())
    }
}

/// Non-OK outcome with the detail the service would send.
#[derive(Debug)]
struct Failure {
    status: ObsStatus,
    details: ErrorDetails,
}

impl Failure {
    fn new(status: ObsStatus, message: &str, resource: &str) -> Self {
        Self {
            status,
            details: ErrorDetails {
                message: Some(message.to_string()),
                resource: Some(resource.to_string()),
                ..Default::default()
            },
        }
    }
}

/// Generate a 16-character hex request id.
fn generate_request_id() -> String {
    let bytes: [u8; 8] = rand::random();
    hex::encode(bytes).to_uppercase()
}

/// Deliver properties (when present) and the single completion callback.
fn complete<H: ResponseHandler + ?Sized>(
    handler: &mut H,
    outcome: Result<ResponseProperties, Failure>,
) {
    match outcome {
        Ok(properties) => {
            let status = handler.on_properties(Some(&properties));
            handler.on_complete(status, None);
        }
        Err(failure) => {
            let properties = ResponseProperties {
                request_id: Some(generate_request_id()),
                ..Default::default()
            };
            let _ = handler.on_properties(Some(&properties));
            let mut details = failure.details;
            details
                .error_headers
                .push(format!("x-obs-error-code: {}", failure.status.name()));
            handler.on_complete(failure.status, Some(&details));
        }
    }
}

impl Transport for MemoryTransport {
    fn initialize(&self) -> ObsStatus {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        ObsStatus::Ok
    }

    fn deinitialize(&self) {
        self.deinit_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn put_object(
        &self,
        endpoint: &EndpointConfig,
        key: &str,
        content_length: u64,
        _properties: &PutProperties,
        handler: &mut dyn BodyHandler,
    ) {
        self.simulate_round_trip();
        let outcome = match self.pull_body(content_length, handler) {
            None => Err(Failure::new(
                ObsStatus::IncompleteBody,
                "The request body is shorter than the declared content length",
                key,
            )),
            Some(body) => self.with_bucket_mut(&endpoint.bucket_name, |objects| {
                let etag = Self::compute_etag(&body);
                objects.insert(
                    key.to_string(),
                    StoredObject {
                        data: self.retained(body),
                        size: content_length,
                        etag: etag.clone(),
                        appendable: false,
                    },
                );
                Ok(ResponseProperties {
                    request_id: Some(generate_request_id()),
                    etag: Some(etag),
                    content_length: Some(content_length),
                    object_type: Some("Normal".to_string()),
                    ..Default::default()
                })
            }),
        };
        complete(handler, outcome);
    }

    fn append_object(
        &self,
        endpoint: &EndpointConfig,
        key: &str,
        content_length: u64,
        position: &str,
        _properties: &PutProperties,
        handler: &mut dyn BodyHandler,
    ) {
        self.simulate_round_trip();
        let outcome = match (position.parse::<u64>(), self.pull_body(content_length, handler)) {
            (Err(_), _) => Err(Failure::new(
                ObsStatus::InvalidParameter,
                "The append position is not a non-negative integer",
                key,
            )),
            (_, None) => Err(Failure::new(
                ObsStatus::IncompleteBody,
                "The request body is shorter than the declared content length",
                key,
            )),
            (Ok(position), Some(body)) => {
                self.with_bucket_mut(&endpoint.bucket_name, |objects| {
                    let (current, length) = match objects.get(key) {
                        Some(existing) if !existing.appendable => {
                            return Err(Failure::new(
                                ObsStatus::ObjectNotAppendable,
                                "The object is not appendable",
                                key,
                            ));
                        }
                        Some(existing) => (existing.data.clone(), existing.size),
                        None => (Bytes::new(), 0),
                    };
                    if position != length {
                        let mut failure = Failure::new(
                            ObsStatus::PositionNotEqualToLength,
                            "The position of the append is not equal to the object length",
                            key,
                        );
                        failure
                            .details
                            .extra_details
                            .push(("NextAppendPosition".to_string(), length.to_string()));
                        failure
                            .details
                            .error_headers
                            .push(format!("x-obs-next-append-position: {length}"));
                        return Err(failure);
                    }

                    let next = length + content_length;
                    let (data, etag) = if self.retain_data {
                        let mut data = BytesMut::with_capacity(current.len() + body.len());
                        data.extend_from_slice(&current);
                        data.extend_from_slice(&body);
                        let data = data.freeze();
                        let etag = Self::compute_etag(&data);
                        (data, etag)
                    } else {
                        (Bytes::new(), Self::compute_etag(&body))
                    };
                    objects.insert(
                        key.to_string(),
                        StoredObject {
                            data,
                            size: next,
                            etag: etag.clone(),
                            appendable: true,
                        },
                    );
                    Ok(ResponseProperties {
                        request_id: Some(generate_request_id()),
                        etag: Some(etag),
                        object_type: Some("Appendable".to_string()),
                        next_append_position: Some(next.to_string()),
                        ..Default::default()
                    })
                })
            }
        };
        complete(handler, outcome);
    }

    fn delete_object(
        &self,
        endpoint: &EndpointConfig,
        object: &ObjectInfo,
        handler: &mut dyn ResponseHandler,
    ) {
        self.simulate_round_trip();
        let outcome = self.with_bucket_mut(&endpoint.bucket_name, |objects| {
            // Deleting a missing key succeeds, as on the real service.
            objects.remove(&object.key);
            Ok(ResponseProperties {
                request_id: Some(generate_request_id()),
                ..Default::default()
            })
        });
        complete(handler, outcome);
    }

    fn batch_delete_objects(
        &self,
        endpoint: &EndpointConfig,
        objects: &[ObjectInfo],
        handler: &mut dyn DeleteHandler,
    ) {
        self.simulate_round_trip();
        if objects.is_empty() || objects.len() > MAX_DELETE_BATCH {
            let failure = Failure::new(
                ObsStatus::MalformedXml,
                "The delete request must name between 1 and 1000 objects",
                &endpoint.bucket_name,
            );
            complete(handler, Err(failure));
            return;
        }

        let outcome = self.with_bucket_mut(&endpoint.bucket_name, |stored| {
            Ok(objects
                .iter()
                .map(|object| {
                    stored.remove(&object.key);
                    DeleteResult::deleted(object.key.clone())
                })
                .collect::<Vec<_>>())
        });

        match outcome {
            Ok(results) => {
                let properties = ResponseProperties {
                    request_id: Some(generate_request_id()),
                    ..Default::default()
                };
                let mut status = handler.on_properties(Some(&properties));
                if status.is_ok() {
                    status = handler.on_deleted(&results);
                }
                handler.on_complete(status, None);
            }
            Err(failure) => complete(handler, Err(failure)),
        }
    }

    fn list_objects(
        &self,
        endpoint: &EndpointConfig,
        request: &ListRequest<'_>,
        handler: &mut dyn ListHandler,
    ) {
        self.simulate_round_trip();
        let max_keys = request.max_keys.clamp(1, MAX_DELETE_BATCH as u32);
        let outcome = self.with_bucket_ref(&endpoint.bucket_name, |objects| {
            Ok(list_page(objects, request, max_keys))
        });

        match outcome {
            Ok(page) => {
                let properties = ResponseProperties {
                    request_id: Some(generate_request_id()),
                    ..Default::default()
                };
                let mut status = handler.on_properties(Some(&properties));
                if status.is_ok() {
                    status = handler.on_page(&page);
                }
                handler.on_complete(status, None);
            }
            Err(failure) => complete(handler, Err(failure)),
        }
    }

    fn get_bucket_storage_info(
        &self,
        endpoint: &EndpointConfig,
        handler: &mut dyn StorageInfoHandler,
    ) {
        self.simulate_round_trip();
        let outcome = self.with_bucket_ref(&endpoint.bucket_name, |objects| {
            let capacity: u64 = objects.values().map(|o| o.size).sum();
            Ok((capacity, objects.len()))
        });

        match outcome {
            Ok((capacity, count)) => {
                let properties = ResponseProperties {
                    request_id: Some(generate_request_id()),
                    ..Default::default()
                };
                let status = handler.on_properties(Some(&properties));
                if status.is_ok() {
                    handler.on_storage_info(&capacity.to_string(), &count.to_string());
                }
                handler.on_complete(status, None);
            }
            Err(failure) => complete(handler, Err(failure)),
        }
    }
}

/// Build one list page: keys strictly after the marker that match the
/// prefix, rolled up at the delimiter, at most `max_keys` entries.
fn list_page(objects: &Bucket, request: &ListRequest<'_>, max_keys: u32) -> ListPage {
    let mut page = ListPage::default();
    let mut count = 0u32;
    let mut last_entry: Option<String> = None;

    let range = objects.range::<str, _>((Bound::Excluded(request.marker), Bound::Unbounded));
    for (key, obj) in range {
        if !key.starts_with(request.prefix) {
            continue;
        }

        let after_prefix = &key[request.prefix.len()..];
        let rollup = if request.delimiter.is_empty() {
            None
        } else {
            after_prefix.find(request.delimiter).map(|pos| {
                format!(
                    "{}{}{}",
                    request.prefix,
                    &after_prefix[..pos],
                    request.delimiter
                )
            })
        };

        if let Some(common_prefix) = &rollup {
            if common_prefix.as_str() <= request.marker
                || page.common_prefixes.last() == Some(common_prefix)
            {
                continue;
            }
        }

        if count == max_keys {
            page.is_truncated = true;
            break;
        }
        count += 1;

        match rollup {
            Some(common_prefix) => {
                last_entry = Some(common_prefix.clone());
                page.common_prefixes.push(common_prefix);
            }
            None => {
                last_entry = Some(key.clone());
                page.contents.push(ListContent {
                    key: key.clone(),
                    size: obj.size,
                    etag: obj.etag.clone(),
                });
            }
        }
    }

    if page.is_truncated {
        page.next_marker = last_entry;
    }
    page
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ReaderTransfer, ResponseState, StorageInfoState, TransferState};

    const BUCKET: &str = "test-bucket";

    fn endpoint() -> EndpointConfig {
        EndpointConfig {
            bucket_name: BUCKET.to_string(),
            ..Default::default()
        }
    }

    fn small_chunks() -> MemoryTransport {
        MemoryTransport::new(&TransportConfig {
            chunk_size: 4,
            retain_data: true,
            ..Default::default()
        })
        .with_bucket(BUCKET)
    }

    fn put(transport: &MemoryTransport, key: &str, data: &[u8]) -> ResponseState {
        let mut state = TransferState::new(data);
        transport.put_object(
            &endpoint(),
            key,
            data.len() as u64,
            &PutProperties::default(),
            &mut state,
        );
        state.response
    }

    fn append(transport: &MemoryTransport, key: &str, data: &[u8], position: &str) -> ResponseState {
        let mut state = TransferState::new(data);
        transport.append_object(
            &endpoint(),
            key,
            data.len() as u64,
            position,
            &PutProperties::default(),
            &mut state,
        );
        state.response
    }

    #[derive(Default)]
    struct PageCollector {
        response: ResponseState,
        page: ListPage,
    }

    impl ResponseHandler for PageCollector {
        fn on_properties(&mut self, properties: Option<&ResponseProperties>) -> ObsStatus {
            self.response.on_properties(properties)
        }

        fn on_complete(&mut self, status: ObsStatus, error: Option<&ErrorDetails>) {
            self.response.on_complete(status, error);
        }
    }

    impl ListHandler for PageCollector {
        fn on_page(&mut self, page: &ListPage) -> ObsStatus {
            self.page = page.clone();
            ObsStatus::Ok
        }
    }

    fn list(transport: &MemoryTransport, prefix: &str, marker: &str, delimiter: &str, max_keys: u32) -> ListPage {
        let mut collector = PageCollector::default();
        transport.list_objects(
            &endpoint(),
            &ListRequest {
                prefix,
                marker,
                delimiter,
                max_keys,
            },
            &mut collector,
        );
        collector.response.check("list", None).unwrap();
        collector.page
    }

    fn keys(page: &ListPage) -> Vec<&str> {
        page.contents.iter().map(|c| c.key.as_str()).collect()
    }

    #[test]
    fn test_put_streams_whole_body_in_chunks() {
        let transport = small_chunks();
        let response = put(&transport, "k", b"Hello OBS, this is a put test.");
        assert!(response.check("put", Some("k")).is_ok());
        assert!(response.request_id().is_some());
        assert_eq!(
            transport.object_data(BUCKET, "k").unwrap(),
            Bytes::from_static(b"Hello OBS, this is a put test.")
        );
    }

    #[test]
    fn test_put_missing_bucket_fails() {
        let transport = MemoryTransport::default();
        let response = put(&transport, "k", b"data");
        assert_eq!(response.status(), ObsStatus::NoSuchBucket);
        assert_eq!(
            response.error().and_then(|e| e.resource.as_deref()),
            Some(BUCKET)
        );
    }

    #[test]
    fn test_put_truncated_body_is_rejected() {
        let transport = small_chunks();
        let short = b"abc".to_vec();
        let mut state = ReaderTransfer::new(&short[..], 10);
        transport.put_object(&endpoint(), "k", 10, &PutProperties::default(), &mut state);
        assert_eq!(state.response.status(), ObsStatus::IncompleteBody);
        assert!(transport.object_data(BUCKET, "k").is_none());
    }

    #[test]
    fn test_append_chain_and_mismatch() {
        let transport = small_chunks();

        let first = append(&transport, "a", b"Hello ", "0");
        assert_eq!(first.status(), ObsStatus::Ok);
        assert_eq!(first.next_append_position(), Some(6));

        let second = append(&transport, "a", b"World!", "6");
        assert_eq!(second.next_append_position(), Some(12));
        assert_eq!(
            transport.object_data(BUCKET, "a").unwrap(),
            Bytes::from_static(b"Hello World!")
        );

        let mismatch = append(&transport, "a", b"x", "1000");
        assert_eq!(mismatch.status(), ObsStatus::PositionNotEqualToLength);
        let details = mismatch.error().unwrap();
        assert_eq!(
            details.extra_details,
            vec![("NextAppendPosition".to_string(), "12".to_string())]
        );
        assert_eq!(transport.object_data(BUCKET, "a").unwrap().len(), 12);
    }

    #[test]
    fn test_append_to_new_key_requires_zero() {
        let transport = small_chunks();
        let response = append(&transport, "fresh", b"data", "5");
        assert_eq!(response.status(), ObsStatus::PositionNotEqualToLength);
        assert!(transport.object_data(BUCKET, "fresh").is_none());
    }

    #[test]
    fn test_append_to_normal_object_is_rejected() {
        let transport = small_chunks();
        put(&transport, "n", b"abc");
        let response = append(&transport, "n", b"d", "3");
        assert_eq!(response.status(), ObsStatus::ObjectNotAppendable);
    }

    #[test]
    fn test_append_invalid_position() {
        let transport = small_chunks();
        let response = append(&transport, "a", b"d", "-1");
        assert_eq!(response.status(), ObsStatus::InvalidParameter);
    }

    #[test]
    fn test_list_pages_with_marker() {
        let transport = small_chunks();
        for key in ["a", "b", "c", "d", "e"] {
            put(&transport, key, b"x");
        }

        let first = list(&transport, "", "", "", 2);
        assert_eq!(keys(&first), vec!["a", "b"]);
        assert!(first.is_truncated);
        assert_eq!(first.next_marker.as_deref(), Some("b"));

        let second = list(&transport, "", "b", "", 2);
        assert_eq!(keys(&second), vec!["c", "d"]);

        let last = list(&transport, "", "d", "", 2);
        assert_eq!(keys(&last), vec!["e"]);
        assert!(!last.is_truncated);
        assert_eq!(last.next_marker, None);

        assert!(list(&transport, "", "e", "", 2).contents.is_empty());
    }

    #[test]
    fn test_list_prefix_and_delimiter() {
        let transport = small_chunks();
        for key in ["logs/2024/a", "logs/2024/b", "logs/top", "other", "logs/2025/c"] {
            put(&transport, key, b"x");
        }

        let page = list(&transport, "logs/", "", "/", 1000);
        assert_eq!(keys(&page), vec!["logs/top"]);
        assert_eq!(page.common_prefixes, vec!["logs/2024/", "logs/2025/"]);

        let flat = list(&transport, "logs/", "", "", 1000);
        assert_eq!(
            keys(&flat),
            vec!["logs/2024/a", "logs/2024/b", "logs/2025/c", "logs/top"]
        );
    }

    #[test]
    fn test_batch_delete_bounds() {
        #[derive(Default)]
        struct Deleted {
            response: ResponseState,
            keys: Vec<String>,
        }
        impl ResponseHandler for Deleted {
            fn on_properties(&mut self, p: Option<&ResponseProperties>) -> ObsStatus {
                self.response.on_properties(p)
            }
            fn on_complete(&mut self, status: ObsStatus, error: Option<&ErrorDetails>) {
                self.response.on_complete(status, error);
            }
        }
        impl DeleteHandler for Deleted {
            fn on_deleted(&mut self, results: &[DeleteResult]) -> ObsStatus {
                self.keys.extend(results.iter().map(|r| r.key.clone()));
                ObsStatus::Ok
            }
        }

        let transport = small_chunks();
        put(&transport, "a", b"1");
        put(&transport, "b", b"2");

        let mut handler = Deleted::default();
        transport.batch_delete_objects(
            &endpoint(),
            &[ObjectInfo::new("a"), ObjectInfo::new("missing")],
            &mut handler,
        );
        assert_eq!(handler.response.status(), ObsStatus::Ok);
        assert_eq!(handler.keys, vec!["a", "missing"]);
        assert_eq!(transport.object_count(BUCKET), 1);

        let mut empty = Deleted::default();
        transport.batch_delete_objects(&endpoint(), &[], &mut empty);
        assert_eq!(empty.response.status(), ObsStatus::MalformedXml);

        let oversized: Vec<ObjectInfo> = (0..1001).map(|i| ObjectInfo::new(format!("k{i}"))).collect();
        let mut big = Deleted::default();
        transport.batch_delete_objects(&endpoint(), &oversized, &mut big);
        assert_eq!(big.response.status(), ObsStatus::MalformedXml);
    }

    #[test]
    fn test_storage_info_counts_objects() {
        let transport = small_chunks();
        put(&transport, "a", b"12345");
        append(&transport, "b", b"678", "0");

        let mut state = StorageInfoState::default();
        transport.get_bucket_storage_info(&endpoint(), &mut state);
        state.response.check("storage_info", None).unwrap();
        assert_eq!(state.capacity, "8");
        assert_eq!(state.parse_object_count().unwrap(), 2);
    }

    #[test]
    fn test_delete_missing_key_is_ok() {
        let transport = small_chunks();
        let mut state = ResponseState::new();
        transport.delete_object(&endpoint(), &ObjectInfo::new("nope"), &mut state);
        assert_eq!(state.status(), ObsStatus::Ok);
    }

    #[test]
    fn test_discarded_bodies_keep_sizes() {
        let transport = MemoryTransport::new(&TransportConfig {
            retain_data: false,
            ..Default::default()
        })
        .with_bucket(BUCKET);
        put(&transport, "p", b"12345");
        assert_eq!(append(&transport, "a", b"abc", "0").next_append_position(), Some(3));
        assert_eq!(append(&transport, "a", b"de", "3").next_append_position(), Some(5));
        assert_eq!(append(&transport, "a", b"x", "4").status(), ObsStatus::PositionNotEqualToLength);
        assert!(transport.object_data(BUCKET, "p").unwrap().is_empty());

        let page = list(&transport, "", "", "", 10);
        let sizes: Vec<u64> = page.contents.iter().map(|c| c.size).collect();
        assert_eq!(sizes, vec![5, 5]);
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("state.db");

        let transport = small_chunks().with_bucket("empty-bucket");
        put(&transport, "normal", b"abc");
        append(&transport, "appendable", b"de", "0");
        transport.save_snapshot(&path).unwrap();

        let restored = MemoryTransport::open(&TransportConfig {
            chunk_size: 4,
            latency_ms: 0,
            snapshot_path: Some(path.to_string_lossy().to_string()),
            retain_data: true,
        })
        .unwrap();
        assert_eq!(restored.object_count(BUCKET), 2);
        assert_eq!(restored.object_count("empty-bucket"), 0);
        assert_eq!(
            restored.object_data(BUCKET, "normal").unwrap(),
            Bytes::from_static(b"abc")
        );

        // Appendability survives the snapshot.
        let next = append(&restored, "appendable", b"f", "2");
        assert_eq!(next.next_append_position(), Some(3));
        let rejected = append(&restored, "normal", b"d", "3");
        assert_eq!(rejected.status(), ObsStatus::ObjectNotAppendable);
    }
}
