//! Bulk delete batching.

use tracing::warn;

use crate::errors::{ObsError, MAX_DELETE_BATCH};
use crate::protocol::{
    DeleteHandler, DeleteResult, ErrorDetails, ObjectInfo, ObsStatus, ResponseHandler,
    ResponseProperties, ResponseState,
};

/// Keys for one bulk delete request. Always holds 1..=1000 entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteBatch {
    objects: Vec<ObjectInfo>,
}

impl DeleteBatch {
    /// Build a batch, rejecting empty or oversized key lists.
    pub fn new<S: AsRef<str>>(keys: &[S]) -> Result<Self, ObsError> {
        if keys.is_empty() || keys.len() > MAX_DELETE_BATCH {
            return Err(ObsError::InvalidBatch { len: keys.len() });
        }
        Ok(Self::from_chunk(keys))
    }

    fn from_chunk<S: AsRef<str>>(keys: &[S]) -> Self {
        Self {
            objects: keys.iter().map(|k| ObjectInfo::new(k.as_ref())).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn objects(&self) -> &[ObjectInfo] {
        &self.objects
    }

    pub fn first_key(&self) -> &str {
        &self.objects[0].key
    }
}

/// Split `keys` into ordered batches of at most 1000.
pub fn chunk_keys<S: AsRef<str>>(keys: &[S]) -> Vec<DeleteBatch> {
    keys.chunks(MAX_DELETE_BATCH)
        .map(DeleteBatch::from_chunk)
        .collect()
}

/// Handler state for one bulk delete call.
#[derive(Debug, Default)]
pub struct DeleteState {
    pub response: ResponseState,
    results: Vec<DeleteResult>,
}

impl DeleteState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-key results delivered by the service.
    pub fn results(&self) -> &[DeleteResult] {
        &self.results
    }

    /// Keys the service reported as not deleted.
    pub fn failed(&self) -> impl Iterator<Item = &DeleteResult> {
        self.results.iter().filter(|r| r.code.is_some())
    }
}

impl ResponseHandler for DeleteState {
    fn on_properties(&mut self, properties: Option<&ResponseProperties>) -> ObsStatus {
        self.response.on_properties(properties)
    }

    fn on_complete(&mut self, status: ObsStatus, error: Option<&ErrorDetails>) {
        self.response.on_complete(status, error);
    }
}

impl DeleteHandler for DeleteState {
    fn on_deleted(&mut self, results: &[DeleteResult]) -> ObsStatus {
        for failed in results.iter().filter(|r| r.code.is_some()) {
            warn!(
                key = %failed.key,
                code = failed.code.as_deref().unwrap_or_default(),
                "key not deleted: {}",
                failed.message.as_deref().unwrap_or_default()
            );
        }
        self.results.extend_from_slice(results);
        ObsStatus::Ok
    }
}

/// Outcome of a best-effort multi-batch delete.
#[derive(Debug, Default)]
pub struct DeleteReport {
    /// Keys in batches that completed with OK status.
    pub deleted: usize,
    /// Number of batches issued.
    pub batches: usize,
    /// Failed batches, in issue order.
    pub failures: Vec<ObsError>,
}

impl DeleteReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Deleted key count, or the first batch failure.
    pub fn into_result(self) -> Result<usize, ObsError> {
        match self.failures.into_iter().next() {
            Some(first) => Err(first),
            None => Ok(self.deleted),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("key-{i:05}")).collect()
    }

    #[test]
    fn test_chunk_sizes() {
        for (total, expected) in [(0usize, vec![]), (1, vec![1]), (1000, vec![1000]), (2500, vec![1000, 1000, 500])] {
            let batches = chunk_keys(&keys(total));
            let sizes: Vec<usize> = batches.iter().map(DeleteBatch::len).collect();
            assert_eq!(sizes, expected, "chunking {total} keys");
        }
    }

    #[test]
    fn test_chunk_preserves_order() {
        let input = keys(2001);
        let flattened: Vec<String> = chunk_keys(&input)
            .iter()
            .flat_map(|b| b.objects().iter().map(|o| o.key.clone()))
            .collect();
        assert_eq!(flattened, input);
    }

    #[test]
    fn test_batch_bounds() {
        assert!(matches!(
            DeleteBatch::new::<String>(&[]),
            Err(ObsError::InvalidBatch { len: 0 })
        ));
        assert!(matches!(
            DeleteBatch::new(&keys(1001)),
            Err(ObsError::InvalidBatch { len: 1001 })
        ));
        let batch = DeleteBatch::new(&["a", "a"]).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.first_key(), "a");
    }

    #[test]
    fn test_delete_state_collects_failures() {
        let mut state = DeleteState::new();
        state.on_deleted(&[
            DeleteResult::deleted("a"),
            DeleteResult {
                key: "b".to_string(),
                code: Some("AccessDenied".to_string()),
                message: Some("denied".to_string()),
            },
        ]);
        assert_eq!(state.results().len(), 2);
        assert_eq!(state.failed().map(|r| r.key.as_str()).collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn test_report_returns_first_failure() {
        let report = DeleteReport {
            deleted: 1000,
            batches: 3,
            failures: vec![ObsError::InvalidBatch { len: 1 }, ObsError::InvalidBatch { len: 2 }],
        };
        assert!(!report.is_success());
        assert!(matches!(
            report.into_result(),
            Err(ObsError::InvalidBatch { len: 1 })
        ));

        let ok = DeleteReport {
            deleted: 7,
            batches: 1,
            failures: Vec::new(),
        };
        assert_eq!(ok.into_result().unwrap(), 7);
    }
}
