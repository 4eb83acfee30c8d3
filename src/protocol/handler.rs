//! Callback contracts a transport drives during one call.
//!
//! Every call receives one handler. The transport invokes
//! [`ResponseHandler::on_properties`] once response metadata is known and
//! [`ResponseHandler::on_complete`] exactly once at the end. Operation
//! kinds with a body or a result payload extend the base contract.

use super::status::ObsStatus;
use super::types::{DeleteResult, ErrorDetails, ListPage, ResponseProperties};

/// Properties and completion callbacks shared by every operation.
pub trait ResponseHandler {
    /// Receive response metadata. `None` signals malformed callback data;
    /// implementations must still return a status.
    fn on_properties(&mut self, properties: Option<&ResponseProperties>) -> ObsStatus;

    /// Receive the terminal status and optional error detail.
    fn on_complete(&mut self, status: ObsStatus, error: Option<&ErrorDetails>);
}

/// Body producer for uploads.
pub trait BodyHandler: ResponseHandler {
    /// Fill `buf` with the next bytes of the body and return how many were
    /// written. Returning 0 ends the body.
    fn next_chunk(&mut self, buf: &mut [u8]) -> usize;
}

/// Page consumer for listings.
pub trait ListHandler: ResponseHandler {
    /// Receive one page of results.
    fn on_page(&mut self, page: &ListPage) -> ObsStatus;
}

/// Per-key result consumer for bulk deletes.
pub trait DeleteHandler: ResponseHandler {
    /// Receive the per-key outcomes of one bulk delete.
    fn on_deleted(&mut self, results: &[DeleteResult]) -> ObsStatus;
}

/// Text-field consumer for the bucket storage info query.
pub trait StorageInfoHandler: ResponseHandler {
    /// Receive the bucket capacity and object count as the service
    /// encodes them.
    fn on_storage_info(&mut self, capacity: &str, object_count: &str);
}
