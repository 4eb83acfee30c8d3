//! The callback-driven transfer protocol.
//!
//! A transport performs each request by calling back into a per-call
//! handler: a properties callback, an optional streaming body producer or
//! result consumer, and a single completion callback. This module holds the
//! records passed to those callbacks, the handler traits, and the typed
//! per-operation states that turn the callbacks into blocking results.

pub mod handler;
pub mod response;
pub mod status;
pub mod transfer;
pub mod types;

pub use handler::{BodyHandler, DeleteHandler, ListHandler, ResponseHandler, StorageInfoHandler};
pub use response::{ResponseState, StorageInfoState};
pub use status::ObsStatus;
pub use transfer::{ReaderTransfer, TransferState};
pub use types::{
    DeleteResult, ErrorDetails, ListContent, ListPage, ListRequest, ObjectInfo, PutProperties,
    ResponseProperties,
};
