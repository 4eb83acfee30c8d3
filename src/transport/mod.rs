//! Transport seam.
//!
//! The [`Transport`] trait is the service operation surface the client
//! consumes. A vendor SDK binding implements it by issuing the real
//! request and driving the handler callbacks; [`memory::MemoryTransport`]
//! implements it in process with the service's observable semantics.
//!
//! Every method is blocking: it returns only after the handler's
//! completion callback has fired (or the transport gave up without
//! firing it, which leaves the handler's status at the sentinel).

use crate::config::EndpointConfig;
use crate::protocol::{
    BodyHandler, DeleteHandler, ListHandler, ListRequest, ObjectInfo, ObsStatus, PutProperties,
    ResponseHandler, StorageInfoHandler,
};

pub mod memory;

/// Blocking, callback-driven object storage operations.
pub trait Transport: Send + Sync + 'static {
    /// Process-wide setup (network stack, allocators). Called at most once.
    fn initialize(&self) -> ObsStatus {
        ObsStatus::Ok
    }

    /// Process-wide teardown. Called at most once, after [`Self::initialize`].
    fn deinitialize(&self) {}

    /// Upload `content_length` bytes pulled from `handler` to `key`.
    fn put_object(
        &self,
        endpoint: &EndpointConfig,
        key: &str,
        content_length: u64,
        properties: &PutProperties,
        handler: &mut dyn BodyHandler,
    );

    /// Append `content_length` bytes pulled from `handler` to `key`,
    /// starting at the decimal offset `position`.
    fn append_object(
        &self,
        endpoint: &EndpointConfig,
        key: &str,
        content_length: u64,
        position: &str,
        properties: &PutProperties,
        handler: &mut dyn BodyHandler,
    );

    /// Delete one object.
    fn delete_object(
        &self,
        endpoint: &EndpointConfig,
        object: &ObjectInfo,
        handler: &mut dyn ResponseHandler,
    );

    /// Delete up to 1000 objects in one request.
    fn batch_delete_objects(
        &self,
        endpoint: &EndpointConfig,
        objects: &[ObjectInfo],
        handler: &mut dyn DeleteHandler,
    );

    /// List one page of keys.
    fn list_objects(
        &self,
        endpoint: &EndpointConfig,
        request: &ListRequest<'_>,
        handler: &mut dyn ListHandler,
    );

    /// Query bucket capacity and object count.
    fn get_bucket_storage_info(
        &self,
        endpoint: &EndpointConfig,
        handler: &mut dyn StorageInfoHandler,
    );
}
