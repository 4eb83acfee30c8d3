//! Error types for the client facade.
//!
//! A failed call carries the terminal protocol status together with the
//! service's error detail, so callers can print the full diagnostic, log
//! it, or match on the status.

use std::num::ParseIntError;

use thiserror::Error;

use crate::protocol::{ErrorDetails, ObsStatus};

/// Largest number of keys a single bulk delete may carry.
pub const MAX_DELETE_BATCH: usize = 1000;

/// Errors surfaced by [`crate::client::ObsClient`].
#[derive(Debug, Error)]
pub enum ObsError {
    /// The transport completed the call with a non-OK status.
    #[error("{operation} failed with status {status}{}", key_suffix(.key))]
    Status {
        operation: &'static str,
        key: Option<String>,
        status: ObsStatus,
        details: ErrorDetails,
    },

    /// The storage info response carried an object count that is not a number.
    #[error("invalid object count {value:?}: {source}")]
    InvalidCount {
        value: String,
        #[source]
        source: ParseIntError,
    },

    /// A bulk delete batch was empty or larger than [`MAX_DELETE_BATCH`].
    #[error("delete batch of {len} keys is outside 1..=1000")]
    InvalidBatch { len: usize },

    /// Global transport initialization failed.
    #[error("transport initialization failed with status {0}")]
    Init(ObsStatus),

    /// Transport teardown already ran; no new client can use it.
    #[error("transport has been shut down")]
    ShutDown,

    /// A local resource (file, buffer) could not be used.
    #[error("local I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn key_suffix(key: &Option<String>) -> String {
    key.as_ref()
        .map(|k| format!(" (key: {k})"))
        .unwrap_or_default()
}

impl ObsError {
    /// Short machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            ObsError::Status { status, .. } => status.name(),
            ObsError::InvalidCount { .. } => "InvalidCount",
            ObsError::InvalidBatch { .. } => "InvalidBatch",
            ObsError::Init(_) => "InitFailed",
            ObsError::ShutDown => "ShutDown",
            ObsError::Io(_) => "LocalIoError",
        }
    }

    /// Protocol status, for errors that came from the transport.
    pub fn status(&self) -> Option<ObsStatus> {
        match self {
            ObsError::Status { status, .. } => Some(*status),
            ObsError::Init(status) => Some(*status),
            _ => None,
        }
    }

    /// Multi-line diagnostic: the error line followed by any service
    /// error detail.
    pub fn diagnostic(&self) -> String {
        match self {
            ObsError::Status { details, .. } if !details.is_empty() => {
                format!("{self}\n{}", details.render())
            }
            _ => self.to_string(),
        }
    }
}
