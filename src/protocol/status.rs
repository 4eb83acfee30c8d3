//! Terminal status codes reported by the transfer protocol.

use std::fmt;

/// Outcome of a single protocol call, as delivered to the completion
/// callback.
///
/// `Butt` is the "not yet completed" sentinel every operation state starts
/// from; a call whose completion callback never fires keeps it and is
/// therefore treated as failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObsStatus {
    /// The request succeeded.
    Ok,
    /// Global initialization of the transport failed.
    InitFailed,
    /// A local allocation failed.
    OutOfMemory,
    /// A request argument was rejected before or by the service.
    InvalidParameter,
    /// The connection to the endpoint could not be established.
    ConnectionFailed,
    /// The request timed out inside the transport.
    RequestTimeout,
    /// The body producer stopped before the declared content length.
    IncompleteBody,
    /// The target bucket does not exist.
    NoSuchBucket,
    /// The target key does not exist.
    NoSuchKey,
    /// The credentials were rejected.
    AccessDenied,
    /// An append position did not match the object's current length.
    PositionNotEqualToLength,
    /// Append was attempted on an object created by a plain put.
    ObjectNotAppendable,
    /// A bulk delete carried an empty or oversized key list.
    MalformedXml,
    /// The service is temporarily unavailable.
    ServiceUnavailable,
    /// The service reported an internal error.
    InternalError,
    /// Completion has not been reported yet.
    Butt,
}

impl ObsStatus {
    /// Human-readable status name, as printed in diagnostics and used as a
    /// metrics label.
    pub fn name(&self) -> &'static str {
        match self {
            ObsStatus::Ok => "OK",
            ObsStatus::InitFailed => "InitCurlFailed",
            ObsStatus::OutOfMemory => "OutOfMemory",
            ObsStatus::InvalidParameter => "InvalidParameter",
            ObsStatus::ConnectionFailed => "ConnectionFailed",
            ObsStatus::RequestTimeout => "RequestTimeout",
            ObsStatus::IncompleteBody => "IncompleteBody",
            ObsStatus::NoSuchBucket => "NoSuchBucket",
            ObsStatus::NoSuchKey => "NoSuchKey",
            ObsStatus::AccessDenied => "AccessDenied",
            ObsStatus::PositionNotEqualToLength => "PositionNotEqualToLength",
            ObsStatus::ObjectNotAppendable => "ObjectNotAppendable",
            ObsStatus::MalformedXml => "MalformedXML",
            ObsStatus::ServiceUnavailable => "ServiceUnavailable",
            ObsStatus::InternalError => "InternalError",
            ObsStatus::Butt => "BUTT",
        }
    }

    /// Whether this status denotes success.
    pub fn is_ok(&self) -> bool {
        matches!(self, ObsStatus::Ok)
    }
}

impl Default for ObsStatus {
    fn default() -> Self {
        ObsStatus::Butt
    }
}

impl fmt::Display for ObsStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_not_completed() {
        let status = ObsStatus::default();
        assert_eq!(status, ObsStatus::Butt);
        assert!(!status.is_ok());
    }

    #[test]
    fn test_names() {
        assert_eq!(ObsStatus::Ok.to_string(), "OK");
        assert_eq!(
            ObsStatus::PositionNotEqualToLength.name(),
            "PositionNotEqualToLength"
        );
        assert_eq!(ObsStatus::MalformedXml.name(), "MalformedXML");
    }
}
