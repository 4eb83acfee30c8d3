//! Records exchanged between a transport and its callbacks.

use std::fmt::Write as _;

/// Response metadata delivered to the properties callback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseProperties {
    /// Service request identifier.
    pub request_id: Option<String>,
    /// Quoted ETag of the written object.
    pub etag: Option<String>,
    /// Content length reported by the service.
    pub content_length: Option<u64>,
    /// Object type (`Normal` or `Appendable`).
    pub object_type: Option<String>,
    /// Decimal offset at which the next append must start.
    pub next_append_position: Option<String>,
    /// User metadata (`x-obs-meta-*`) pairs.
    pub meta_data: Vec<(String, String)>,
}

/// Error detail delivered alongside a non-OK completion status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorDetails {
    /// Service error message.
    pub message: Option<String>,
    /// Resource the error refers to.
    pub resource: Option<String>,
    /// Free-form additional description.
    pub further_details: Option<String>,
    /// Extra named values (e.g. the expected append position).
    pub extra_details: Vec<(String, String)>,
    /// Raw response header lines.
    pub error_headers: Vec<String>,
}

impl ErrorDetails {
    /// Whether no field carries any information.
    pub fn is_empty(&self) -> bool {
        self.message.is_none()
            && self.resource.is_none()
            && self.further_details.is_none()
            && self.extra_details.is_empty()
            && self.error_headers.is_empty()
    }

    /// Render the detail as indented diagnostic lines.
    pub fn render(&self) -> String {
        let mut out = String::new();
        if let Some(message) = &self.message {
            let _ = writeln!(out, "Error Message:\n   {message}");
        }
        if let Some(resource) = &self.resource {
            let _ = writeln!(out, "Error Resource:\n   {resource}");
        }
        if let Some(further) = &self.further_details {
            let _ = writeln!(out, "Error further_details:\n   {further}");
        }
        for (i, (name, value)) in self.extra_details.iter().enumerate() {
            let _ = writeln!(out, "Error Extra Detail({i}):\n   {name}:{value}");
        }
        for (i, header) in self.error_headers.iter().enumerate() {
            let _ = writeln!(out, "Error Headers({i}):\n   {header}");
        }
        out
    }
}

/// Upload properties sent with put and append requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutProperties {
    /// MIME type of the body.
    pub content_type: String,
    /// User metadata pairs.
    pub meta_data: Vec<(String, String)>,
}

impl Default for PutProperties {
    fn default() -> Self {
        Self {
            content_type: "application/octet-stream".to_string(),
            meta_data: Vec::new(),
        }
    }
}

/// Object identity for delete requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Object key.
    pub key: String,
    /// Version id; `None` addresses the current version.
    pub version_id: Option<String>,
}

impl ObjectInfo {
    /// Address the current version of `key`.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            version_id: None,
        }
    }
}

/// Parameters of one list page request. Empty strings are sent as absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListRequest<'a> {
    /// Only keys starting with this prefix.
    pub prefix: &'a str,
    /// Exclusive lower bound.
    pub marker: &'a str,
    /// Grouping delimiter.
    pub delimiter: &'a str,
    /// Maximum entries (keys plus common prefixes) in the page.
    pub max_keys: u32,
}

/// One listed object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListContent {
    /// Object key.
    pub key: String,
    /// Size in bytes.
    pub size: u64,
    /// Quoted ETag.
    pub etag: String,
}

/// One page delivered to the list callback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Whether more entries follow.
    pub is_truncated: bool,
    /// Marker for the next page when truncated.
    pub next_marker: Option<String>,
    /// Objects in this page.
    pub contents: Vec<ListContent>,
    /// Common prefixes rolled up at the delimiter.
    pub common_prefixes: Vec<String>,
}

/// Per-key result of a bulk delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteResult {
    /// Object key.
    pub key: String,
    /// Error code, `None` when the key was deleted.
    pub code: Option<String>,
    /// Error message for failed keys.
    pub message: Option<String>,
}

impl DeleteResult {
    /// A successful per-key result.
    pub fn deleted(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            code: None,
            message: None,
        }
    }
}
