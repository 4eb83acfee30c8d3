//! Response interpretation: turns the properties and completion callbacks
//! into a typed outcome the facade can inspect after the call returns.

use tracing::{debug, warn};

use super::handler::{ResponseHandler, StorageInfoHandler};
use super::status::ObsStatus;
use super::types::{ErrorDetails, ResponseProperties};
use crate::errors::ObsError;

/// Outcome state shared by every operation kind.
#[derive(Debug, Default)]
pub struct ResponseState {
    status: ObsStatus,
    error: Option<ErrorDetails>,
    request_id: Option<String>,
    next_append_position: Option<u64>,
    completed: bool,
}

impl ResponseState {
    /// Fresh state; the status starts at the not-yet-completed sentinel.
    pub fn new() -> Self {
        Self::default()
    }

    /// Terminal status, or [`ObsStatus::Butt`] if completion never fired.
    pub fn status(&self) -> ObsStatus {
        self.status
    }

    /// Error detail captured at completion.
    pub fn error(&self) -> Option<&ErrorDetails> {
        self.error.as_ref()
    }

    /// Request id from the response properties.
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// Parsed `next_append_position`, if the service sent one.
    pub fn next_append_position(&self) -> Option<u64> {
        self.next_append_position
    }

    /// Turn the terminal status into a `Result` for `operation` on `key`.
    pub fn check(&self, operation: &'static str, key: Option<&str>) -> Result<(), ObsError> {
        if self.status.is_ok() {
            return Ok(());
        }
        Err(ObsError::Status {
            operation,
            key: key.map(str::to_owned),
            status: self.status,
            details: self.error.clone().unwrap_or_default(),
        })
    }
}

impl ResponseHandler for ResponseState {
    fn on_properties(&mut self, properties: Option<&ResponseProperties>) -> ObsStatus {
        let Some(properties) = properties else {
            warn!("response properties callback received no properties");
            return ObsStatus::Ok;
        };

        if let Some(request_id) = &properties.request_id {
            self.request_id = Some(request_id.clone());
        }

        if let Some(raw) = &properties.next_append_position {
            match raw.trim().parse::<u64>() {
                Ok(position) => self.next_append_position = Some(position),
                Err(e) => warn!(value = %raw, "ignoring unparsable next append position: {e}"),
            }
        }

        ObsStatus::Ok
    }

    fn on_complete(&mut self, status: ObsStatus, error: Option<&ErrorDetails>) {
        if self.completed {
            warn!(%status, "completion reported twice; keeping first status {}", self.status);
            return;
        }
        self.completed = true;
        self.status = status;

        if let Some(details) = error.filter(|d| !d.is_empty()) {
            if status.is_ok() {
                debug!("completion carried error detail with OK status:\n{}", details.render());
            } else {
                warn!(%status, "request failed:\n{}", details.render());
            }
            self.error = Some(details.clone());
        }
    }
}

/// State for the bucket storage info query.
#[derive(Debug, Default)]
pub struct StorageInfoState {
    /// Shared outcome.
    pub response: ResponseState,
    /// Capacity text as returned by the service.
    pub capacity: String,
    /// Object count text as returned by the service.
    pub object_count: String,
}

impl StorageInfoState {
    /// Parse the object count field.
    pub fn parse_object_count(&self) -> Result<u64, ObsError> {
        self.object_count
            .trim()
            .parse::<u64>()
            .map_err(|source| ObsError::InvalidCount {
                value: self.object_count.clone(),
                source,
            })
    }
}

impl ResponseHandler for StorageInfoState {
    fn on_properties(&mut self, properties: Option<&ResponseProperties>) -> ObsStatus {
        self.response.on_properties(properties)
    }

    fn on_complete(&mut self, status: ObsStatus, error: Option<&ErrorDetails>) {
        self.response.on_complete(status, error);
    }
}

impl StorageInfoHandler for StorageInfoState {
    fn on_storage_info(&mut self, capacity: &str, object_count: &str) {
        self.capacity = capacity.to_string();
        self.object_count = object_count.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn append_properties(position: &str) -> ResponseProperties {
        ResponseProperties {
            next_append_position: Some(position.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_properties_is_ok_noop() {
        let mut state = ResponseState::new();
        assert_eq!(state.on_properties(None), ObsStatus::Ok);
        assert_eq!(state.next_append_position(), None);
        assert_eq!(state.status(), ObsStatus::Butt);
    }

    #[test]
    fn test_parses_next_append_position() {
        let mut state = ResponseState::new();
        state.on_properties(Some(&append_properties("12")));
        assert_eq!(state.next_append_position(), Some(12));
    }

    #[test]
    fn test_absent_position_keeps_prior_value() {
        let mut state = ResponseState::new();
        state.on_properties(Some(&append_properties("6")));
        state.on_properties(Some(&ResponseProperties::default()));
        assert_eq!(state.next_append_position(), Some(6));
    }

    #[test]
    fn test_unparsable_position_keeps_prior_value() {
        let mut state = ResponseState::new();
        state.on_properties(Some(&append_properties("6")));
        state.on_properties(Some(&append_properties("six")));
        assert_eq!(state.next_append_position(), Some(6));
    }

    #[test]
    fn test_completion_is_single_shot() {
        let mut state = ResponseState::new();
        state.on_complete(ObsStatus::Ok, None);
        state.on_complete(ObsStatus::InternalError, None);
        assert_eq!(state.status(), ObsStatus::Ok);
        assert!(state.check("put", Some("k")).is_ok());
    }

    #[test]
    fn test_check_without_completion_fails() {
        let state = ResponseState::new();
        let err = state.check("put", Some("k")).unwrap_err();
        assert_eq!(err.status(), Some(ObsStatus::Butt));
    }

    #[test]
    fn test_check_carries_error_detail() {
        let mut state = ResponseState::new();
        let details = ErrorDetails {
            message: Some("bad position".to_string()),
            resource: Some("k".to_string()),
            ..Default::default()
        };
        state.on_complete(ObsStatus::PositionNotEqualToLength, Some(&details));

        match state.check("append", Some("k")).unwrap_err() {
            ObsError::Status {
                operation,
                key,
                status,
                details: carried,
            } => {
                assert_eq!(operation, "append");
                assert_eq!(key.as_deref(), Some("k"));
                assert_eq!(status, ObsStatus::PositionNotEqualToLength);
                assert_eq!(carried, details);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_storage_info_parse() {
        let mut state = StorageInfoState::default();
        state.on_storage_info("1024", " 42 ");
        assert_eq!(state.parse_object_count().unwrap(), 42);

        state.on_storage_info("1024", "");
        assert!(matches!(
            state.parse_object_count(),
            Err(ObsError::InvalidCount { .. })
        ));
    }
}
