//! Paginated listing.

use tracing::debug;

use crate::errors::ObsError;
use crate::progress::progress_bar;
use crate::protocol::{
    ErrorDetails, ListHandler, ListPage, ObsStatus, ResponseHandler, ResponseProperties,
    ResponseState,
};

/// Page size requested from the service.
pub const MAX_LIST_KEYS: u32 = 1000;

/// Listing filters.
///
/// The default lists from the beginning with no prefix and groups at `/`,
/// so only top-level keys are returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListOptions {
    /// Exclusive lower bound on returned keys.
    pub start_key: String,
    /// Only keys starting with this prefix.
    pub prefix: String,
    /// Keys containing the delimiter after the prefix are grouped away.
    pub delimiter: String,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            start_key: String::new(),
            prefix: String::new(),
            delimiter: "/".to_string(),
        }
    }
}

impl ListOptions {
    /// Every key in the bucket: no bound, no prefix, no grouping.
    pub fn everything() -> Self {
        Self {
            delimiter: String::new(),
            ..Self::default()
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_start_key(mut self, start_key: impl Into<String>) -> Self {
        self.start_key = start_key.into();
        self
    }

    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    /// True when no filter is set, i.e. the listing covers the whole bucket.
    pub fn is_unfiltered(&self) -> bool {
        self.start_key.is_empty() && self.prefix.is_empty() && self.delimiter.is_empty()
    }
}

/// Handler state for one list page call.
#[derive(Debug, Default)]
pub struct ListState {
    pub response: ResponseState,
    keys: Vec<String>,
    common_prefixes: Vec<String>,
    is_truncated: bool,
}

impl ListState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn common_prefixes(&self) -> &[String] {
        &self.common_prefixes
    }

    pub fn is_truncated(&self) -> bool {
        self.is_truncated
    }

    pub fn into_keys(self) -> Vec<String> {
        self.keys
    }
}

impl ResponseHandler for ListState {
    fn on_properties(&mut self, properties: Option<&ResponseProperties>) -> ObsStatus {
        self.response.on_properties(properties)
    }

    fn on_complete(&mut self, status: ObsStatus, error: Option<&ErrorDetails>) {
        self.response.on_complete(status, error);
    }
}

impl ListHandler for ListState {
    fn on_page(&mut self, page: &ListPage) -> ObsStatus {
        self.keys.extend(page.contents.iter().map(|c| c.key.clone()));
        self.common_prefixes
            .extend(page.common_prefixes.iter().cloned());
        self.is_truncated = page.is_truncated;
        ObsStatus::Ok
    }
}

/// Accumulates keys across pages, advancing an exclusive start key.
///
/// Listing ends at the first page that returns no keys.
#[derive(Debug)]
pub struct ListingCursor {
    next_start_key: String,
    accumulated_keys: Vec<String>,
    approximate_total: Option<u64>,
    pages: usize,
}

impl ListingCursor {
    pub fn new(start_key: &str, approximate_total: Option<u64>) -> Self {
        Self {
            next_start_key: start_key.to_string(),
            accumulated_keys: Vec::new(),
            approximate_total,
            pages: 0,
        }
    }

    pub fn next_start_key(&self) -> &str {
        &self.next_start_key
    }

    pub fn keys(&self) -> &[String] {
        &self.accumulated_keys
    }

    pub fn pages(&self) -> usize {
        self.pages
    }

    /// Absorb one page. Returns `false` once the listing is complete.
    pub fn advance(&mut self, page_keys: Vec<String>) -> bool {
        let Some(last) = page_keys.last() else {
            return false;
        };
        self.next_start_key = last.clone();
        self.accumulated_keys.extend(page_keys);
        self.pages += 1;
        true
    }

    /// Fetch pages with `fetch(start_key)` until one comes back empty.
    ///
    /// A failed page aborts the listing.
    pub fn drain<F>(mut self, mut fetch: F) -> Result<Vec<String>, ObsError>
    where
        F: FnMut(&str) -> Result<Vec<String>, ObsError>,
    {
        let progress = progress_bar(self.approximate_total);
        loop {
            let page = fetch(&self.next_start_key)?;
            let page_len = page.len();
            if !self.advance(page) {
                break;
            }
            debug!(
                page = self.pages,
                page_len,
                total = self.accumulated_keys.len(),
                next_start_key = %self.next_start_key,
                "listed page"
            );
            progress.set_position(self.accumulated_keys.len() as u64);
        }
        progress.abandon();
        Ok(self.accumulated_keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages_of<'a>(
        all: &'a [&'a str],
        size: usize,
    ) -> impl FnMut(&str) -> Result<Vec<String>, ObsError> + 'a {
        move |start: &str| {
            Ok(all
                .iter()
                .filter(|k| **k > start)
                .take(size)
                .map(|k| k.to_string())
                .collect())
        }
    }

    #[test]
    fn test_default_options() {
        let options = ListOptions::default();
        assert_eq!(options.delimiter, "/");
        assert!(!options.is_unfiltered());
        assert!(ListOptions::everything().is_unfiltered());
        assert!(!ListOptions::everything().with_prefix("a").is_unfiltered());
    }

    #[test]
    fn test_drain_walks_pages_in_order() {
        let all = ["a", "b", "c", "d", "e"];
        let mut starts = Vec::new();
        let mut inner = pages_of(&all, 2);
        let keys = ListingCursor::new("", None)
            .drain(|start| {
                starts.push(start.to_string());
                inner(start)
            })
            .unwrap();
        assert_eq!(keys, vec!["a", "b", "c", "d", "e"]);
        assert_eq!(starts, vec!["", "b", "d", "e"]);
    }

    #[test]
    fn test_drain_honours_start_key() {
        let all = ["a", "b", "c"];
        let keys = ListingCursor::new("a", Some(3))
            .drain(pages_of(&all, 1000))
            .unwrap();
        assert_eq!(keys, vec!["b", "c"]);
    }

    #[test]
    fn test_drain_propagates_page_failure() {
        let mut calls = 0;
        let result = ListingCursor::new("", None).drain(|_| {
            calls += 1;
            if calls == 2 {
                Err(ObsError::InvalidBatch { len: 0 })
            } else {
                Ok(vec![format!("k{calls}")])
            }
        });
        assert!(result.is_err());
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_advance_never_shrinks() {
        let mut cursor = ListingCursor::new("", None);
        assert!(cursor.advance(vec!["x".to_string()]));
        assert!(!cursor.advance(Vec::new()));
        assert_eq!(cursor.keys(), ["x".to_string()]);
        assert_eq!(cursor.next_start_key(), "x");
        assert_eq!(cursor.pages(), 1);
    }

    #[test]
    fn test_list_state_collects_keys_only() {
        let mut state = ListState::new();
        let page = ListPage {
            is_truncated: true,
            next_marker: Some("b".to_string()),
            contents: vec![crate::protocol::ListContent {
                key: "b".to_string(),
                size: 1,
                etag: "\"e\"".to_string(),
            }],
            common_prefixes: vec!["a/".to_string()],
        };
        assert_eq!(state.on_page(&page), ObsStatus::Ok);
        assert_eq!(state.keys(), ["b".to_string()]);
        assert_eq!(state.common_prefixes(), ["a/".to_string()]);
        assert!(state.is_truncated());
    }
}
