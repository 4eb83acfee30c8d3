//! Body producers for uploads.
//!
//! The transport pulls the body chunk by chunk; these states answer from a
//! payload the caller already holds, or from a reader of known length.

use std::io::{self, Read};

use tracing::trace;

use super::handler::{BodyHandler, ResponseHandler};
use super::response::ResponseState;
use super::status::ObsStatus;
use super::types::{ErrorDetails, ResponseProperties};

/// Upload state over a borrowed in-memory payload.
///
/// Invariant: `remaining + cursor == source.len()`.
#[derive(Debug)]
pub struct TransferState<'a> {
    source: &'a [u8],
    remaining: u64,
    cursor: u64,
    /// Outcome of the call.
    pub response: ResponseState,
}

impl<'a> TransferState<'a> {
    /// Start a transfer of `source` from offset 0.
    pub fn new(source: &'a [u8]) -> Self {
        Self {
            source,
            remaining: source.len() as u64,
            cursor: 0,
            response: ResponseState::new(),
        }
    }

    /// Declared content length.
    pub fn content_length(&self) -> u64 {
        self.source.len() as u64
    }

    /// Bytes not yet handed to the transport.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Bytes already handed to the transport.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }
}

impl ResponseHandler for TransferState<'_> {
    fn on_properties(&mut self, properties: Option<&ResponseProperties>) -> ObsStatus {
        self.response.on_properties(properties)
    }

    fn on_complete(&mut self, status: ObsStatus, error: Option<&ErrorDetails>) {
        self.response.on_complete(status, error);
    }
}

impl BodyHandler for TransferState<'_> {
    fn next_chunk(&mut self, buf: &mut [u8]) -> usize {
        let n = (buf.len() as u64).min(self.remaining) as usize;
        if n == 0 {
            return 0;
        }
        let start = self.cursor as usize;
        buf[..n].copy_from_slice(&self.source[start..start + n]);
        self.cursor += n as u64;
        self.remaining -= n as u64;
        trace!(
            sent = self.cursor,
            remaining = self.remaining,
            "body chunk produced"
        );
        n
    }
}

/// Upload state over a reader with a declared length, e.g. an open file.
///
/// A read error ends the body early; the transport sees a truncated body
/// and the error is kept for the caller.
#[derive(Debug)]
pub struct ReaderTransfer<R> {
    reader: R,
    content_length: u64,
    remaining: u64,
    read_error: Option<io::Error>,
    /// Outcome of the call.
    pub response: ResponseState,
}

impl<R: Read> ReaderTransfer<R> {
    /// Stream at most `content_length` bytes from `reader`.
    pub fn new(reader: R, content_length: u64) -> Self {
        Self {
            reader,
            content_length,
            remaining: content_length,
            read_error: None,
            response: ResponseState::new(),
        }
    }

    /// Declared content length.
    pub fn content_length(&self) -> u64 {
        self.content_length
    }

    /// Bytes not yet handed to the transport.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Take the read error that ended the body early, if any.
    pub fn take_read_error(&mut self) -> Option<io::Error> {
        self.read_error.take()
    }
}

impl<R: Read> ResponseHandler for ReaderTransfer<R> {
    fn on_properties(&mut self, properties: Option<&ResponseProperties>) -> ObsStatus {
        self.response.on_properties(properties)
    }

    fn on_complete(&mut self, status: ObsStatus, error: Option<&ErrorDetails>) {
        self.response.on_complete(status, error);
    }
}

impl<R: Read> BodyHandler for ReaderTransfer<R> {
    fn next_chunk(&mut self, buf: &mut [u8]) -> usize {
        if self.read_error.is_some() {
            return 0;
        }
        let want = (buf.len() as u64).min(self.remaining) as usize;
        if want == 0 {
            return 0;
        }
        loop {
            match self.reader.read(&mut buf[..want]) {
                Ok(n) => {
                    self.remaining -= n as u64;
                    return n;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.read_error = Some(e);
                    return 0;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunks_cover_payload_in_order() {
        let payload = b"Hello OBS, this is a put test.";
        let mut state = TransferState::new(payload);
        let mut out = Vec::new();
        let mut buf = [0u8; 7];
        loop {
            let n = state.next_chunk(&mut buf);
            if n == 0 {
                break;
            }
            assert!(n <= buf.len());
            assert_eq!(state.remaining() + state.cursor(), payload.len() as u64);
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out, payload);
        assert_eq!(state.remaining(), 0);
        assert_eq!(state.cursor(), payload.len() as u64);
    }

    #[test]
    fn test_never_copies_more_than_remaining() {
        let mut state = TransferState::new(b"abc");
        let mut buf = [0u8; 64];
        assert_eq!(state.next_chunk(&mut buf), 3);
        assert_eq!(&buf[..3], b"abc");
        assert_eq!(state.next_chunk(&mut buf), 0);
    }

    #[test]
    fn test_empty_payload_is_immediately_exhausted() {
        let mut state = TransferState::new(b"");
        let mut buf = [0u8; 8];
        assert_eq!(state.content_length(), 0);
        assert_eq!(state.next_chunk(&mut buf), 0);
    }

    #[test]
    fn test_zero_capacity_copies_nothing() {
        let mut state = TransferState::new(b"abc");
        assert_eq!(state.next_chunk(&mut []), 0);
        assert_eq!(state.remaining(), 3);
    }

    #[test]
    fn test_reader_stops_at_declared_length() {
        let data = b"0123456789".to_vec();
        let mut state = ReaderTransfer::new(&data[..], 4);
        let mut buf = [0u8; 3];
        let mut out = Vec::new();
        loop {
            let n = state.next_chunk(&mut buf);
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out, b"0123");
        assert_eq!(state.remaining(), 0);
        assert!(state.take_read_error().is_none());
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "disk gone"))
        }
    }

    #[test]
    fn test_reader_error_truncates_and_is_kept() {
        let mut state = ReaderTransfer::new(FailingReader, 10);
        let mut buf = [0u8; 4];
        assert_eq!(state.next_chunk(&mut buf), 0);
        assert_eq!(state.next_chunk(&mut buf), 0);
        let err = state.take_read_error().expect("read error recorded");
        assert_eq!(err.to_string(), "disk gone");
    }
}
