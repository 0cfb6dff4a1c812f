//! File server request document
//!
//! The first (and only) frame a client sends on a connection. Identifies the
//! requested content by name, an optional byte range for resumption, and the
//! request headers carrying the authorization credential.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::TransferError;

/// Header carrying the credential checked by the authenticator gate.
pub const AUTHORIZATION_HEADER: &str = "Authorization";

/// A request for a single content transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRequest {
    /// Caller identifier, echoed in server logs
    #[serde(default)]
    pub client: String,
    /// Registered content name being requested
    pub name: String,
    /// First byte of the requested span
    #[serde(default)]
    pub range_start: u64,
    /// Last byte of the requested span (inclusive); absent means end-of-file
    #[serde(default)]
    pub range_end: Option<u64>,
    /// Request headers; the `Authorization` value feeds the authenticator
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl FileRequest {
    /// Create a request for the full content
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            client: String::new(),
            name: name.into(),
            range_start: 0,
            range_end: None,
            headers: BTreeMap::new(),
        }
    }

    /// Set the requested byte range
    pub fn with_range(mut self, start: u64, end: Option<u64>) -> Self {
        self.range_start = start;
        self.range_end = end;
        self
    }

    /// Add a request header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Set the caller identifier
    pub fn with_client(mut self, client: impl Into<String>) -> Self {
        self.client = client.into();
        self
    }

    /// Get the authorization credential, if one was supplied
    pub fn authorization(&self) -> Option<&str> {
        self.headers.get(AUTHORIZATION_HEADER).map(|s| s.as_str())
    }

    /// Resolve the requested range against a content length.
    ///
    /// Returns `(start, span_length)`. A missing `range_end` means
    /// end-of-file. The span must satisfy `0 <= start <= end < length`.
    pub fn byte_span(&self, length: u64) -> Result<(u64, u64), TransferError> {
        let start = self.range_start;
        if start >= length {
            return Err(TransferError::invalid_range_with_range(
                "range start is past end of content",
                format!("{}-{:?} (length {})", start, self.range_end, length),
            ));
        }
        let end = match self.range_end {
            Some(end) => {
                if end < start || end >= length {
                    return Err(TransferError::invalid_range_with_range(
                        "range end is out of bounds",
                        format!("{}-{} (length {})", start, end, length),
                    ));
                }
                end
            }
            None => length - 1,
        };
        Ok((start, end - start + 1))
    }
}
