//! File server response document
//!
//! Sent as a single frame before any content bytes. On `Ok` the server
//! streams exactly `content_length` raw bytes after the frame; every other
//! status closes the connection with zero content bytes.

use serde::{Deserialize, Serialize};

/// Outcome of a file request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    /// The requested span follows the response frame
    Ok,
    /// Authenticator rejected the credential
    Unauthorized,
    /// No content registered under the requested name
    NotFound,
    /// Requested byte range is malformed or out of bounds
    RangeNotSatisfiable,
    /// Request frame could not be understood
    BadRequest,
}

/// Response header for a file request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileResponse {
    /// Request outcome
    pub status: ResponseStatus,
    /// Number of content bytes that follow the frame (0 unless `Ok`)
    pub content_length: u64,
    /// Random token correlating this connection in server logs
    pub session_id: String,
}

impl FileResponse {
    /// Create a success response announcing `content_length` bytes
    pub fn ok(content_length: u64, session_id: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Ok,
            content_length,
            session_id: session_id.into(),
        }
    }

    /// Create a failure response with zero content bytes
    pub fn failure(status: ResponseStatus, session_id: impl Into<String>) -> Self {
        Self {
            status,
            content_length: 0,
            session_id: session_id.into(),
        }
    }

    /// Check whether content bytes follow this response
    pub fn is_ok(&self) -> bool {
        self.status == ResponseStatus::Ok
    }
}

/// Generate a random session id for log correlation
pub fn new_session_id() -> String {
    let token: [u8; 8] = rand::random();
    hex::encode(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_response() {
        let response = FileResponse::ok(1000, "abcd1234");
        assert!(response.is_ok());
        assert_eq!(response.content_length, 1000);
    }

    #[test]
    fn test_failure_response_has_no_body() {
        let response = FileResponse::failure(ResponseStatus::Unauthorized, "abcd1234");
        assert!(!response.is_ok());
        assert_eq!(response.content_length, 0);
    }

    #[test]
    fn test_status_serde_round_trip() {
        let json = serde_json::to_string(&ResponseStatus::RangeNotSatisfiable).unwrap();
        assert_eq!(json, "\"range_not_satisfiable\"");
        let status: ResponseStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(status, ResponseStatus::RangeNotSatisfiable);
    }

    #[test]
    fn test_response_serde_round_trip() {
        let response = FileResponse::ok(512, new_session_id());
        let json = serde_json::to_vec(&response).unwrap();
        let decoded: FileResponse = serde_json::from_slice(&json).unwrap();
        assert_eq!(decoded, response);
    }

    #[test]
    fn test_session_ids_are_unique() {
        assert_ne!(new_session_id(), new_session_id());
    }
}
