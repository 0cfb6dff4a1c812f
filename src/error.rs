//! Error types for the transfer engine
//!
//! This module defines the error type shared by the file server, the
//! transfer queue, and the download workers, plus the flat error codes
//! delivered to listeners.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Flat error code carried by failure events.
///
/// Workers report failures asynchronously through the event notifier, so
/// listeners receive a code rather than the full error value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Content or request id absent
    NotFound,
    /// Content name already registered
    DuplicateName,
    /// A live request with the same id already exists
    DuplicateId,
    /// Server could not acquire its address
    BindError,
    /// Authenticator rejected the credential
    Unauthorized,
    /// Malformed or out-of-bounds byte range
    InvalidRange,
    /// Connection reset, timeout, DNS failure, or protocol violation
    NetworkError,
    /// Local disk read/write failure
    IoError,
    /// Unparsable URL or unsupported scheme
    InvalidUrl,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::NotFound => "not_found",
            ErrorCode::DuplicateName => "duplicate_name",
            ErrorCode::DuplicateId => "duplicate_id",
            ErrorCode::BindError => "bind_error",
            ErrorCode::Unauthorized => "unauthorized",
            ErrorCode::InvalidRange => "invalid_range",
            ErrorCode::NetworkError => "network_error",
            ErrorCode::IoError => "io_error",
            ErrorCode::InvalidUrl => "invalid_url",
        };
        write!(f, "{}", name)
    }
}

/// Error type for all transfer operations
#[derive(Debug, Clone)]
pub enum TransferError {
    /// Content name or request id could not be resolved
    NotFound {
        message: String,
        name: Option<String>,
    },

    /// Registration conflict on a content name
    DuplicateName {
        name: String,
    },

    /// Enqueue conflict on a live request id
    DuplicateId {
        id: u64,
    },

    /// Server failed to bind its listen address
    BindError {
        message: String,
        address: Option<String>,
        source: Option<String>,
    },

    /// Authenticator rejected the request
    Unauthorized {
        message: String,
    },

    /// Malformed or out-of-bounds byte range
    InvalidRange {
        message: String,
        range: Option<String>,
    },

    /// Network errors
    NetworkError {
        message: String,
        address: Option<String>,
        source: Option<String>,
    },

    /// File I/O errors
    IoError {
        message: String,
        path: Option<String>,
        source: Option<String>,
    },

    /// Unparsable or unsupported URL
    InvalidUrl {
        message: String,
        url: Option<String>,
    },
}

impl TransferError {
    /// Create a new NotFound error
    pub fn not_found(message: impl Into<String>) -> Self {
        TransferError::NotFound {
            message: message.into(),
            name: None,
        }
    }

    /// Create a new NotFound error with the missing name
    pub fn not_found_with_name(message: impl Into<String>, name: impl Into<String>) -> Self {
        TransferError::NotFound {
            message: message.into(),
            name: Some(name.into()),
        }
    }

    /// Create a new DuplicateName error
    pub fn duplicate_name(name: impl Into<String>) -> Self {
        TransferError::DuplicateName { name: name.into() }
    }

    /// Create a new DuplicateId error
    pub fn duplicate_id(id: u64) -> Self {
        TransferError::DuplicateId { id }
    }

    /// Create a new BindError
    pub fn bind_error(message: impl Into<String>) -> Self {
        TransferError::BindError {
            message: message.into(),
            address: None,
            source: None,
        }
    }

    /// Create a new BindError with address and source
    pub fn bind_error_full(
        message: impl Into<String>,
        address: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        TransferError::BindError {
            message: message.into(),
            address: Some(address.into()),
            source: Some(source.into()),
        }
    }

    /// Create a new Unauthorized error
    pub fn unauthorized(message: impl Into<String>) -> Self {
        TransferError::Unauthorized {
            message: message.into(),
        }
    }

    /// Create a new InvalidRange error
    pub fn invalid_range(message: impl Into<String>) -> Self {
        TransferError::InvalidRange {
            message: message.into(),
            range: None,
        }
    }

    /// Create a new InvalidRange error with the offending range
    pub fn invalid_range_with_range(
        message: impl Into<String>,
        range: impl Into<String>,
    ) -> Self {
        TransferError::InvalidRange {
            message: message.into(),
            range: Some(range.into()),
        }
    }

    /// Create a new NetworkError
    pub fn network_error(message: impl Into<String>) -> Self {
        TransferError::NetworkError {
            message: message.into(),
            address: None,
            source: None,
        }
    }

    /// Create a new NetworkError with address
    pub fn network_error_with_address(
        message: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        TransferError::NetworkError {
            message: message.into(),
            address: Some(address.into()),
            source: None,
        }
    }

    /// Create a new NetworkError with address and source
    pub fn network_error_full(
        message: impl Into<String>,
        address: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        TransferError::NetworkError {
            message: message.into(),
            address: Some(address.into()),
            source: Some(source.into()),
        }
    }

    /// Create a new IoError
    pub fn io_error(message: impl Into<String>) -> Self {
        TransferError::IoError {
            message: message.into(),
            path: None,
            source: None,
        }
    }

    /// Create a new IoError with path
    pub fn io_error_with_path(message: impl Into<String>, path: impl Into<String>) -> Self {
        TransferError::IoError {
            message: message.into(),
            path: Some(path.into()),
            source: None,
        }
    }

    /// Create a new IoError with path and source
    pub fn io_error_full(
        message: impl Into<String>,
        path: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        TransferError::IoError {
            message: message.into(),
            path: Some(path.into()),
            source: Some(source.into()),
        }
    }

    /// Create a new InvalidUrl error
    pub fn invalid_url(message: impl Into<String>) -> Self {
        TransferError::InvalidUrl {
            message: message.into(),
            url: None,
        }
    }

    /// Create a new InvalidUrl error with the offending URL
    pub fn invalid_url_with_url(message: impl Into<String>, url: impl Into<String>) -> Self {
        TransferError::InvalidUrl {
            message: message.into(),
            url: Some(url.into()),
        }
    }

    /// Get the flat error code for listener delivery
    pub fn code(&self) -> ErrorCode {
        match self {
            TransferError::NotFound { .. } => ErrorCode::NotFound,
            TransferError::DuplicateName { .. } => ErrorCode::DuplicateName,
            TransferError::DuplicateId { .. } => ErrorCode::DuplicateId,
            TransferError::BindError { .. } => ErrorCode::BindError,
            TransferError::Unauthorized { .. } => ErrorCode::Unauthorized,
            TransferError::InvalidRange { .. } => ErrorCode::InvalidRange,
            TransferError::NetworkError { .. } => ErrorCode::NetworkError,
            TransferError::IoError { .. } => ErrorCode::IoError,
            TransferError::InvalidUrl { .. } => ErrorCode::InvalidUrl,
        }
    }
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferError::NotFound { message, name } => {
                if let Some(n) = name {
                    write!(f, "Not found: {} (name: {})", message, n)
                } else {
                    write!(f, "Not found: {}", message)
                }
            }
            TransferError::DuplicateName { name } => {
                write!(f, "Duplicate name: '{}' is already registered", name)
            }
            TransferError::DuplicateId { id } => {
                write!(f, "Duplicate id: request {:016x} is already active", id)
            }
            TransferError::BindError { message, address, source } => {
                match (address, source) {
                    (Some(a), Some(s)) => {
                        write!(f, "Bind error: {} (address: {}, source: {})", message, a, s)
                    }
                    (Some(a), None) => write!(f, "Bind error: {} (address: {})", message, a),
                    (None, Some(s)) => write!(f, "Bind error: {} (source: {})", message, s),
                    (None, None) => write!(f, "Bind error: {}", message),
                }
            }
            TransferError::Unauthorized { message } => {
                write!(f, "Unauthorized: {}", message)
            }
            TransferError::InvalidRange { message, range } => {
                if let Some(r) = range {
                    write!(f, "Invalid range: {} (range: {})", message, r)
                } else {
                    write!(f, "Invalid range: {}", message)
                }
            }
            TransferError::NetworkError { message, address, source } => {
                match (address, source) {
                    (Some(a), Some(s)) => {
                        write!(f, "Network error: {} (address: {}, source: {})", message, a, s)
                    }
                    (Some(a), None) => write!(f, "Network error: {} (address: {})", message, a),
                    (None, Some(s)) => write!(f, "Network error: {} (source: {})", message, s),
                    (None, None) => write!(f, "Network error: {}", message),
                }
            }
            TransferError::IoError { message, path, source } => {
                match (path, source) {
                    (Some(p), Some(s)) => {
                        write!(f, "IO error: {} (path: {}, source: {})", message, p, s)
                    }
                    (Some(p), None) => write!(f, "IO error: {} (path: {})", message, p),
                    (None, Some(s)) => write!(f, "IO error: {} (source: {})", message, s),
                    (None, None) => write!(f, "IO error: {}", message),
                }
            }
            TransferError::InvalidUrl { message, url } => {
                if let Some(u) = url {
                    write!(f, "Invalid URL: {} (url: {})", message, u)
                } else {
                    write!(f, "Invalid URL: {}", message)
                }
            }
        }
    }
}

impl std::error::Error for TransferError {}

// Implement From traits for common error types

impl From<std::io::Error> for TransferError {
    fn from(err: std::io::Error) -> Self {
        TransferError::IoError {
            message: err.to_string(),
            path: None,
            source: Some(err.kind().to_string()),
        }
    }
}

impl From<serde_json::Error> for TransferError {
    fn from(err: serde_json::Error) -> Self {
        TransferError::network_error_full(
            "Failed to decode protocol frame",
            "unknown".to_string(),
            err.to_string(),
        )
    }
}

impl From<url::ParseError> for TransferError {
    fn from(err: url::ParseError) -> Self {
        TransferError::invalid_url(err.to_string())
    }
}

impl From<reqwest::Error> for TransferError {
    fn from(err: reqwest::Error) -> Self {
        let address = err
            .url()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        TransferError::network_error_full("HTTP request failed", address, err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for TransferError {
    fn from(_err: tokio::time::error::Elapsed) -> Self {
        TransferError::network_error("Operation timed out")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found() {
        let err = TransferError::not_found("no such content");
        assert_eq!(err.to_string(), "Not found: no such content");
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[test]
    fn test_not_found_with_name() {
        let err = TransferError::not_found_with_name("no such content", "test_file.db");
        assert!(err.to_string().contains("test_file.db"));
    }

    #[test]
    fn test_duplicate_name() {
        let err = TransferError::duplicate_name("test_file.db");
        assert!(err.to_string().contains("Duplicate name"));
        assert!(err.to_string().contains("test_file.db"));
        assert_eq!(err.code(), ErrorCode::DuplicateName);
    }

    #[test]
    fn test_duplicate_id() {
        let err = TransferError::duplicate_id(0xdead_beef);
        assert!(err.to_string().contains("Duplicate id"));
        assert_eq!(err.code(), ErrorCode::DuplicateId);
    }

    #[test]
    fn test_bind_error_full() {
        let err = TransferError::bind_error_full("address in use", "127.0.0.1:8080", "EADDRINUSE");
        assert!(err.to_string().contains("Bind error"));
        assert!(err.to_string().contains("127.0.0.1:8080"));
        assert!(err.to_string().contains("EADDRINUSE"));
    }

    #[test]
    fn test_unauthorized() {
        let err = TransferError::unauthorized("credential rejected");
        assert_eq!(err.to_string(), "Unauthorized: credential rejected");
        assert_eq!(err.code(), ErrorCode::Unauthorized);
    }

    #[test]
    fn test_invalid_range_with_range() {
        let err = TransferError::invalid_range_with_range("end before start", "500-100");
        assert!(err.to_string().contains("Invalid range"));
        assert!(err.to_string().contains("500-100"));
        assert_eq!(err.code(), ErrorCode::InvalidRange);
    }

    #[test]
    fn test_network_error_with_address() {
        let err = TransferError::network_error_with_address("connection reset", "127.0.0.1:9000");
        assert!(err.to_string().contains("Network error"));
        assert!(err.to_string().contains("127.0.0.1:9000"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: TransferError = io_err.into();
        assert!(matches!(err, TransferError::IoError { .. }));
        assert_eq!(err.code(), ErrorCode::IoError);
    }

    #[test]
    fn test_from_url_parse_error() {
        let parse_err = url::Url::parse("not a url").unwrap_err();
        let err: TransferError = parse_err.into();
        assert!(matches!(err, TransferError::InvalidUrl { .. }));
        assert_eq!(err.code(), ErrorCode::InvalidUrl);
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: TransferError = json_err.into();
        assert!(matches!(err, TransferError::NetworkError { .. }));
    }

    #[test]
    fn test_error_code_display() {
        assert_eq!(ErrorCode::Unauthorized.to_string(), "unauthorized");
        assert_eq!(ErrorCode::NetworkError.to_string(), "network_error");
        assert_eq!(ErrorCode::InvalidRange.to_string(), "invalid_range");
    }
}
