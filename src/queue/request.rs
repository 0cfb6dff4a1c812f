//! Transfer request model
//!
//! A transfer request is the unit of download work: a source URL, a
//! destination path, and the mutable status/progress the queue tracks for
//! it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use crate::error::ErrorCode;

/// Status lifecycle of a transfer request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    /// Waiting for a worker to claim it
    Queued,
    /// Leased by a worker and transferring
    Downloading,
    /// Held; resumable back to `Queued`
    Paused,
    /// Terminal: all bytes transferred
    Completed,
    /// Terminal: transfer aborted with an error code
    Failed,
    /// Terminal: cancelled by the caller
    Removed,
}

impl TransferStatus {
    /// Check whether this status ends the request lifecycle
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferStatus::Completed | TransferStatus::Failed | TransferStatus::Removed
        )
    }
}

/// Derive the stable request id for a (url, destination) pair.
///
/// First 8 bytes of the SHA-1 over both values; the same pair always maps to
/// the same id so re-enqueues and resumes find the prior record.
pub fn request_id(url: &str, destination: &Path) -> u64 {
    let mut hasher = Sha1::new();
    hasher.update(url.as_bytes());
    hasher.update(b"|");
    hasher.update(destination.to_string_lossy().as_bytes());
    let digest = hasher.finalize();
    u64::from_be_bytes(digest[..8].try_into().expect("sha1 digest is 20 bytes"))
}

/// A unit of download work tracked by the transfer queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    /// Stable id derived from (url, destination)
    pub id: u64,
    /// Source URL (`http`, `https`, or the local server's `fetchlocal`)
    pub url: String,
    /// Destination file path
    pub destination: PathBuf,
    /// Headers sent to the source, including `Authorization` for the local
    /// server
    pub headers: BTreeMap<String, String>,
    /// Current lifecycle status
    pub status: TransferStatus,
    /// Bytes written to the destination so far
    pub downloaded_bytes: u64,
    /// Total size of the source; -1 while unknown
    pub total_bytes: i64,
    /// Failure code once `status` is `Failed`
    pub error: Option<ErrorCode>,
}

impl TransferRequest {
    /// Create a queued request for a (url, destination) pair
    pub fn new(
        url: impl Into<String>,
        destination: impl Into<PathBuf>,
        headers: BTreeMap<String, String>,
    ) -> Self {
        let url = url.into();
        let destination = destination.into();
        Self {
            id: request_id(&url, &destination),
            url,
            destination,
            headers,
            status: TransferStatus::Queued,
            downloaded_bytes: 0,
            total_bytes: -1,
            error: None,
        }
    }

    /// Progress in the range 0.0 to 1.0; 0.0 while the total is unknown
    pub fn progress(&self) -> f64 {
        if self.total_bytes <= 0 {
            0.0
        } else {
            (self.downloaded_bytes as f64 / self.total_bytes as f64).min(1.0)
        }
    }

    /// Check whether the request reached a terminal status
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
