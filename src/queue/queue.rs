//! Transfer queue module
//!
//! Owns every `TransferRequest` record and is the sole mutation point for
//! request status. Workers claim queued requests one at a time; the claim is
//! an exclusive lease that pause/remove invalidate at the worker's next
//! checkpoint.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use tokio::sync::{Notify, RwLock};
use tokio::time::Duration;
use tracing::{debug, trace};

use crate::error::{ErrorCode, TransferError};
use crate::queue::{TransferRequest, TransferStatus};

/// How long an idle worker sleeps before re-polling the queue
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(500);

struct QueueEntry {
    request: TransferRequest,
    /// Enqueue order; claiming is FIFO over this, ties broken by id
    seq: u64,
}

/// Ordered set of transfer requests keyed by stable id
#[derive(Default)]
pub struct TransferQueue {
    entries: RwLock<HashMap<u64, QueueEntry>>,
    next_seq: AtomicU64,
    work_available: Notify,
}

impl TransferQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
            work_available: Notify::new(),
        }
    }

    /// Add a request to the queue.
    ///
    /// Fails with `DuplicateId` while a request with the same id is live
    /// (non-terminal). A terminal record with the same id is replaced; that
    /// is the caller's retry path.
    pub async fn enqueue(&self, request: TransferRequest) -> Result<u64> {
        let id = request.id;
        let mut entries = self.entries.write().await;
        if let Some(existing) = entries.get(&id) {
            if !existing.request.is_terminal() {
                return Err(TransferError::duplicate_id(id).into());
            }
        }

        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let mut request = request;
        request.status = TransferStatus::Queued;
        request.error = None;
        entries.insert(id, QueueEntry { request, seq });
        drop(entries);

        debug!("Enqueued request {:016x} (seq {})", id, seq);
        self.work_available.notify_waiters();
        Ok(id)
    }

    /// Claim the oldest queued request, transitioning it to `Downloading`.
    ///
    /// This is the only path into `Downloading`, which guarantees no two
    /// workers ever hold the same request.
    pub async fn claim_next(&self) -> Option<TransferRequest> {
        let mut entries = self.entries.write().await;
        let id = entries
            .values()
            .filter(|e| e.request.status == TransferStatus::Queued)
            .min_by_key(|e| (e.seq, e.request.id))
            .map(|e| e.request.id)?;

        let entry = entries.get_mut(&id)?;
        entry.request.status = TransferStatus::Downloading;
        trace!("Claimed request {:016x}", id);
        Some(entry.request.clone())
    }

    /// Block until work may be available or the idle interval elapses.
    ///
    /// Callers should loop: a wakeup is a hint, not a guarantee that
    /// `claim_next` will succeed.
    pub async fn wait_for_work(&self) {
        let notified = self.work_available.notified();
        if self.has_queued().await {
            return;
        }
        let _ = tokio::time::timeout(IDLE_POLL_INTERVAL, notified).await;
    }

    /// Check whether any request is waiting to be claimed
    pub async fn has_queued(&self) -> bool {
        let entries = self.entries.read().await;
        entries
            .values()
            .any(|e| e.request.status == TransferStatus::Queued)
    }

    /// Snapshot of a request by id
    pub async fn get(&self, id: u64) -> Option<TransferRequest> {
        let entries = self.entries.read().await;
        entries.get(&id).map(|e| e.request.clone())
    }

    /// Current status of a request by id
    pub async fn status(&self, id: u64) -> Option<TransferStatus> {
        let entries = self.entries.read().await;
        entries.get(&id).map(|e| e.request.status)
    }

    /// Pause a queued or downloading request.
    ///
    /// Returns whether a transition happened: pausing an already paused (or
    /// terminal) request is a no-op. A downloading request stops at its
    /// worker's next checkpoint.
    pub async fn pause(&self, id: u64) -> Result<bool> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(&id)
            .ok_or_else(|| TransferError::not_found_with_name("no such request", format!("{:016x}", id)))?;

        match entry.request.status {
            TransferStatus::Queued | TransferStatus::Downloading => {
                entry.request.status = TransferStatus::Paused;
                debug!("Paused request {:016x}", id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Resume a paused request back into the queue.
    ///
    /// Returns whether a transition happened.
    pub async fn resume(&self, id: u64) -> Result<bool> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(&id)
            .ok_or_else(|| TransferError::not_found_with_name("no such request", format!("{:016x}", id)))?;

        match entry.request.status {
            TransferStatus::Paused => {
                entry.request.status = TransferStatus::Queued;
                // Resumed work keeps its original position
                debug!("Resumed request {:016x}", id);
                drop(entries);
                self.work_available.notify_waiters();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Cancel a request.
    ///
    /// Any worker lease is invalidated at the next checkpoint. Returns
    /// whether a transition happened (terminal requests are untouched).
    pub async fn remove(&self, id: u64) -> Result<bool> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(&id)
            .ok_or_else(|| TransferError::not_found_with_name("no such request", format!("{:016x}", id)))?;

        if entry.request.is_terminal() {
            return Ok(false);
        }
        entry.request.status = TransferStatus::Removed;
        debug!("Removed request {:016x}", id);
        Ok(true)
    }

    /// Record transfer progress.
    ///
    /// Transfers are append-only, so `downloaded` is monotonic: a lower
    /// value than recorded is clamped up, and a known total caps it. Returns
    /// the effective `(downloaded, total)` or `None` when the request is
    /// gone or already terminal.
    pub async fn update_progress(
        &self,
        id: u64,
        downloaded: u64,
        total: i64,
    ) -> Option<(u64, i64)> {
        let mut entries = self.entries.write().await;
        let entry = entries.get_mut(&id)?;
        if entry.request.is_terminal() {
            return None;
        }

        let mut effective = entry.request.downloaded_bytes.max(downloaded);
        if total >= 0 {
            entry.request.total_bytes = total;
            effective = effective.min(total as u64);
        }
        entry.request.downloaded_bytes = effective;
        Some((effective, entry.request.total_bytes))
    }

    /// Mark a downloading request completed. Returns the final snapshot, or
    /// `None` when the lease was invalidated in the meantime.
    pub async fn mark_completed(&self, id: u64) -> Option<TransferRequest> {
        let mut entries = self.entries.write().await;
        let entry = entries.get_mut(&id)?;
        if entry.request.status != TransferStatus::Downloading {
            return None;
        }
        entry.request.status = TransferStatus::Completed;
        if entry.request.total_bytes >= 0 {
            entry.request.downloaded_bytes = entry.request.total_bytes as u64;
        }
        debug!("Completed request {:016x}", id);
        Some(entry.request.clone())
    }

    /// Mark a downloading request failed with an error code. Returns the
    /// final snapshot, or `None` when the lease was invalidated.
    pub async fn mark_failed(&self, id: u64, code: ErrorCode) -> Option<TransferRequest> {
        let mut entries = self.entries.write().await;
        let entry = entries.get_mut(&id)?;
        if entry.request.status != TransferStatus::Downloading {
            return None;
        }
        entry.request.status = TransferStatus::Failed;
        entry.request.error = Some(code);
        debug!("Failed request {:016x} ({})", id, code);
        Some(entry.request.clone())
    }

    /// Number of tracked requests, terminal ones included
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Check whether the queue tracks no requests
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Number of live (non-terminal) requests
    pub async fn active_count(&self) -> usize {
        let entries = self.entries.read().await;
        entries
            .values()
            .filter(|e| !e.request.is_terminal())
            .count()
    }
}
