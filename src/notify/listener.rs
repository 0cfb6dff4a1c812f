//! Transfer listener trait
//!
//! Every method has an empty default body so callers implement only the
//! events they care about.

use crate::error::ErrorCode;
use crate::queue::TransferRequest;

/// Receiver of transfer lifecycle and progress events.
///
/// Events are delivered synchronously on the emitting worker's task, so
/// implementations must not block for long: a slow listener delays that
/// worker's next checkpoint, not other workers.
#[allow(unused_variables)]
pub trait TransferListener: Send + Sync {
    /// A request was accepted into the queue
    fn on_queued(&self, request: &TransferRequest) {}

    /// Progress checkpoint. `eta_millis` is -1 while unknown.
    fn on_progress(&self, request: &TransferRequest, eta_millis: i64, bytes_per_second: u64) {}

    /// All bytes reached the destination
    fn on_completed(&self, request: &TransferRequest) {}

    /// The transfer aborted; `code` tells why
    fn on_failed(&self, request: &TransferRequest, code: ErrorCode) {}

    /// The request was put on hold
    fn on_paused(&self, request: &TransferRequest) {}

    /// The request was cancelled and its partial bytes discarded
    fn on_removed(&self, request: &TransferRequest) {}
}
