//! Transfer queue
//!
//! Ordered set of download requests with per-request status, progress, and
//! single-owner claiming for the worker pool.

pub mod queue;
pub mod request;

pub use queue::TransferQueue;
pub use request::{request_id, TransferRequest, TransferStatus};
