//! Event notification
//!
//! Fan-out of transfer lifecycle and progress events to registered
//! listeners, decoupling the worker pool from whatever is presenting the
//! transfers.

pub mod listener;
pub mod notifier;

pub use listener::TransferListener;
pub use notifier::{EventNotifier, ListenerId};
